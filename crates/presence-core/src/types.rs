use crate::descriptor::DescriptorError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of histogram bins in a descriptor (one per 8-bit LBP code).
pub const DESCRIPTOR_LEN: usize = 256;

/// Label reported when no enrolled template is accepted.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Guards cosine similarity against division by zero.
const SIMILARITY_EPSILON: f32 = 1e-9;

/// Fixed-length face descriptor, bin index = LBP code.
///
/// Serialized as a plain array of 256 numbers. Extraction output is
/// L2-normalized; averaged enrollment templates generally are not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct Descriptor {
    values: Vec<f32>,
}

impl Descriptor {
    /// All-zero descriptor.
    pub fn zeros() -> Self {
        Self {
            values: vec![0.0; DESCRIPTOR_LEN],
        }
    }

    /// Wrap raw bin values, checking the length.
    pub fn from_values(values: Vec<f32>) -> Result<Self, DescriptorError> {
        if values.len() != DESCRIPTOR_LEN {
            return Err(DescriptorError::InvalidLength {
                expected: DESCRIPTOR_LEN,
                actual: values.len(),
            });
        }
        Ok(Self { values })
    }

    /// Wrap values whose length is already fixed by construction.
    pub(crate) fn from_raw(values: Vec<f32>) -> Self {
        debug_assert_eq!(values.len(), DESCRIPTOR_LEN, "descriptor length");
        Self { values }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Euclidean norm.
    pub fn norm(&self) -> f32 {
        self.values.iter().map(|v| v * v).sum::<f32>().sqrt()
    }

    pub fn is_zero(&self) -> bool {
        self.values.iter().all(|&v| v == 0.0)
    }

    /// Cosine similarity `a·b / (‖a‖·‖b‖ + ε)`.
    ///
    /// Returns 0 when either side is the zero vector; always visits every bin.
    pub fn similarity(&self, other: &Descriptor) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        dot / (norm_a.sqrt() * norm_b.sqrt() + SIMILARITY_EPSILON)
    }
}

impl TryFrom<Vec<f32>> for Descriptor {
    type Error = DescriptorError;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        Self::from_values(values)
    }
}

impl From<Descriptor> for Vec<f32> {
    fn from(descriptor: Descriptor) -> Self {
        descriptor.values
    }
}

/// An enrolled reference descriptor. Labels are exact, case-sensitive identifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    #[serde(rename = "name")]
    pub label: String,
    #[serde(rename = "vec")]
    pub vector: Descriptor,
}

/// Best-scoring template for a probe, before any threshold is applied.
///
/// `label` is `None` only when nothing was enrolled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub label: Option<String>,
    /// Cosine similarity of the best template, in [-1, 1].
    pub score: f32,
}

impl MatchResult {
    /// The empty-store result: `Unknown` with score 0.
    pub fn unknown() -> Self {
        Self {
            label: None,
            score: 0.0,
        }
    }

    /// Label for display, `"Unknown"` when absent.
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(UNKNOWN_LABEL)
    }

    /// Apply the acceptance rule `score >= threshold`.
    ///
    /// A rejection keeps the best score so callers can still show confidence.
    pub fn decide(self, threshold: f32) -> Decision {
        match self.label {
            Some(label) if self.score >= threshold => Decision::Identified {
                label,
                score: self.score,
            },
            _ => Decision::Unknown { score: self.score },
        }
    }
}

/// Outcome of applying the threshold to a [`MatchResult`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Identified { label: String, score: f32 },
    Unknown { score: f32 },
}

impl Decision {
    pub fn score(&self) -> f32 {
        match self {
            Decision::Identified { score, .. } | Decision::Unknown { score } => *score,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Decision::Identified { label, .. } => label,
            Decision::Unknown { .. } => UNKNOWN_LABEL,
        }
    }

    pub fn is_identified(&self) -> bool {
        matches!(self, Decision::Identified { .. })
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.2})", self.label(), self.score())
    }
}

/// An accepted, deduplicated identification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceEvent {
    pub label: String,
    pub score: f32,
    pub timestamp: DateTime<Utc>,
}
