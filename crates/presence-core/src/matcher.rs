use crate::types::{Decision, Descriptor, MatchResult, Template};

/// Acceptance threshold used when the caller has no preference.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.9;

/// Strategy for comparing a probe descriptor against enrolled templates.
///
/// Implementations are stateless between calls; the threshold travels
/// with each query.
pub trait Matcher {
    /// Best-scoring template, or `Unknown`/0 for an empty gallery.
    fn best_match(&self, probe: &Descriptor, gallery: &[Template]) -> MatchResult;

    /// Best match with the `score >= threshold` rule applied.
    fn decide(&self, probe: &Descriptor, gallery: &[Template], threshold: f32) -> Decision {
        self.best_match(probe, gallery).decide(threshold)
    }
}

/// Cosine similarity matcher.
///
/// Visits every gallery entry and keeps the strictly greatest score, so
/// on a tie the earliest template in gallery order wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn best_match(&self, probe: &Descriptor, gallery: &[Template]) -> MatchResult {
        let mut best_sim = f32::NEG_INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, template) in gallery.iter().enumerate() {
            let sim = probe.similarity(&template.vector);
            if sim > best_sim {
                best_sim = sim;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) => MatchResult {
                label: Some(gallery[idx].label.clone()),
                score: best_sim,
            },
            None => MatchResult::unknown(),
        }
    }
}
