//! Enrollment session state machine.
//!
//! `Idle → Enrolling` on [`EnrollmentSession::begin`]; each sample is
//! summed into the session, and the session commits its mean to the
//! [`TemplateStore`] as soon as the target count is reached. Only one
//! enrollment can be in progress at a time.

use crate::store::TemplateStore;
use crate::types::{Descriptor, Template, DESCRIPTOR_LEN};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnrollmentError {
    #[error("enrollment target count must be at least 1, got {0}")]
    InvalidConfiguration(usize),
    #[error("enrollment for {0:?} is already in progress")]
    SessionAlreadyActive(String),
    #[error("no enrollment in progress")]
    NoActiveSession,
}

/// Result of feeding one sample to an active session.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutcome {
    /// More samples needed.
    Pending {
        label: String,
        samples_taken: usize,
        target_count: usize,
    },
    /// Target reached; the averaged template is now in the store.
    Committed(Template),
}

/// Read-only view of an in-progress enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrollmentProgress<'a> {
    pub label: &'a str,
    pub samples_taken: usize,
    pub target_count: usize,
}

#[derive(Debug)]
struct Enrolling {
    label: String,
    target_count: usize,
    samples_taken: usize,
    // f64 so that averaging identical samples reproduces them exactly.
    sum: Vec<f64>,
}

#[derive(Debug, Default)]
enum State {
    #[default]
    Idle,
    Enrolling(Enrolling),
}

#[derive(Debug, Default)]
pub struct EnrollmentSession {
    state: State,
}

impl EnrollmentSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start collecting `target_count` samples for `label`.
    pub fn begin(
        &mut self,
        label: impl Into<String>,
        target_count: usize,
    ) -> Result<(), EnrollmentError> {
        if let State::Enrolling(active) = &self.state {
            return Err(EnrollmentError::SessionAlreadyActive(active.label.clone()));
        }
        if target_count < 1 {
            return Err(EnrollmentError::InvalidConfiguration(target_count));
        }

        let label = label.into();
        tracing::info!(label = %label, target_count, "enrollment started");
        self.state = State::Enrolling(Enrolling {
            label,
            target_count,
            samples_taken: 0,
            sum: vec![0.0; DESCRIPTOR_LEN],
        });
        Ok(())
    }

    /// Accumulate one descriptor, committing to `store` when the target is reached.
    pub fn add_sample(
        &mut self,
        descriptor: &Descriptor,
        store: &mut TemplateStore,
    ) -> Result<SampleOutcome, EnrollmentError> {
        let State::Enrolling(active) = &mut self.state else {
            return Err(EnrollmentError::NoActiveSession);
        };

        for (acc, &v) in active.sum.iter_mut().zip(descriptor.values()) {
            *acc += f64::from(v);
        }
        active.samples_taken += 1;

        if active.samples_taken < active.target_count {
            tracing::debug!(
                label = %active.label,
                samples_taken = active.samples_taken,
                target_count = active.target_count,
                "enrollment sample added"
            );
            return Ok(SampleOutcome::Pending {
                label: active.label.clone(),
                samples_taken: active.samples_taken,
                target_count: active.target_count,
            });
        }

        match std::mem::take(&mut self.state) {
            State::Enrolling(done) => Ok(SampleOutcome::Committed(done.commit(store))),
            State::Idle => Err(EnrollmentError::NoActiveSession),
        }
    }

    /// Abort the current enrollment without committing. Returns whether
    /// a session was active.
    pub fn cancel(&mut self) -> bool {
        match std::mem::take(&mut self.state) {
            State::Enrolling(active) => {
                tracing::info!(
                    label = %active.label,
                    samples_taken = active.samples_taken,
                    "enrollment cancelled"
                );
                true
            }
            State::Idle => false,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, State::Enrolling(_))
    }

    pub fn progress(&self) -> Option<EnrollmentProgress<'_>> {
        match &self.state {
            State::Enrolling(active) => Some(EnrollmentProgress {
                label: &active.label,
                samples_taken: active.samples_taken,
                target_count: active.target_count,
            }),
            State::Idle => None,
        }
    }
}

impl Enrolling {
    fn commit(self, store: &mut TemplateStore) -> Template {
        let n = self.target_count as f64;
        let vector = Descriptor::from_raw(self.sum.iter().map(|&s| (s / n) as f32).collect());

        tracing::info!(label = %self.label, samples = self.target_count, "enrollment committed");
        store.enroll(self.label, vector).clone()
    }
}
