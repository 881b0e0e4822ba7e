//! Per-frame orchestration.
//!
//! One call per face patch: extract a descriptor, then either feed the
//! active enrollment or match against the store and gate the result.
//! Local state is updated before anything is emitted to the sink.

use crate::descriptor::{self, DescriptorError};
use crate::enrollment::{EnrollmentError, EnrollmentProgress, EnrollmentSession, SampleOutcome};
use crate::events::{EventSink, OutboundEvent};
use crate::gate::AttendanceGate;
use crate::matcher::{CosineMatcher, Matcher};
use crate::store::TemplateStore;
use crate::types::{AttendanceEvent, Decision, Descriptor, Template};
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("descriptor: {0}")]
    Descriptor(#[from] DescriptorError),
    #[error("enrollment: {0}")]
    Enrollment(#[from] EnrollmentError),
}

/// What a processed frame produced.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// Sample accumulated; enrollment continues.
    Sampled {
        label: String,
        samples_taken: usize,
        target_count: usize,
    },
    /// Enrollment reached its target and committed this template.
    Enrolled(Template),
    /// Matching ran. `event` is set only if the decision was an
    /// identification that passed the cooldown gate.
    Recognized {
        decision: Decision,
        event: Option<AttendanceEvent>,
    },
}

/// Owns all mutable recognition state for a single frame-driving loop.
pub struct AttendancePipeline<S: EventSink> {
    store: TemplateStore,
    session: EnrollmentSession,
    gate: AttendanceGate,
    matcher: CosineMatcher,
    sink: S,
}

impl<S: EventSink> AttendancePipeline<S> {
    pub fn new(store: TemplateStore, gate: AttendanceGate, sink: S) -> Self {
        Self {
            store,
            session: EnrollmentSession::new(),
            gate,
            matcher: CosineMatcher,
            sink,
        }
    }

    pub fn store(&self) -> &TemplateStore {
        &self.store
    }

    /// Direct store access for management operations (list/remove/import).
    pub fn store_mut(&mut self) -> &mut TemplateStore {
        &mut self.store
    }

    pub fn gate(&self) -> &AttendanceGate {
        &self.gate
    }

    pub fn enrollment(&self) -> Option<EnrollmentProgress<'_>> {
        self.session.progress()
    }

    pub fn begin_enrollment(
        &mut self,
        label: impl Into<String>,
        target_count: usize,
    ) -> Result<(), PipelineError> {
        Ok(self.session.begin(label, target_count)?)
    }

    pub fn cancel_enrollment(&mut self) -> bool {
        self.session.cancel()
    }

    /// Process one grayscale face patch captured at `now`.
    pub fn process_patch(
        &mut self,
        patch: &[u8],
        width: u32,
        height: u32,
        now: DateTime<Utc>,
        threshold: f32,
    ) -> Result<FrameOutcome, PipelineError> {
        let descriptor = descriptor::extract(patch, width, height)?;
        self.process_descriptor(&descriptor, now, threshold)
    }

    /// Same as [`process_patch`](Self::process_patch) for an already extracted descriptor.
    pub fn process_descriptor(
        &mut self,
        descriptor: &Descriptor,
        now: DateTime<Utc>,
        threshold: f32,
    ) -> Result<FrameOutcome, PipelineError> {
        if self.session.is_active() {
            return match self.session.add_sample(descriptor, &mut self.store)? {
                SampleOutcome::Pending {
                    label,
                    samples_taken,
                    target_count,
                } => Ok(FrameOutcome::Sampled {
                    label,
                    samples_taken,
                    target_count,
                }),
                SampleOutcome::Committed(template) => {
                    self.sink
                        .emit(OutboundEvent::TemplateCommitted(template.clone()));
                    Ok(FrameOutcome::Enrolled(template))
                }
            };
        }

        let decision = self
            .matcher
            .decide(descriptor, self.store.list(), threshold);

        let event = match &decision {
            Decision::Identified { label, score } => self.gate.admit(label, *score, now),
            Decision::Unknown { .. } => None,
        };

        match &event {
            Some(ev) => {
                tracing::info!(label = %ev.label, score = ev.score, "attendance recorded");
                self.sink.emit(OutboundEvent::Attendance(ev.clone()));
            }
            None => tracing::debug!(%decision, "frame recognized"),
        }

        Ok(FrameOutcome::Recognized { decision, event })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullSink;

    #[test]
    fn test_invalid_patch_leaves_state_untouched() {
        let mut pipeline =
            AttendancePipeline::new(TemplateStore::new(), AttendanceGate::default(), NullSink);
        pipeline.begin_enrollment("L", 2).unwrap();

        let err = pipeline
            .process_patch(&[0u8; 4], 2, 2, Utc::now(), 0.9)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Descriptor(_)));
        assert_eq!(pipeline.enrollment().unwrap().samples_taken, 0);
    }

    #[test]
    fn test_empty_store_recognizes_unknown() {
        let mut pipeline =
            AttendancePipeline::new(TemplateStore::new(), AttendanceGate::default(), NullSink);
        let outcome = pipeline
            .process_patch(&[128u8; 100 * 100], 100, 100, Utc::now(), 0.9)
            .unwrap();
        assert_eq!(
            outcome,
            FrameOutcome::Recognized {
                decision: Decision::Unknown { score: 0.0 },
                event: None,
            }
        );
    }
}
