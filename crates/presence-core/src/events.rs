//! Outbound side effects of the pipeline.
//!
//! The pipeline applies every state change locally first, then hands the
//! result to an [`EventSink`]. Sinks are fire-and-forget: whatever happens
//! downstream never rolls back the template store or the attendance gate.

use crate::types::{AttendanceEvent, Template};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// An enrollment committed a new or replacement template.
    TemplateCommitted(Template),
    /// An identification passed the cooldown gate.
    Attendance(AttendanceEvent),
}

/// Receiver for outbound events. Must not block.
pub trait EventSink {
    fn emit(&self, event: OutboundEvent);
}

impl<F> EventSink for F
where
    F: Fn(OutboundEvent),
{
    fn emit(&self, event: OutboundEvent) {
        self(event)
    }
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: OutboundEvent) {}
}
