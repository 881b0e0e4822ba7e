//! presence-core — Face recognition core for attendance capture.
//!
//! Turns fixed-size grayscale face patches into LBP histogram descriptors,
//! matches them against enrolled templates by cosine similarity, averages
//! enrollment samples into templates, and gates repeated attendance events
//! behind a per-identity cooldown.

pub mod descriptor;
pub mod enrollment;
pub mod events;
pub mod gate;
pub mod matcher;
pub mod pipeline;
pub mod store;
pub mod types;

pub use descriptor::{extract, DescriptorError, DEFAULT_PATCH_SIZE};
pub use enrollment::{EnrollmentError, EnrollmentProgress, EnrollmentSession, SampleOutcome};
pub use events::{EventSink, NullSink, OutboundEvent};
pub use gate::{AttendanceGate, DEFAULT_COOLDOWN};
pub use matcher::{CosineMatcher, Matcher, DEFAULT_MATCH_THRESHOLD};
pub use pipeline::{AttendancePipeline, FrameOutcome, PipelineError};
pub use store::{StoreError, TemplateStore};
pub use types::{
    AttendanceEvent, Decision, Descriptor, MatchResult, Template, DESCRIPTOR_LEN, UNKNOWN_LABEL,
};
