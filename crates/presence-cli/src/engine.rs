//! Recognition engine on a dedicated thread.
//!
//! The thread owns the pipeline (template store, enrollment session,
//! cooldown gate) and serves one request at a time, so exactly one frame
//! is in flight and no state is shared across threads.

use crate::persist::ChannelSink;
use chrono::{DateTime, Utc};
use presence_core::{
    AttendanceGate, AttendancePipeline, FrameOutcome, OutboundEvent, PipelineError, TemplateStore,
};
use presence_frame::{FaceRect, Frame, FrameError, FrameSampler};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Per-frame processing settings.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub patch_size: u32,
    pub match_threshold: f32,
    pub frame_stride: u32,
    pub equalize: bool,
    pub dark_threshold_pct: f32,
}

/// Why a frame never reached the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Dropped by the every-Nth-frame sampler.
    Sampling,
    /// Too dark to carry a usable face.
    Dark,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameReport {
    Skipped(SkipReason),
    Processed(FrameOutcome),
}

/// Messages sent from the command layer to the engine thread.
enum EngineRequest {
    BeginEnroll {
        label: String,
        target_count: usize,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    CancelEnroll {
        reply: oneshot::Sender<bool>,
    },
    Process {
        frame: Frame,
        face: Option<FaceRect>,
        now: DateTime<Utc>,
        reply: oneshot::Sender<Result<FrameReport, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    pub async fn begin_enroll(&self, label: &str, target_count: usize) -> Result<(), EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(EngineRequest::BeginEnroll {
            label: label.to_string(),
            target_count,
            reply: reply_tx,
        })
        .await?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub async fn cancel_enroll(&self) -> Result<bool, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(EngineRequest::CancelEnroll { reply: reply_tx })
            .await?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Run one frame through sampling, preparation and the pipeline.
    /// `face` defaults to the whole frame.
    pub async fn process(
        &self,
        frame: Frame,
        face: Option<FaceRect>,
        now: DateTime<Utc>,
    ) -> Result<FrameReport, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(EngineRequest::Process {
            frame,
            face,
            now,
            reply: reply_tx,
        })
        .await?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    async fn send(&self, req: EngineRequest) -> Result<(), EngineError> {
        self.tx
            .send(req)
            .await
            .map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the engine thread. It exits once every [`EngineHandle`] is
/// dropped, which in turn closes the `events` channel.
pub fn spawn_engine(
    store: TemplateStore,
    gate: AttendanceGate,
    settings: EngineSettings,
    events: mpsc::UnboundedSender<OutboundEvent>,
) -> Result<EngineHandle, EngineError> {
    tracing::info!(
        templates = store.len(),
        cooldown_secs = gate.cooldown().as_secs_f64(),
        threshold = settings.match_threshold,
        "starting engine"
    );

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);
    let mut worker = Worker {
        pipeline: AttendancePipeline::new(store, gate, ChannelSink::new(events)),
        sampler: FrameSampler::new(settings.frame_stride),
        settings,
    };

    std::thread::Builder::new()
        .name("presence-engine".into())
        .spawn(move || {
            tracing::debug!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::BeginEnroll {
                        label,
                        target_count,
                        reply,
                    } => {
                        let result = worker
                            .pipeline
                            .begin_enrollment(label, target_count)
                            .map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                    EngineRequest::CancelEnroll { reply } => {
                        let _ = reply.send(worker.pipeline.cancel_enrollment());
                    }
                    EngineRequest::Process {
                        frame,
                        face,
                        now,
                        reply,
                    } => {
                        let _ = reply.send(worker.process(frame, face, now));
                    }
                }
            }
            tracing::debug!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}

struct Worker {
    pipeline: AttendancePipeline<ChannelSink>,
    sampler: FrameSampler,
    settings: EngineSettings,
}

impl Worker {
    fn process(
        &mut self,
        mut frame: Frame,
        face: Option<FaceRect>,
        now: DateTime<Utc>,
    ) -> Result<FrameReport, EngineError> {
        if !self.sampler.admit() {
            return Ok(FrameReport::Skipped(SkipReason::Sampling));
        }
        if presence_frame::is_dark_frame(&frame.data, self.settings.dark_threshold_pct) {
            tracing::warn!(sequence = frame.sequence, "skipping dark frame");
            return Ok(FrameReport::Skipped(SkipReason::Dark));
        }
        if self.settings.equalize {
            presence_frame::equalize_hist(&mut frame.data);
        }

        let rect = face.unwrap_or_else(|| FaceRect::full(frame.width, frame.height));
        let size = self.settings.patch_size;
        let patch = presence_frame::crop_resize_area(&frame, &rect, size)?;

        let outcome = self.pipeline.process_patch(
            &patch,
            size,
            size,
            now,
            self.settings.match_threshold,
        )?;
        Ok(FrameReport::Processed(outcome))
    }
}
