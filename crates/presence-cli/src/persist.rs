//! Fire-and-forget persistence of pipeline output.
//!
//! The engine thread pushes [`OutboundEvent`]s into an unbounded channel;
//! this task drains it and writes to disk. A failed write is logged and
//! counted. The in-memory template store and cooldown registry keep the
//! change either way.

use crate::storage::{self, AttendanceRecord};
use anyhow::Result;
use presence_core::{EventSink, OutboundEvent, Template};
use std::path::PathBuf;
use tokio::sync::mpsc;

/// [`EventSink`] that forwards into the persistence channel without blocking.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<OutboundEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<OutboundEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: OutboundEvent) {
        if self.tx.send(event).is_err() {
            tracing::warn!("persistence task gone; outbound event dropped");
        }
    }
}

/// Counts reported once the channel closes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PersistSummary {
    pub templates_saved: usize,
    pub events_saved: usize,
    pub failures: usize,
}

pub struct Persistence {
    pub templates_path: PathBuf,
    pub attendance_path: PathBuf,
}

impl Persistence {
    /// Drain `rx` until every sender is dropped.
    pub async fn run(self, mut rx: mpsc::UnboundedReceiver<OutboundEvent>) -> PersistSummary {
        let mut summary = PersistSummary::default();

        while let Some(event) = rx.recv().await {
            let result = match &event {
                OutboundEvent::TemplateCommitted(template) => self
                    .save_template(template)
                    .await
                    .map(|()| summary.templates_saved += 1),
                OutboundEvent::Attendance(ev) => {
                    let record = AttendanceRecord::from(ev);
                    storage::append_attendance(&self.attendance_path, &record)
                        .await
                        .map(|()| summary.events_saved += 1)
                }
            };

            if let Err(err) = result {
                summary.failures += 1;
                tracing::warn!(
                    error = %format!("{err:#}"),
                    ?event,
                    "persisting event failed; local state kept"
                );
            }
        }

        tracing::debug!(?summary, "persistence task finished");
        summary
    }

    /// Upsert one template into the store file.
    async fn save_template(&self, template: &Template) -> Result<()> {
        let mut store = storage::load_store(&self.templates_path).await?;
        store.enroll(template.label.clone(), template.vector.clone());
        storage::save_store(&self.templates_path, &store).await?;
        tracing::info!(
            label = %template.label,
            path = %self.templates_path.display(),
            "template persisted"
        );
        Ok(())
    }
}
