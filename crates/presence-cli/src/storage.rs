//! On-disk template store and attendance log.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use presence_core::{AttendanceEvent, TemplateStore};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Load the template store; a missing file is an empty store.
pub async fn load_store(path: &Path) -> Result<TemplateStore> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => TemplateStore::from_json(&text)
            .with_context(|| format!("parsing template store {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(TemplateStore::new()),
        Err(e) => Err(e).with_context(|| format!("reading template store {}", path.display())),
    }
}

/// Write the store through a temporary file so readers never see a partial file.
pub async fn save_store(path: &Path, store: &TemplateStore) -> Result<()> {
    ensure_parent(path).await?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, store.to_json()?)
        .await
        .with_context(|| format!("writing {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}

/// One persisted attendance entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub ts: DateTime<Utc>,
    pub name: String,
    pub score: f32,
}

impl From<&AttendanceEvent> for AttendanceRecord {
    fn from(event: &AttendanceEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            ts: event.timestamp,
            name: event.label.clone(),
            score: event.score,
        }
    }
}

pub async fn append_attendance(path: &Path, record: &AttendanceRecord) -> Result<()> {
    ensure_parent(path).await?;
    let mut line = serde_json::to_string(record)?;
    line.push('\n');
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("opening attendance log {}", path.display()))?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

/// Attendance records, newest first. Malformed lines are skipped.
pub async fn read_attendance(path: &Path) -> Result<Vec<AttendanceRecord>> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(e).with_context(|| format!("reading attendance log {}", path.display()))
        }
    };

    let mut records: Vec<AttendanceRecord> = text
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(n, line)| match serde_json::from_str(line) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(line = n + 1, error = %e, "skipping malformed attendance line");
                None
            }
        })
        .collect();
    records.reverse();
    Ok(records)
}

pub async fn clear_attendance(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
            Err(e).with_context(|| format!("removing {}", path.display()))
        }
        _ => Ok(()),
    }
}

/// CSV with header `ts,name,score`; names are JSON-quoted.
pub fn attendance_csv(records: &[AttendanceRecord]) -> Result<String> {
    let mut out = String::from("ts,name,score");
    for r in records {
        out.push('\n');
        out.push_str(&format!(
            "{},{},{}",
            r.ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            serde_json::to_string(&r.name)?,
            r.score
        ));
    }
    Ok(out)
}

async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    Ok(())
}
