//! Per-identity cooldown for attendance events.

use crate::types::AttendanceEvent;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;

/// Cooldown used when none is configured.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(10);

/// Suppresses repeat events for the same label inside the cooldown window.
///
/// The last-seen registry is only written when an event is let through.
#[derive(Debug, Clone)]
pub struct AttendanceGate {
    cooldown: Duration,
    last_seen: HashMap<String, DateTime<Utc>>,
}

impl Default for AttendanceGate {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

impl AttendanceGate {
    /// A zero cooldown lets every identification through.
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_seen: HashMap::new(),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Whether `label` may produce an event at `now`; records `now` if so.
    ///
    /// A clock that went backwards since the last event counts as still
    /// cooling down.
    pub fn allow(&mut self, label: &str, now: DateTime<Utc>) -> bool {
        let open = match self.last_seen.get(label) {
            None => true,
            Some(_) if self.cooldown.is_zero() => true,
            Some(&last) => (now - last)
                .to_std()
                .map_or(false, |elapsed| elapsed >= self.cooldown),
        };

        if open {
            self.last_seen.insert(label.to_string(), now);
        } else {
            tracing::trace!(label, "attendance suppressed by cooldown");
        }
        open
    }

    /// Gate an identification, producing the event when allowed.
    pub fn admit(
        &mut self,
        label: &str,
        score: f32,
        now: DateTime<Utc>,
    ) -> Option<AttendanceEvent> {
        self.allow(label, now).then(|| AttendanceEvent {
            label: label.to_string(),
            score,
            timestamp: now,
        })
    }

    /// Forget every identity.
    pub fn reset(&mut self) {
        self.last_seen.clear();
    }
}
