//! Duplicate suppression for alerts.

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sentinel_core::types::{Alert, AlertType};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Longest cooldown an alert config may declare.
pub const MAX_COOLDOWN_SECS: u64 = (i64::MAX / 1000) as u64;

/// Remembers when each `(alert type, subject)` last fired and suppresses
/// repeats inside the cooldown window.
///
/// The check and the update happen under the map's per-key entry lock, so
/// two concurrent candidates for the same key admit at most one.
#[derive(Debug, Default)]
pub struct CooldownGate {
    last_fired: DashMap<(AlertType, String), DateTime<Utc>>,
    suppressed: AtomicU64,
}

impl CooldownGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit `candidate` if its key never fired or fired at least
    /// `cooldown_seconds` before `now`. An admitted candidate records `now`.
    /// A window too long to represent never expires.
    pub fn admit(&self, candidate: &Alert, cooldown_seconds: u64, now: DateTime<Utc>) -> bool {
        let window = i64::try_from(cooldown_seconds)
            .ok()
            .and_then(Duration::try_seconds);
        let key = (candidate.alert_type, candidate.subject_id.clone());

        match self.last_fired.entry(key) {
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
            Entry::Occupied(mut entry) => {
                let elapsed = now - *entry.get();
                if window.is_some_and(|window| elapsed >= window) {
                    entry.insert(now);
                    true
                } else {
                    self.suppressed.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        alert_type = %candidate.alert_type,
                        subject = %candidate.subject_id,
                        last_fired = %entry.get(),
                        "Alert suppressed by cooldown"
                    );
                    false
                }
            }
        }
    }

    pub fn last_fired(&self, alert_type: AlertType, subject_id: &str) -> Option<DateTime<Utc>> {
        self.last_fired
            .get(&(alert_type, subject_id.to_string()))
            .map(|entry| *entry.value())
    }

    /// Candidates rejected since the gate was created.
    pub fn suppressed_count(&self) -> u64 {
        self.suppressed.load(Ordering::Relaxed)
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.last_fired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_fired.is_empty()
    }
}
