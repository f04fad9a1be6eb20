//! Exit-event log and the weekly safety score
//!
//! Append-only history of safe-zone exits. The safety score is a derived
//! view recomputed on demand; it is never persisted, so the log stays the
//! single source of truth.

use crate::domain::alert::ExitEvent;
use crate::domain::error::StoreError;
use crate::domain::types::ZoneId;
use crate::io::store::JsonStore;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::path::Path;
use tracing::info;

const EXITS_FILE: &str = "geofence_exits.json";

/// Scoring window for the weekly safety score
const SCORE_WINDOW_DAYS: i64 = 7;
/// Points deducted per exit inside the window
const SCORE_PENALTY: i64 = 5;

pub struct ExitEventLog {
    store: JsonStore,
    events: Mutex<Vec<ExitEvent>>,
}

impl ExitEventLog {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, StoreError> {
        let store = JsonStore::new(dir, EXITS_FILE);
        let events = store.load()?;
        Ok(Self { store, events: Mutex::new(events) })
    }

    /// Record one exit, stamped now
    pub fn append(&self, zone_id: ZoneId, zone_name: &str) -> Result<ExitEvent, StoreError> {
        let event = ExitEvent::new(zone_id, zone_name);

        let mut events = self.events.lock();
        events.push(event.clone());
        self.store.persist(&events)?;

        info!(event_id = %event.id, zone_id = %event.zone_id, zone = %event.zone_name, "exit_event_recorded");
        Ok(event)
    }

    /// All events in insertion order
    pub fn all(&self) -> Vec<ExitEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Exits recorded at or after `since`
    pub fn count_since(&self, since: DateTime<Utc>) -> usize {
        self.events.lock().iter().filter(|e| e.timestamp >= since).count()
    }

    /// Weekly safety score: 100 minus 5 per exit in the last 7 days,
    /// floored at 0. Exits older than the window do not count.
    pub fn safety_score_at(&self, now: DateTime<Utc>) -> u8 {
        let since = now - Duration::days(SCORE_WINDOW_DAYS);
        let recent = self.count_since(since) as i64;
        (100 - SCORE_PENALTY * recent).max(0) as u8
    }

    pub fn safety_score(&self) -> u8 {
        self.safety_score_at(Utc::now())
    }
}
