//! Persisted records: safe zones, exit events, pending alerts, companion requests

use crate::domain::geo::GeoPoint;
use crate::domain::types::{new_id, ZoneId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// A named circular region the user is expected to remain within.
///
/// Immutable once created; the store only appends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafeZone {
    pub id: ZoneId,
    pub name: String,
    pub center: GeoPoint,
    /// Radius in meters, strictly positive
    pub radius_m: f64,
}

/// A recorded inside -> outside transition for one safe zone.
///
/// The zone reference is weak: the event stays valid history even if the
/// zone is later removed, so the zone name is denormalized in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitEvent {
    pub id: String,
    pub zone_id: ZoneId,
    pub zone_name: String,
    pub timestamp: DateTime<Utc>,
}

impl ExitEvent {
    pub fn new(zone_id: ZoneId, zone_name: &str) -> Self {
        Self { id: new_id(), zone_id, zone_name: zone_name.to_string(), timestamp: Utc::now() }
    }
}

/// An alert that could not be delivered and is awaiting connectivity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAlert {
    pub id: String,
    pub reason: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Recipient phone numbers in contact order; may be empty when the
    /// alert was queued with no contacts configured
    pub recipients: SmallVec<[String; 4]>,
}

impl PendingAlert {
    pub fn new(reason: &str, message: &str, recipients: SmallVec<[String; 4]>) -> Self {
        Self {
            id: new_id(),
            reason: reason.to_string(),
            message: message.to_string(),
            timestamp: Utc::now(),
            recipients,
        }
    }

    /// Flag the alert as having had no recipients at queue time
    pub fn flag_no_recipients(mut self) -> Self {
        self.reason = format!("{} (undeliverable: no recipients)", self.reason);
        self
    }
}

/// A recorded request for a volunteer companion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanionRequest {
    pub id: String,
    pub volunteer_name: String,
    pub volunteer_number: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Alert text for a safe-zone exit.
///
/// Embeds the zone center, not the user's current position: the alert
/// identifies which declared region was left.
pub fn exit_message(zone: &SafeZone) -> String {
    format!(
        "ALERT: User has exited safe zone {} (Lat: {}, Lon: {}).",
        zone.name, zone.center.lat, zone.center.lon
    )
}

/// Alert text for an SOS trigger, embedding the current position when known
pub fn sos_message(trigger: &str, position: Option<GeoPoint>) -> String {
    match position {
        Some(p) => format!("SOS! Emergency triggered from {}. My location: {}", trigger, p),
        None => format!("SOS! Emergency triggered from {}. Location unavailable.", trigger),
    }
}

/// Request text for the companion flow
pub fn companion_message(position: GeoPoint) -> String {
    format!("Request: Please assist as a companion. My location: {}.", position)
}
