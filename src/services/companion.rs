//! Crowd-sourced companion requests
//!
//! Ranks nearby volunteers by distance and records each assistance request
//! in a durable log. Delivery of the request message rides the same offline
//! alert protocol as everything else, so a request made without
//! connectivity is queued and the log entry is written either way.

use crate::domain::alert::{companion_message, CompanionRequest, PendingAlert};
use crate::domain::error::StoreError;
use crate::domain::geo::{distance_meters, GeoPoint};
use crate::domain::types::new_id;
use crate::io::notifier::{ConnectivityOracle, Notifier};
use crate::io::store::JsonStore;
use crate::services::alert_queue::{DeliveryOutcome, OfflineAlertQueue};
use chrono::Utc;
use parking_lot::Mutex;
use smallvec::smallvec;
use std::path::Path;
use tracing::info;

const REQUESTS_FILE: &str = "companion_requests.json";

/// A volunteer advertised as available nearby. Transient input.
#[derive(Debug, Clone)]
pub struct Volunteer {
    pub id: String,
    pub name: String,
    pub number: String,
    pub position: GeoPoint,
}

/// A volunteer paired with its distance from the requester, in kilometers
#[derive(Debug, Clone)]
pub struct RankedVolunteer {
    pub volunteer: Volunteer,
    pub distance_km: f64,
}

/// Sort volunteers by distance from `origin`, nearest first
pub fn rank_volunteers(origin: GeoPoint, volunteers: &[Volunteer]) -> Vec<RankedVolunteer> {
    let mut ranked: Vec<RankedVolunteer> = volunteers
        .iter()
        .map(|v| RankedVolunteer {
            volunteer: v.clone(),
            distance_km: distance_meters(origin, v.position) / 1000.0,
        })
        .collect();
    ranked.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    ranked
}

pub struct CompanionService {
    store: JsonStore,
    requests: Mutex<Vec<CompanionRequest>>,
}

impl CompanionService {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, StoreError> {
        let store = JsonStore::new(dir, REQUESTS_FILE);
        let requests = store.load()?;
        Ok(Self { store, requests: Mutex::new(requests) })
    }

    /// Request a companion: deliver (or queue) the message to the single
    /// volunteer, then record the request regardless of outcome.
    pub async fn request_companion(
        &self,
        position: GeoPoint,
        volunteer: &Volunteer,
        queue: &OfflineAlertQueue,
        notifier: &dyn Notifier,
        oracle: &dyn ConnectivityOracle,
    ) -> Result<(CompanionRequest, DeliveryOutcome), StoreError> {
        let message = companion_message(position);
        let alert =
            PendingAlert::new("companion_request", &message, smallvec![volunteer.number.clone()]);
        let outcome = queue.attempt_deliver(alert, notifier, oracle).await?;

        let request = CompanionRequest {
            id: new_id(),
            volunteer_name: volunteer.name.clone(),
            volunteer_number: volunteer.number.clone(),
            message,
            timestamp: Utc::now(),
        };

        let mut requests = self.requests.lock();
        requests.push(request.clone());
        self.store.persist(&requests)?;

        info!(
            request_id = %request.id,
            volunteer = %request.volunteer_name,
            outcome = ?outcome,
            "companion_requested"
        );
        Ok((request, outcome))
    }

    /// All recorded requests in insertion order
    pub fn history(&self) -> Vec<CompanionRequest> {
        self.requests.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::DeliveryError;
    use async_trait::async_trait;
    use std::time::Duration;
    use tempfile::tempdir;

    struct AlwaysOnline;

    #[async_trait]
    impl ConnectivityOracle for AlwaysOnline {
        async fn is_reachable(&self) -> bool {
            true
        }
    }

    struct AlwaysOffline;

    #[async_trait]
    impl ConnectivityOracle for AlwaysOffline {
        async fn is_reachable(&self) -> bool {
            false
        }
    }

    struct OkNotifier;

    #[async_trait]
    impl Notifier for OkNotifier {
        async fn send(&self, _recipients: &[String], _message: &str) -> Result<(), DeliveryError> {
            Ok(())
        }
    }

    fn volunteer(name: &str, number: &str, lat: f64, lon: f64) -> Volunteer {
        Volunteer {
            id: new_id(),
            name: name.to_string(),
            number: number.to_string(),
            position: GeoPoint::new(lat, lon),
        }
    }

    #[test]
    fn test_rank_volunteers_nearest_first() {
        let origin = GeoPoint::new(0.0, 0.0);
        let volunteers = vec![
            volunteer("Far", "+911111111111", 0.010, 0.0),
            volunteer("Near", "+912222222222", 0.001, 0.0),
            volunteer("Mid", "+913333333333", 0.005, 0.0),
        ];

        let ranked = rank_volunteers(origin, &volunteers);
        let names: Vec<&str> = ranked.iter().map(|r| r.volunteer.name.as_str()).collect();
        assert_eq!(names, vec!["Near", "Mid", "Far"]);
        assert!(ranked[0].distance_km < ranked[1].distance_km);
    }

    #[test]
    fn test_rank_volunteers_empty() {
        let ranked = rank_volunteers(GeoPoint::new(0.0, 0.0), &[]);
        assert!(ranked.is_empty());
    }

    #[tokio::test]
    async fn test_request_recorded_when_delivered() {
        let dir = tempdir().unwrap();
        let service = CompanionService::open(dir.path()).unwrap();
        let queue = OfflineAlertQueue::open(dir.path(), Duration::from_secs(1)).unwrap();
        let v = volunteer("Volunteer 1", "+919876543211", 0.001, 0.001);

        let (request, outcome) = service
            .request_companion(GeoPoint::new(0.0, 0.0), &v, &queue, &OkNotifier, &AlwaysOnline)
            .await
            .unwrap();

        assert_eq!(outcome, DeliveryOutcome::Delivered);
        assert!(queue.is_empty());
        assert_eq!(service.history().len(), 1);
        assert!(request.message.contains("companion"));
    }

    #[tokio::test]
    async fn test_request_recorded_even_when_queued_offline() {
        let dir = tempdir().unwrap();
        let service = CompanionService::open(dir.path()).unwrap();
        let queue = OfflineAlertQueue::open(dir.path(), Duration::from_secs(1)).unwrap();
        let v = volunteer("Volunteer 2", "+919876543212", 0.001, 0.001);

        let (_, outcome) = service
            .request_companion(GeoPoint::new(0.0, 0.0), &v, &queue, &OkNotifier, &AlwaysOffline)
            .await
            .unwrap();

        assert_eq!(outcome, DeliveryOutcome::Queued);
        assert_eq!(queue.len(), 1);
        assert_eq!(service.history().len(), 1);
    }
}
