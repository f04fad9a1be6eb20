//! End-to-end tests for the monitor pipeline
//!
//! Drives the monitor with synthetic ingest events over real (tempdir)
//! stores, substituting the notifier and connectivity oracle with mocks.

use async_trait::async_trait;
use guardian_pulse::domain::error::DeliveryError;
use guardian_pulse::domain::geo::GeoPoint;
use guardian_pulse::domain::types::{IngestEvent, IngestKind, PositionSample};
use guardian_pulse::infra::Metrics;
use guardian_pulse::io::{ConnectivityOracle, Notifier};
use guardian_pulse::services::{
    ContactStore, ExitEventLog, GeoFenceMonitor, OfflineAlertQueue, SafeZoneStore,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::tempdir;

/// Oracle whose reachability can be flipped mid-test
struct SwitchableOracle {
    reachable: AtomicBool,
}

impl SwitchableOracle {
    fn new(reachable: bool) -> Arc<Self> {
        Arc::new(Self { reachable: AtomicBool::new(reachable) })
    }

    fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectivityOracle for SwitchableOracle {
    async fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}

/// Notifier that records every delivered message
#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(Vec<String>, String)>>,
    fail_next: AtomicBool,
}

impl RecordingNotifier {
    fn sent_messages(&self) -> Vec<(Vec<String>, String)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, recipients: &[String], message: &str) -> Result<(), DeliveryError> {
        if recipients.is_empty() {
            return Err(DeliveryError::NoRecipients);
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(DeliveryError::SendFailed("injected failure".to_string()));
        }
        self.sent.lock().push((recipients.to_vec(), message.to_string()));
        Ok(())
    }
}

struct Harness {
    monitor: GeoFenceMonitor,
    zones: Arc<SafeZoneStore>,
    contacts: Arc<ContactStore>,
    exit_log: Arc<ExitEventLog>,
    queue: Arc<OfflineAlertQueue>,
    notifier: Arc<RecordingNotifier>,
    oracle: Arc<SwitchableOracle>,
    _dir: tempfile::TempDir,
}

fn harness(online: bool) -> Harness {
    let dir = tempdir().unwrap();
    let zones = Arc::new(SafeZoneStore::open(dir.path()).unwrap());
    let contacts = Arc::new(ContactStore::open(dir.path()).unwrap());
    let exit_log = Arc::new(ExitEventLog::open(dir.path()).unwrap());
    let queue = Arc::new(OfflineAlertQueue::open(dir.path(), Duration::from_secs(1)).unwrap());
    let notifier = Arc::new(RecordingNotifier::default());
    let oracle = SwitchableOracle::new(online);
    let metrics = Arc::new(Metrics::new());

    let monitor = GeoFenceMonitor::new(
        zones.clone(),
        contacts.clone(),
        exit_log.clone(),
        queue.clone(),
        notifier.clone(),
        oracle.clone(),
        metrics,
    );

    Harness { monitor, zones, contacts, exit_log, queue, notifier, oracle, _dir: dir }
}

fn position(lat: f64, lon: f64) -> IngestEvent {
    IngestEvent {
        kind: IngestKind::Position(PositionSample { point: GeoPoint::new(lat, lon), ts_ms: 0 }),
        received_at: Instant::now(),
    }
}

fn sos(trigger: &str) -> IngestEvent {
    IngestEvent {
        kind: IngestKind::Sos { trigger: trigger.to_string() },
        received_at: Instant::now(),
    }
}

/// ~0.002 deg latitude is ~222 m: outside a 100 m zone at the origin
const OUTSIDE_LAT: f64 = 0.002;

#[tokio::test]
async fn exit_is_detected_logged_and_delivered() {
    let mut h = harness(true);
    h.zones.add("Home", GeoPoint::new(0.0, 0.0), 100.0).unwrap();
    h.contacts.add("Bhai", "+919876543210").unwrap();
    h.contacts.add("Amma", "+919876543211").unwrap();

    h.monitor.process_event(position(0.0, 0.0)).await;
    h.monitor.process_event(position(OUTSIDE_LAT, 0.0)).await;

    assert_eq!(h.exit_log.len(), 1);
    assert!(h.queue.is_empty());

    let sent = h.notifier.sent_messages();
    assert_eq!(sent.len(), 1);
    let (recipients, message) = &sent[0];
    assert_eq!(recipients, &["+919876543210".to_string(), "+919876543211".to_string()]);
    assert!(message.contains("exited safe zone Home"));
    // Message embeds the zone center, not the user's current position
    assert!(message.contains("Lat: 0, Lon: 0"));
}

#[tokio::test]
async fn repeated_outside_samples_fire_once() {
    let mut h = harness(true);
    h.zones.add("Home", GeoPoint::new(0.0, 0.0), 100.0).unwrap();
    h.contacts.add("Bhai", "+919876543210").unwrap();

    h.monitor.process_event(position(0.0, 0.0)).await;
    for _ in 0..3 {
        h.monitor.process_event(position(OUTSIDE_LAT, 0.0)).await;
    }

    assert_eq!(h.exit_log.len(), 1);
    assert_eq!(h.notifier.sent_messages().len(), 1);
}

#[tokio::test]
async fn outside_inside_outside_fires_twice() {
    let mut h = harness(true);
    h.zones.add("Home", GeoPoint::new(0.0, 0.0), 100.0).unwrap();
    h.contacts.add("Bhai", "+919876543210").unwrap();

    h.monitor.process_event(position(OUTSIDE_LAT, 0.0)).await;
    h.monitor.process_event(position(0.0, 0.0)).await;
    h.monitor.process_event(position(OUTSIDE_LAT, 0.0)).await;

    assert_eq!(h.exit_log.len(), 2);
}

#[tokio::test]
async fn offline_exit_queues_and_flush_drains_in_order() {
    let mut h = harness(false);
    h.zones.add("Home", GeoPoint::new(0.0, 0.0), 100.0).unwrap();
    h.zones.add("Work", GeoPoint::new(0.0, 0.01), 100.0).unwrap();
    h.contacts.add("Bhai", "+919876543210").unwrap();

    // Inside Home, outside Work: Work fires (unknown -> outside) and queues
    h.monitor.process_event(position(0.0, 0.0)).await;
    // Leaving Home too
    h.monitor.process_event(position(OUTSIDE_LAT, 0.0)).await;

    assert_eq!(h.exit_log.len(), 2);
    assert_eq!(h.queue.len(), 2);
    assert!(h.notifier.sent_messages().is_empty());

    // Connectivity returns; the periodic flush drains in insertion order
    h.oracle.set_reachable(true);
    h.monitor.flush_pending().await;

    assert!(h.queue.is_empty());
    let sent = h.notifier.sent_messages();
    assert_eq!(sent.len(), 2);
    assert!(sent[0].1.contains("Work"));
    assert!(sent[1].1.contains("Home"));
}

#[tokio::test]
async fn flush_stops_at_first_failure_and_resumes() {
    let mut h = harness(false);
    h.zones.add("Home", GeoPoint::new(0.0, 0.0), 100.0).unwrap();
    h.contacts.add("Bhai", "+919876543210").unwrap();

    // Two queued alerts: one exit, one SOS
    h.monitor.process_event(position(0.0, 0.0)).await;
    h.monitor.process_event(position(OUTSIDE_LAT, 0.0)).await;
    h.monitor.process_event(sos("button")).await;
    assert_eq!(h.queue.len(), 2);

    h.oracle.set_reachable(true);
    h.notifier.fail_next.store(true, Ordering::SeqCst);
    h.monitor.flush_pending().await;

    // First delivery failed: both alerts remain, order preserved
    assert_eq!(h.queue.len(), 2);
    let pending = h.queue.pending();
    assert_eq!(pending[0].reason, "geofence_exit");
    assert_eq!(pending[1].reason, "sos: button");

    // Next flush succeeds
    h.monitor.flush_pending().await;
    assert!(h.queue.is_empty());
    assert_eq!(h.notifier.sent_messages().len(), 2);
}

#[tokio::test]
async fn sos_delivers_with_current_position() {
    let mut h = harness(true);
    h.contacts.add("Bhai", "+919876543210").unwrap();

    h.monitor.process_event(position(12.9716, 77.5946)).await;
    h.monitor.process_event(sos("shake")).await;

    let sent = h.notifier.sent_messages();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].1.contains("shake"));
    assert!(sent[0].1.contains("12.9716"));
    // SOS leaves the exit log alone
    assert!(h.exit_log.is_empty());
}

#[tokio::test]
async fn no_contacts_alert_becomes_deliverable_after_adding_one() {
    let mut h = harness(true);
    h.zones.add("Home", GeoPoint::new(0.0, 0.0), 100.0).unwrap();

    h.monitor.process_event(position(0.0, 0.0)).await;
    h.monitor.process_event(position(OUTSIDE_LAT, 0.0)).await;

    let pending = h.queue.pending();
    assert_eq!(pending.len(), 1);
    assert!(pending[0].reason.contains("undeliverable: no recipients"));

    // A flush without contacts cannot deliver it
    h.monitor.flush_pending().await;
    assert_eq!(h.queue.len(), 1);

    // Once a contact exists, the flush fills in recipients and drains
    h.contacts.add("Bhai", "+919876543210").unwrap();
    h.monitor.flush_pending().await;
    assert!(h.queue.is_empty());
    assert_eq!(h.notifier.sent_messages()[0].0, vec!["+919876543210".to_string()]);
}

#[tokio::test]
async fn queued_alerts_survive_restart() {
    let dir = tempdir().unwrap();
    let notifier = Arc::new(RecordingNotifier::default());
    let oracle = SwitchableOracle::new(false);

    {
        let zones = Arc::new(SafeZoneStore::open(dir.path()).unwrap());
        let contacts = Arc::new(ContactStore::open(dir.path()).unwrap());
        let exit_log = Arc::new(ExitEventLog::open(dir.path()).unwrap());
        let queue =
            Arc::new(OfflineAlertQueue::open(dir.path(), Duration::from_secs(1)).unwrap());
        zones.add("Home", GeoPoint::new(0.0, 0.0), 100.0).unwrap();
        contacts.add("Bhai", "+919876543210").unwrap();

        let mut monitor = GeoFenceMonitor::new(
            zones,
            contacts,
            exit_log,
            queue,
            notifier.clone(),
            oracle.clone(),
            Arc::new(Metrics::new()),
        );
        monitor.process_event(position(0.0, 0.0)).await;
        monitor.process_event(position(OUTSIDE_LAT, 0.0)).await;
    }

    // "Restart": fresh stores over the same directory
    let zones = Arc::new(SafeZoneStore::open(dir.path()).unwrap());
    let contacts = Arc::new(ContactStore::open(dir.path()).unwrap());
    let exit_log = Arc::new(ExitEventLog::open(dir.path()).unwrap());
    let queue = Arc::new(OfflineAlertQueue::open(dir.path(), Duration::from_secs(1)).unwrap());

    assert_eq!(exit_log.len(), 1);
    assert_eq!(queue.len(), 1);

    oracle.set_reachable(true);
    let monitor = GeoFenceMonitor::new(
        zones,
        contacts,
        exit_log,
        queue.clone(),
        notifier.clone(),
        oracle,
        Arc::new(Metrics::new()),
    );
    monitor.flush_pending().await;

    assert!(queue.is_empty());
    assert_eq!(notifier.sent_messages().len(), 1);
}

#[tokio::test]
async fn safety_score_reflects_recent_exits() {
    let mut h = harness(true);
    h.zones.add("Home", GeoPoint::new(0.0, 0.0), 100.0).unwrap();
    h.contacts.add("Bhai", "+919876543210").unwrap();

    assert_eq!(h.exit_log.safety_score(), 100);

    h.monitor.process_event(position(0.0, 0.0)).await;
    h.monitor.process_event(position(OUTSIDE_LAT, 0.0)).await;
    h.monitor.process_event(position(0.0, 0.0)).await;
    h.monitor.process_event(position(OUTSIDE_LAT, 0.0)).await;

    assert_eq!(h.exit_log.len(), 2);
    assert_eq!(h.exit_log.safety_score(), 90);
}
