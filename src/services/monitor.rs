//! Geo-fence monitor - the central sample processor
//!
//! Consumes the ingest event stream and evaluates every position sample
//! against all declared safe zones. Exit detection is edge-triggered: an
//! exit action fires only when a zone's membership transitions from inside
//! (or never-observed) to outside, never on repeated outside samples.
//!
//! The exit action appends to the exit-event log and then hands the alert
//! to the offline queue's delivery protocol. Storage errors on this path
//! are logged and counted but never tear down the sampling loop.

use crate::domain::alert::{exit_message, sos_message, PendingAlert, SafeZone};
use crate::domain::geo::{distance_meters, GeoPoint};
use crate::domain::types::{IngestEvent, IngestKind, Membership, PositionSample, ZoneId};
use crate::infra::metrics::Metrics;
use crate::io::notifier::{ConnectivityOracle, Notifier};
use crate::services::alert_queue::{DeliveryOutcome, OfflineAlertQueue};
use crate::services::contacts::ContactStore;
use crate::services::exit_log::ExitEventLog;
use crate::services::zones::SafeZoneStore;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, warn};

pub struct GeoFenceMonitor {
    zones: Arc<SafeZoneStore>,
    contacts: Arc<ContactStore>,
    exit_log: Arc<ExitEventLog>,
    queue: Arc<OfflineAlertQueue>,
    notifier: Arc<dyn Notifier>,
    oracle: Arc<dyn ConnectivityOracle>,
    metrics: Arc<Metrics>,
    /// Last observed membership per zone; zones absent here are unknown
    membership: FxHashMap<ZoneId, Membership>,
    /// Most recent sample, used for SOS messages
    last_position: Option<GeoPoint>,
}

impl GeoFenceMonitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        zones: Arc<SafeZoneStore>,
        contacts: Arc<ContactStore>,
        exit_log: Arc<ExitEventLog>,
        queue: Arc<OfflineAlertQueue>,
        notifier: Arc<dyn Notifier>,
        oracle: Arc<dyn ConnectivityOracle>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            zones,
            contacts,
            exit_log,
            queue,
            notifier,
            oracle,
            metrics,
            membership: FxHashMap::default(),
            last_position: None,
        }
    }

    /// Consume ingest events until the channel closes or shutdown fires.
    ///
    /// The periodic tick re-runs the offline queue flush; flush is
    /// idempotent, so the schedule needs no coordination with deliveries
    /// happening inline.
    pub async fn run(
        &mut self,
        mut event_rx: mpsc::Receiver<IngestEvent>,
        mut shutdown: watch::Receiver<bool>,
        flush_interval: Duration,
    ) {
        let mut flush_tick = interval(flush_interval);
        info!(zones = %self.zones.len(), contacts = %self.contacts.list().len(), "monitor_started");

        loop {
            tokio::select! {
                event = event_rx.recv() => {
                    match event {
                        Some(e) => self.process_event(e).await,
                        None => break,
                    }
                }
                _ = flush_tick.tick() => {
                    self.flush_pending().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("monitor_shutdown");
                        break;
                    }
                }
            }
        }
    }

    /// Process a single ingest event
    pub async fn process_event(&mut self, event: IngestEvent) {
        let queue_delay_us = event.received_at.elapsed().as_micros() as u64;
        match event.kind {
            IngestKind::Position(sample) => {
                self.handle_sample(sample).await;
                self.metrics.record_sample_processed();
                debug!(queue_delay_us = %queue_delay_us, "sample_processed");
            }
            IngestKind::Sos { trigger } => {
                self.handle_sos(&trigger).await;
            }
        }
    }

    /// Evaluate one sample against every safe zone and fire exits on edges
    async fn handle_sample(&mut self, sample: PositionSample) {
        self.last_position = Some(sample.point);

        let zones = self.zones.list();
        if zones.is_empty() {
            // Nothing declared: no classification, no action
            return;
        }

        let mut exited: SmallVec<[SafeZone; 2]> = SmallVec::new();
        for zone in zones {
            let d = distance_meters(sample.point, zone.center);
            let current =
                if d <= zone.radius_m { Membership::Inside } else { Membership::Outside };
            let previous = self.membership.insert(zone.id.clone(), current);

            debug!(
                zone = %zone.name,
                distance_m = %(d as u64),
                inside = %(current == Membership::Inside),
                "zone_classified"
            );

            // Edge rule: inside -> outside and unknown -> outside both fire;
            // outside -> outside must not re-fire, outside -> inside resets
            // silently (re-entry is not logged or notified).
            if current == Membership::Outside && previous != Some(Membership::Outside) {
                exited.push(zone);
            }
        }

        for zone in exited {
            self.fire_exit(&zone).await;
        }
    }

    /// Record the exit and attempt alert delivery
    async fn fire_exit(&mut self, zone: &SafeZone) {
        self.metrics.record_exit_fired();
        info!(zone_id = %zone.id, zone = %zone.name, "zone_exit_detected");

        if let Err(e) = self.exit_log.append(zone.id.clone(), &zone.name) {
            // Persistence degraded; the alert still goes out
            error!(zone_id = %zone.id, error = %e, "exit_event_write_failed");
            self.metrics.record_storage_error();
        }

        let message = exit_message(zone);
        self.deliver("geofence_exit", &message).await;
    }

    /// Handle an SOS trigger relayed from the device
    async fn handle_sos(&mut self, trigger: &str) {
        self.metrics.record_sos();
        warn!(trigger = %trigger, "sos_triggered");

        let message = sos_message(trigger, self.last_position);
        let reason = format!("sos: {}", trigger);
        self.deliver(&reason, &message).await;
    }

    /// Run the delivery protocol for one alert and record the outcome
    async fn deliver(&self, reason: &str, message: &str) {
        let recipients: SmallVec<[String; 4]> =
            self.contacts.numbers().into_iter().collect();
        let alert = PendingAlert::new(reason, message, recipients);

        let start = Instant::now();
        match self.queue.attempt_deliver(alert, self.notifier.as_ref(), self.oracle.as_ref()).await
        {
            Ok(DeliveryOutcome::Delivered) => {
                self.metrics.record_alert_delivered(start.elapsed().as_millis() as u64);
            }
            Ok(DeliveryOutcome::Queued) => {
                self.metrics.record_alert_queued();
            }
            Err(e) => {
                error!(reason = %reason, error = %e, "alert_persist_failed");
                self.metrics.record_storage_error();
            }
        }
        self.metrics.set_queue_depth(self.queue.len());
    }

    /// Retry queued alerts; exposed for external scheduling as well
    pub async fn flush_pending(&self) {
        if self.queue.is_empty() {
            return;
        }

        let fallback = self.contacts.numbers();
        match self.queue.flush(self.notifier.as_ref(), self.oracle.as_ref(), &fallback).await {
            Ok(summary) => {
                for _ in 0..summary.delivered {
                    self.metrics.record_alert_delivered(0);
                }
            }
            Err(e) => {
                error!(error = %e, "flush_persist_failed");
                self.metrics.record_storage_error();
            }
        }
        self.metrics.set_queue_depth(self.queue.len());
    }

    /// Number of zones with a recorded membership (observed at least once)
    pub fn observed_zones(&self) -> usize {
        self.membership.len()
    }
}
