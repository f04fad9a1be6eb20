//! Offline alert queue and delivery protocol
//!
//! Every alert the engine raises goes through `attempt_deliver`: check
//! connectivity, try the notifier, and on any failure persist the alert so
//! a later `flush` can retry it. The protocol is deliberately biased toward
//! delivery over deduplication: a crash between a successful send and the
//! queue removal re-sends the alert on the next flush (at-least-once).

use crate::domain::alert::PendingAlert;
use crate::domain::error::{DeliveryError, StoreError};
use crate::io::notifier::{ConnectivityOracle, Notifier};
use crate::io::store::JsonStore;
use parking_lot::Mutex;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

const ALERTS_FILE: &str = "offline_alerts.json";

/// Outcome of a delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Queued,
}

/// Result of one flush pass over the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushSummary {
    pub delivered: usize,
    pub remaining: usize,
}

pub struct OfflineAlertQueue {
    store: JsonStore,
    alerts: Mutex<Vec<PendingAlert>>,
    /// Upper bound on a single notifier call; a timeout counts as failure
    delivery_timeout: Duration,
}

impl OfflineAlertQueue {
    pub fn open<P: AsRef<Path>>(dir: P, delivery_timeout: Duration) -> Result<Self, StoreError> {
        let store = JsonStore::new(dir, ALERTS_FILE);
        let alerts = store.load()?;
        Ok(Self { store, alerts: Mutex::new(alerts), delivery_timeout })
    }

    /// Try to deliver now; queue durably on any failure.
    ///
    /// When the oracle reports unreachable the notifier is not invoked at
    /// all. An alert with no recipients is queued with a flagged reason
    /// rather than silently dropped.
    pub async fn attempt_deliver(
        &self,
        alert: PendingAlert,
        notifier: &dyn Notifier,
        oracle: &dyn ConnectivityOracle,
    ) -> Result<DeliveryOutcome, StoreError> {
        if alert.recipients.is_empty() {
            let flagged = alert.flag_no_recipients();
            warn!(alert_id = %flagged.id, reason = %flagged.reason, "alert_queued_no_recipients");
            self.enqueue(flagged)?;
            return Ok(DeliveryOutcome::Queued);
        }

        if !oracle.is_reachable().await {
            info!(alert_id = %alert.id, reason = %alert.reason, "alert_queued_offline");
            self.enqueue(alert)?;
            return Ok(DeliveryOutcome::Queued);
        }

        match self.send_bounded(notifier, &alert).await {
            Ok(()) => {
                info!(alert_id = %alert.id, reason = %alert.reason, recipients = %alert.recipients.len(), "alert_delivered");
                Ok(DeliveryOutcome::Delivered)
            }
            Err(e) => {
                warn!(alert_id = %alert.id, error = %e, "alert_queued_after_failure");
                self.enqueue(alert)?;
                Ok(DeliveryOutcome::Queued)
            }
        }
    }

    /// Retry queued alerts in insertion order, stopping at the first
    /// failure so retries never reorder.
    ///
    /// Each successful delivery is removed and persisted immediately, so a
    /// crash mid-flush resumes from the surviving snapshot. Alerts queued
    /// with no recipients are retried against `fallback_recipients` (the
    /// current contact list), so they become deliverable once contacts
    /// exist. Idempotent; safe to re-invoke on any schedule.
    pub async fn flush(
        &self,
        notifier: &dyn Notifier,
        oracle: &dyn ConnectivityOracle,
        fallback_recipients: &[String],
    ) -> Result<FlushSummary, StoreError> {
        let mut delivered = 0usize;

        loop {
            let Some(mut alert) = self.alerts.lock().first().cloned() else {
                break;
            };

            if alert.recipients.is_empty() {
                if fallback_recipients.is_empty() {
                    warn!(alert_id = %alert.id, "flush_stopped_no_recipients");
                    break;
                }
                alert.recipients = fallback_recipients.iter().cloned().collect();
            }

            if !oracle.is_reachable().await {
                info!(delivered = %delivered, "flush_stopped_offline");
                break;
            }

            match self.send_bounded(notifier, &alert).await {
                Ok(()) => {
                    self.remove(&alert.id)?;
                    delivered += 1;
                    info!(alert_id = %alert.id, reason = %alert.reason, "flush_alert_delivered");
                }
                Err(e) => {
                    warn!(alert_id = %alert.id, error = %e, "flush_stopped_on_failure");
                    break;
                }
            }
        }

        let remaining = self.alerts.lock().len();
        if delivered > 0 || remaining > 0 {
            info!(delivered = %delivered, remaining = %remaining, "flush_completed");
        }
        Ok(FlushSummary { delivered, remaining })
    }

    /// Queued alerts in insertion order
    pub fn pending(&self) -> Vec<PendingAlert> {
        self.alerts.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.alerts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.lock().is_empty()
    }

    async fn send_bounded(
        &self,
        notifier: &dyn Notifier,
        alert: &PendingAlert,
    ) -> Result<(), DeliveryError> {
        match tokio::time::timeout(
            self.delivery_timeout,
            notifier.send(&alert.recipients, &alert.message),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout),
        }
    }

    fn enqueue(&self, alert: PendingAlert) -> Result<(), StoreError> {
        let mut alerts = self.alerts.lock();
        alerts.push(alert);
        self.store.persist(&alerts)
    }

    fn remove(&self, id: &str) -> Result<(), StoreError> {
        let mut alerts = self.alerts.lock();
        alerts.retain(|a| a.id != id);
        self.store.persist(&alerts)
    }
}
