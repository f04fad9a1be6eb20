//! GuardianPulse - safety-monitoring engine
//!
//! Consumes device position samples over MQTT, evaluates them against the
//! user's safe zones, and delivers exit/SOS alerts to emergency contacts
//! with an offline queue for periods without connectivity.
//!
//! Module structure:
//! - `domain/` - Core types (zones, events, alerts, geometry)
//! - `io/` - External interfaces (MQTT, notifier, storage, metrics endpoint)
//! - `services/` - Business logic (Monitor, stores, alert queue)
//! - `infra/` - Infrastructure (Config, Metrics, Broker)

use clap::Parser;
use guardian_pulse::infra::{Config, Metrics};
use guardian_pulse::io::{HttpProbeOracle, SmsGatewayNotifier};
use guardian_pulse::services::{
    ContactStore, ExitEventLog, GeoFenceMonitor, OfflineAlertQueue, SafeZoneStore,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// GuardianPulse - personal-safety geo-fence monitor
#[derive(Parser, Debug)]
#[command(name = "guardian-pulse", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for per-sample classification detail
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("guardian-pulse starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    // Start embedded MQTT broker so the device can connect directly
    guardian_pulse::infra::broker::start_embedded_broker(&config);

    info!(
        config_file = %config.config_file(),
        device_id = %config.device_id(),
        storage_dir = %config.storage_dir(),
        mqtt_host = %config.mqtt_host(),
        mqtt_port = %config.mqtt_port(),
        samples_topic = %config.samples_topic(),
        min_interval_ms = %config.min_interval_ms(),
        min_distance_m = %config.min_distance_m(),
        flush_interval_secs = %config.flush_interval_secs(),
        prometheus_port = %config.prometheus_port(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Open durable stores; a corrupt store is a boot failure, not a
    // mid-flight one
    let storage_dir = config.storage_dir().to_string();
    let zones = Arc::new(SafeZoneStore::open(&storage_dir)?);
    let contacts = Arc::new(ContactStore::open(&storage_dir)?);
    let exit_log = Arc::new(ExitEventLog::open(&storage_dir)?);
    let queue = Arc::new(OfflineAlertQueue::open(
        &storage_dir,
        Duration::from_millis(config.delivery_timeout_ms()),
    )?);

    info!(
        zones = %zones.len(),
        contacts = %contacts.list().len(),
        queued_alerts = %queue.len(),
        safety_score = %exit_log.safety_score(),
        "stores_loaded"
    );

    let notifier = Arc::new(SmsGatewayNotifier::new(
        config.gateway_url(),
        Duration::from_millis(config.delivery_timeout_ms()),
    ));
    let oracle = Arc::new(HttpProbeOracle::new(
        config.probe_url(),
        Duration::from_millis(config.probe_timeout_ms()),
    ));
    let metrics = Arc::new(Metrics::new());

    // Create ingest channel (bounded for backpressure)
    let (event_tx, event_rx) = mpsc::channel(1000);

    // Start MQTT ingest client
    let mqtt_config = config.clone();
    let mqtt_metrics = metrics.clone();
    let mqtt_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) =
            guardian_pulse::io::mqtt::start_mqtt_client(&mqtt_config, event_tx, mqtt_metrics, mqtt_shutdown)
                .await
        {
            tracing::error!(error = %e, "mqtt_client_error");
        }
    });

    // Start Prometheus metrics HTTP server (if port > 0)
    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let prom_metrics = metrics.clone();
        let prom_device = config.device_id().to_string();
        let prom_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = guardian_pulse::io::prometheus::start_metrics_server(
                prometheus_port,
                prom_metrics,
                prom_device,
                prom_shutdown,
            )
            .await
            {
                tracing::error!(error = %e, "prometheus_server_error");
            }
        });
    }

    // Start metrics reporter
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Handle shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx;
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    // Run monitor - consumes ingest events until shutdown
    let mut monitor =
        GeoFenceMonitor::new(zones, contacts, exit_log, queue, notifier, oracle, metrics);
    monitor
        .run(
            event_rx,
            shutdown_rx,
            Duration::from_secs(config.flush_interval_secs()),
        )
        .await;

    info!("guardian-pulse shutdown complete");
    Ok(())
}
