//! Prometheus metrics HTTP endpoint
//!
//! Exposes monitor metrics in Prometheus text format at /metrics.
//! Uses hyper for the HTTP server.

use crate::infra::metrics::{Metrics, MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge) with device label
fn write_metric(
    output: &mut String,
    name: &str,
    help: &str,
    typ: MetricType,
    device: &str,
    val: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{device=\"{device}\"}} {val}");
}

/// Write a histogram metric with buckets, sum, and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    device: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    avg: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in METRICS_BUCKET_BOUNDS.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{device=\"{device}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{device=\"{device}\",le=\"+Inf\"}} {cumulative}");

    let count: u64 = buckets.iter().sum();
    let sum = avg * count;
    let _ = writeln!(output, "{name}_sum{{device=\"{device}\"}} {sum}");
    let _ = writeln!(output, "{name}_count{{device=\"{device}\"}} {count}");
}

/// Format metrics in Prometheus text exposition format
fn format_prometheus_metrics(metrics: &Metrics, device: &str) -> String {
    let summary = metrics.report();
    let mut output = String::with_capacity(2048);
    write_summary(&mut output, device, &summary);
    output
}

fn write_summary(output: &mut String, device: &str, summary: &MetricsSummary) {
    write_metric(
        output,
        "guardian_samples_total",
        "Position samples processed",
        MetricType::Counter,
        device,
        summary.samples_total,
    );
    write_metric(
        output,
        "guardian_samples_dropped_total",
        "Samples dropped because the ingest channel was full",
        MetricType::Counter,
        device,
        summary.samples_dropped,
    );
    write_metric(
        output,
        "guardian_zone_exits_total",
        "Safe-zone exit events fired",
        MetricType::Counter,
        device,
        summary.exits_total,
    );
    write_metric(
        output,
        "guardian_sos_total",
        "SOS triggers processed",
        MetricType::Counter,
        device,
        summary.sos_total,
    );
    write_metric(
        output,
        "guardian_alerts_delivered_total",
        "Alerts delivered to the notifier",
        MetricType::Counter,
        device,
        summary.alerts_delivered,
    );
    write_metric(
        output,
        "guardian_alerts_queued_total",
        "Alerts written to the offline queue",
        MetricType::Counter,
        device,
        summary.alerts_queued,
    );
    write_metric(
        output,
        "guardian_storage_errors_total",
        "Durable store failures surfaced from the monitor",
        MetricType::Counter,
        device,
        summary.storage_errors,
    );
    write_metric(
        output,
        "guardian_offline_queue_depth",
        "Current offline alert queue depth",
        MetricType::Gauge,
        device,
        summary.queue_depth,
    );
    write_histogram(
        output,
        "guardian_delivery_latency_ms",
        "Alert delivery attempt latency in milliseconds",
        device,
        &summary.delivery_latency_buckets,
        summary.delivery_latency_avg_ms,
    );
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    device_id: Arc<String>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let body = format_prometheus_metrics(&metrics, &device_id);
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
                .body(Full::new(Bytes::from(body)))
                .expect("static response should not fail"))
        }
        (&Method::GET, "/health") => Ok(Response::builder()
            .status(StatusCode::OK)
            .body(Full::new(Bytes::from("ok")))
            .expect("static response should not fail")),
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("Not Found")))
            .expect("static response should not fail")),
    }
}

/// Start the Prometheus metrics HTTP server
pub async fn start_metrics_server(
    port: u16,
    metrics: Arc<Metrics>,
    device_id: String,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    let device_id = Arc::new(device_id);

    info!(port = %port, device = %device_id, "prometheus_metrics_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let metrics = metrics.clone();
                        let device_id = device_id.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let metrics = metrics.clone();
                                let device_id = device_id.clone();
                                async move { handle_request(req, metrics, device_id).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "prometheus_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "prometheus_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("prometheus_metrics_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}
