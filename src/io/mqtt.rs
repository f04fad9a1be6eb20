//! MQTT client for receiving device position samples and SOS triggers

use crate::domain::geo::{distance_meters, GeoPoint};
use crate::domain::types::{
    epoch_ms, IngestEvent, IngestKind, PositionMessage, PositionSample, SosMessage, TimestampValue,
};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Throttles position samples to the configured minimum time and distance
/// interval, so a stationary or slowly drifting device does not flood the
/// monitor. The first sample always passes.
struct SampleThrottler {
    last_forwarded: Option<(GeoPoint, Instant)>,
    min_interval: Duration,
    min_distance_m: f64,
}

impl SampleThrottler {
    fn new(min_interval: Duration, min_distance_m: f64) -> Self {
        Self { last_forwarded: None, min_interval, min_distance_m }
    }

    /// Decide whether to forward this sample, updating state when it passes
    fn should_forward(&mut self, point: GeoPoint) -> bool {
        let now = Instant::now();
        if let Some((last_point, last_at)) = self.last_forwarded {
            if now.duration_since(last_at) < self.min_interval {
                return false;
            }
            if distance_meters(last_point, point) < self.min_distance_m {
                return false;
            }
        }
        self.last_forwarded = Some((point, now));
        true
    }
}

/// Start the MQTT client and send parsed ingest events to the channel.
///
/// Events are sent via try_send to avoid blocking the MQTT eventloop.
/// Dropped samples are counted in metrics and logged (rate-limited).
/// SOS triggers bypass the throttler entirely.
pub async fn start_mqtt_client(
    config: &Config,
    event_tx: mpsc::Sender<IngestEvent>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let client_id = format!("guardian-pulse-{}", std::process::id());
    let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
        mqttoptions.set_credentials(username, password);
    }

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);
    client.subscribe(config.samples_topic(), QoS::AtMostOnce).await?;
    client.subscribe(config.sos_topic(), QoS::AtLeastOnce).await?;

    info!(
        samples_topic = %config.samples_topic(),
        sos_topic = %config.sos_topic(),
        host = %config.mqtt_host(),
        port = %config.mqtt_port(),
        "mqtt_subscribed"
    );

    let mut throttler = SampleThrottler::new(
        Duration::from_millis(config.min_interval_ms()),
        config.min_distance_m(),
    );
    let samples_topic = config.samples_topic().to_string();
    let sos_topic = config.sos_topic().to_string();

    // Rate-limit drop warnings to 1 per second
    let mut last_drop_warn = Instant::now() - Duration::from_secs(2);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("mqtt_shutdown");
                    return Ok(());
                }
            }
            result = eventloop.poll() => {
                match result {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let received_at = Instant::now();
                        let Ok(json_str) = std::str::from_utf8(&publish.payload) else {
                            warn!(topic = %publish.topic, "mqtt_payload_not_utf8");
                            continue;
                        };

                        let event = if publish.topic == samples_topic {
                            parse_position(json_str, received_at, &mut throttler)
                        } else if publish.topic == sos_topic {
                            parse_sos(json_str, received_at)
                        } else {
                            debug!(topic = %publish.topic, "mqtt_unexpected_topic");
                            None
                        };

                        let Some(event) = event else { continue };

                        if let Err(e) = event_tx.try_send(event) {
                            match e {
                                TrySendError::Full(_) => {
                                    metrics.record_sample_dropped();
                                    if last_drop_warn.elapsed() > Duration::from_secs(1) {
                                        warn!("ingest_event_dropped: channel full");
                                        last_drop_warn = Instant::now();
                                    }
                                }
                                TrySendError::Closed(_) => {
                                    warn!("ingest_channel_closed");
                                    return Ok(());
                                }
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("mqtt_connected");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "mqtt_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }
}

fn parse_position(
    json_str: &str,
    received_at: Instant,
    throttler: &mut SampleThrottler,
) -> Option<IngestEvent> {
    let msg: PositionMessage = match serde_json::from_str(json_str) {
        Ok(m) => m,
        Err(e) => {
            debug!(error = %e, "position_message_parse_failed");
            return None;
        }
    };

    let point = GeoPoint::new(msg.lat, msg.lon);
    if !throttler.should_forward(point) {
        return None;
    }

    let ts_ms = timestamp_to_epoch_ms(&msg.ts).unwrap_or_else(epoch_ms);
    let sample = PositionSample { point, ts_ms };
    debug!(lat = %point.lat, lon = %point.lon, "position_sample_forwarded");
    Some(IngestEvent { kind: IngestKind::Position(sample), received_at })
}

/// Parse ISO 8601 timestamp to epoch milliseconds
fn parse_iso_time(time_str: &str) -> Option<u64> {
    OffsetDateTime::parse(time_str, &Rfc3339)
        .ok()
        .map(|dt| (dt.unix_timestamp_nanos() / 1_000_000) as u64)
}

/// Extract epoch milliseconds from TimestampValue; None falls back to receive time
fn timestamp_to_epoch_ms(ts: &TimestampValue) -> Option<u64> {
    match ts {
        TimestampValue::EpochMs(ms) => Some(*ms),
        TimestampValue::IsoString(s) => parse_iso_time(s),
        TimestampValue::None => None,
    }
}

fn parse_sos(json_str: &str, received_at: Instant) -> Option<IngestEvent> {
    let msg: SosMessage = match serde_json::from_str(json_str) {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, "sos_message_parse_failed");
            return None;
        }
    };

    Some(IngestEvent { kind: IngestKind::Sos { trigger: msg.trigger }, received_at })
}
