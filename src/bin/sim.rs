//! Device simulator - publishes synthetic position samples over MQTT
//!
//! Walks a straight line away from the start point so a safe zone centered
//! there is exited after a predictable number of steps. Useful for driving
//! the monitor end to end without a phone.

use clap::Parser;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Approximate degrees of latitude per meter on the spherical model
const DEG_PER_METER: f64 = 1.0 / 111_195.0;

#[derive(Parser, Debug)]
#[command(name = "pulse-sim", version, about)]
struct Args {
    /// MQTT broker host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// MQTT broker port
    #[arg(long, default_value_t = 1883)]
    port: u16,

    /// Topic to publish position samples to
    #[arg(long, default_value = "guardian/position")]
    topic: String,

    /// Start latitude
    #[arg(long, default_value_t = 64.1466)]
    lat: f64,

    /// Start longitude
    #[arg(long, default_value_t = -21.9426)]
    lon: f64,

    /// Meters moved north per step
    #[arg(long, default_value_t = 25.0)]
    step_m: f64,

    /// Interval between samples (ms)
    #[arg(long, default_value_t = 2000)]
    interval_ms: u64,

    /// Number of samples to publish
    #[arg(long, default_value_t = 20)]
    count: u32,

    /// Publish an SOS trigger after the walk
    #[arg(long, default_value_t = false)]
    sos: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let args = Args::parse();

    let client_id = format!("pulse-sim-{}", std::process::id());
    let mut mqttoptions = MqttOptions::new(client_id, &args.host, args.port);
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 16);

    // Drive the eventloop in the background
    tokio::spawn(async move {
        loop {
            if let Err(e) = eventloop.poll().await {
                warn!(error = %e, "sim_mqtt_error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    });

    info!(
        host = %args.host,
        port = %args.port,
        topic = %args.topic,
        count = %args.count,
        step_m = %args.step_m,
        "sim_started"
    );

    let mut lat = args.lat;
    for i in 0..args.count {
        let payload = format!(r#"{{"lat": {}, "lon": {}}}"#, lat, args.lon);
        client.publish(&args.topic, QoS::AtMostOnce, false, payload.as_bytes()).await?;
        info!(step = %i, lat = %lat, lon = %args.lon, "sample_published");

        lat += args.step_m * DEG_PER_METER;
        tokio::time::sleep(Duration::from_millis(args.interval_ms)).await;
    }

    if args.sos {
        let sos_topic = args.topic.replace("position", "sos");
        client
            .publish(&sos_topic, QoS::AtLeastOnce, false, br#"{"trigger": "button"}"#.as_slice())
            .await?;
        info!(topic = %sos_topic, "sos_published");
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    info!("sim_done");
    Ok(())
}
