//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    /// Identifier of the monitored device (e.g. "phone-1")
    #[serde(default = "default_device_id")]
    pub id: String,
}

fn default_device_id() -> String {
    "guardian".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self { id: default_device_id() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the JSON collection files
    #[serde(default = "default_storage_dir")]
    pub dir: String,
}

fn default_storage_dir() -> String {
    "data".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { dir: default_storage_dir() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    /// Topic carrying device position messages
    #[serde(default = "default_samples_topic")]
    pub samples_topic: String,
    /// Topic carrying device SOS triggers
    #[serde(default = "default_sos_topic")]
    pub sos_topic: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_samples_topic() -> String {
    "guardian/position".to_string()
}

fn default_sos_topic() -> String {
    "guardian/sos".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_broker_port")]
    pub port: u16,
}

fn default_broker_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_broker_port() -> u16 {
    1883
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self { bind_address: default_broker_bind_address(), port: default_broker_port() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Minimum interval between forwarded samples (ms)
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    /// Minimum movement between forwarded samples (meters)
    #[serde(default = "default_min_distance_m")]
    pub min_distance_m: f64,
}

fn default_min_interval_ms() -> u64 {
    1000
}

fn default_min_distance_m() -> f64 {
    10.0
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval_ms(),
            min_distance_m: default_min_distance_m(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertsConfig {
    /// Interval between automatic queue flushes (seconds)
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
    /// Upper bound on a single delivery attempt (ms)
    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,
}

fn default_flush_interval_secs() -> u64 {
    60
}

fn default_delivery_timeout_ms() -> u64 {
    5000
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            flush_interval_secs: default_flush_interval_secs(),
            delivery_timeout_ms: default_delivery_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
    /// HTTP SMS gateway endpoint; credentials may be embedded in the URL
    pub gateway_url: String,
    /// URL probed to decide reachability before each delivery
    #[serde(default = "default_probe_url")]
    pub probe_url: String,
    /// Probe timeout (ms)
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

fn default_probe_url() -> String {
    "http://connectivitycheck.gstatic.com/generate_204".to_string()
}

fn default_probe_timeout_ms() -> u64 {
    1500
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            gateway_url: "http://localhost:9080/send".to_string(),
            probe_url: default_probe_url(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
    /// Prometheus metrics HTTP port (0 to disable)
    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,
}

fn default_metrics_interval_secs() -> u64 {
    10
}

fn default_prometheus_port() -> u16 {
    9090
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_metrics_interval_secs(),
            prometheus_port: default_prometheus_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    device_id: String,
    storage_dir: String,
    mqtt_host: String,
    mqtt_port: u16,
    samples_topic: String,
    sos_topic: String,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    broker_bind_address: String,
    broker_port: u16,
    min_interval_ms: u64,
    min_distance_m: f64,
    flush_interval_secs: u64,
    delivery_timeout_ms: u64,
    gateway_url: String,
    probe_url: String,
    probe_timeout_ms: u64,
    metrics_interval_secs: u64,
    prometheus_port: u16,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_id: default_device_id(),
            storage_dir: default_storage_dir(),
            mqtt_host: "localhost".to_string(),
            mqtt_port: 1883,
            samples_topic: default_samples_topic(),
            sos_topic: default_sos_topic(),
            mqtt_username: None,
            mqtt_password: None,
            broker_bind_address: default_broker_bind_address(),
            broker_port: default_broker_port(),
            min_interval_ms: default_min_interval_ms(),
            min_distance_m: default_min_distance_m(),
            flush_interval_secs: default_flush_interval_secs(),
            delivery_timeout_ms: default_delivery_timeout_ms(),
            gateway_url: "http://localhost:9080/send".to_string(),
            probe_url: default_probe_url(),
            probe_timeout_ms: default_probe_timeout_ms(),
            metrics_interval_secs: default_metrics_interval_secs(),
            prometheus_port: default_prometheus_port(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self {
            device_id: toml_config.device.id,
            storage_dir: toml_config.storage.dir,
            mqtt_host: toml_config.mqtt.host,
            mqtt_port: toml_config.mqtt.port,
            samples_topic: toml_config.mqtt.samples_topic,
            sos_topic: toml_config.mqtt.sos_topic,
            mqtt_username: toml_config.mqtt.username,
            mqtt_password: toml_config.mqtt.password,
            broker_bind_address: toml_config.broker.bind_address,
            broker_port: toml_config.broker.port,
            min_interval_ms: toml_config.monitor.min_interval_ms,
            min_distance_m: toml_config.monitor.min_distance_m,
            flush_interval_secs: toml_config.alerts.flush_interval_secs,
            delivery_timeout_ms: toml_config.alerts.delivery_timeout_ms,
            gateway_url: toml_config.notifier.gateway_url,
            probe_url: toml_config.notifier.probe_url,
            probe_timeout_ms: toml_config.notifier.probe_timeout_ms,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            prometheus_port: toml_config.metrics.prometheus_port,
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration - tries the TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    // Getters for all config fields
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn storage_dir(&self) -> &str {
        &self.storage_dir
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn samples_topic(&self) -> &str {
        &self.samples_topic
    }

    pub fn sos_topic(&self) -> &str {
        &self.sos_topic
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt_username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt_password.as_deref()
    }

    pub fn broker_bind_address(&self) -> &str {
        &self.broker_bind_address
    }

    pub fn broker_port(&self) -> u16 {
        self.broker_port
    }

    pub fn min_interval_ms(&self) -> u64 {
        self.min_interval_ms
    }

    pub fn min_distance_m(&self) -> f64 {
        self.min_distance_m
    }

    pub fn flush_interval_secs(&self) -> u64 {
        self.flush_interval_secs
    }

    pub fn delivery_timeout_ms(&self) -> u64 {
        self.delivery_timeout_ms
    }

    pub fn gateway_url(&self) -> &str {
        &self.gateway_url
    }

    pub fn probe_url(&self) -> &str {
        &self.probe_url
    }

    pub fn probe_timeout_ms(&self) -> u64 {
        self.probe_timeout_ms
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn prometheus_port(&self) -> u16 {
        self.prometheus_port
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to set the storage directory
    #[cfg(test)]
    pub fn with_storage_dir(mut self, dir: &str) -> Self {
        self.storage_dir = dir.to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.device_id(), "guardian");
        assert_eq!(config.mqtt_host(), "localhost");
        assert_eq!(config.mqtt_port(), 1883);
        assert_eq!(config.samples_topic(), "guardian/position");
        assert_eq!(config.sos_topic(), "guardian/sos");
        assert_eq!(config.min_interval_ms(), 1000);
        assert_eq!(config.min_distance_m(), 10.0);
        assert_eq!(config.flush_interval_secs(), 60);
        assert_eq!(config.delivery_timeout_ms(), 5000);
        assert_eq!(config.prometheus_port(), 9090);
    }

    #[test]
    fn test_resolve_config_path_default() {
        let args: Vec<String> = vec!["guardian-pulse".to_string()];
        assert_eq!(Config::resolve_config_path(&args), "config/dev.toml");
    }

    #[test]
    fn test_resolve_config_path_from_arg() {
        let args: Vec<String> = vec![
            "guardian-pulse".to_string(),
            "--config".to_string(),
            "config/prod.toml".to_string(),
        ];
        assert_eq!(Config::resolve_config_path(&args), "config/prod.toml");
    }

    #[test]
    fn test_resolve_config_path_from_arg_equals() {
        let args: Vec<String> =
            vec!["guardian-pulse".to_string(), "--config=config/home.toml".to_string()];
        assert_eq!(Config::resolve_config_path(&args), "config/home.toml");
    }

    #[test]
    fn test_load_missing_file_falls_back_to_defaults() {
        let config = Config::load_from_path("/definitely/not/here.toml");
        assert_eq!(config.device_id(), "guardian");
        assert_eq!(config.config_file(), "default");
    }
}
