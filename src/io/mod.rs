//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `mqtt` - MQTT client for receiving device samples and SOS triggers
//! - `notifier` - Notifier/connectivity traits and HTTP implementations
//! - `store` - JSON snapshot persistence for the durable collections
//! - `prometheus` - Prometheus metrics HTTP endpoint

pub mod mqtt;
pub mod notifier;
pub mod prometheus;
pub mod store;

// Re-export commonly used types
pub use notifier::{ConnectivityOracle, HttpProbeOracle, Notifier, SmsGatewayNotifier};
pub use store::JsonStore;
