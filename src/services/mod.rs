//! Services - business logic and state management
//!
//! This module contains the core business logic services:
//! - `monitor` - Geo-fence monitoring over the position sample stream
//! - `zones` - Safe-zone store
//! - `exit_log` - Exit-event history and the weekly safety score
//! - `alert_queue` - Offline alert queue and delivery protocol
//! - `contacts` - Emergency-contact store
//! - `companion` - Crowd-sourced companion requests

pub mod alert_queue;
pub mod companion;
pub mod contacts;
pub mod exit_log;
pub mod monitor;
pub mod zones;

// Re-export commonly used types
pub use alert_queue::{DeliveryOutcome, FlushSummary, OfflineAlertQueue};
pub use contacts::ContactStore;
pub use exit_log::ExitEventLog;
pub use monitor::GeoFenceMonitor;
pub use zones::SafeZoneStore;
