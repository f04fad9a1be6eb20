//! Error taxonomy for stores and delivery

use thiserror::Error;

/// Durable store read/write failure. Propagated to the caller of the
/// mutating operation; the monitor loop logs and continues on these.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage io: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage encoding: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Rejected input at a store boundary. Never persisted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("zone radius must be a positive number of meters")]
    NonPositiveRadius,
    #[error("name must not be empty")]
    EmptyName,
    #[error("phone number must be + followed by 10-15 digits")]
    BadPhoneNumber,
}

/// A mutating store operation can fail either way
#[derive(Debug, Error)]
pub enum StoreOpError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Why a notification attempt did not complete. Always recoverable by
/// queuing; the queued alert records a distinguishing reason string.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("no network connectivity")]
    Offline,
    #[error("no recipients configured")]
    NoRecipients,
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error("send timed out")]
    Timeout,
}
