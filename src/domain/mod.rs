//! Core domain types for the safety-monitoring engine

pub mod alert;
pub mod error;
pub mod geo;
pub mod types;
