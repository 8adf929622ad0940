//! Shared building blocks for the database health-monitoring services.
//!
//! Contains the data model, the error type, environment-driven configuration
//! and small utilities used by both the monitor service and the slow-query
//! log analyzer.

pub mod config;
pub mod errors;
pub mod models;
pub mod utils;
