//! Shared utilities.

/// Environment-backed application configuration.
pub mod config;
