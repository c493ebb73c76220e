//! API request handlers.
//!
//! This module contains all HTTP request handlers organized by functionality.

/// Authentication and session lifecycle handlers.
pub mod auth;
/// Liveness probe handler.
pub mod health;
/// Profile read and update handlers.
pub mod profile;
