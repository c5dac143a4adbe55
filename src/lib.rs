// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Reminders Relay: a multi-user bridge to iCloud Reminders
//!
//! This crate provides the backend API used by the watch companion app:
//! account registration, session tokens, encrypted storage of the
//! third-party password, and live proxying of reminders operations.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use middleware::rate_limit::RateLimiter;
use services::{AuthService, RemindersGateway};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub auth: AuthService,
    pub reminders: RemindersGateway,
    /// Limits for `/api/auth/*`.
    pub auth_limiter: RateLimiter,
    /// Limits for `/api/reminders*`.
    pub api_limiter: RateLimiter,
}
