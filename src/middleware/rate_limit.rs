// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Fixed-window, per-client rate limiting.
//!
//! Counters live in process memory only and reset on restart. Keys are
//! `"{method} {route}|{client ip}"`, so each route is limited separately.
//! The client ip is the socket peer unless proxy headers are trusted.

use crate::error::AppError;
use crate::AppState;
use axum::{
    extract::{ConnectInfo, MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Upper bound on tracked keys per limiter.
const DEFAULT_MAX_KEYS: usize = 10_000;
/// Minimum time between two sweeps of expired windows.
const PRUNE_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Per-key request counter with a fixed window.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    max_keys: usize,
    counters: DashMap<String, Window>,
    created: Instant,
    /// Milliseconds after `created` of the last sweep.
    last_prune_ms: AtomicU64,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            max_keys: DEFAULT_MAX_KEYS,
            counters: DashMap::new(),
            created: Instant::now(),
            last_prune_ms: AtomicU64::new(0),
        }
    }

    /// `max_requests` per minute.
    pub fn per_minute(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }

    /// Track at most `max_keys` clients; new keys beyond that are refused
    /// until expired windows are swept.
    pub fn with_max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = max_keys;
        self
    }

    /// Count one request against `key`.
    ///
    /// Returns the time until the window resets when the limit is exceeded.
    pub fn check(&self, key: &str) -> Result<(), Duration> {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> Result<(), Duration> {
        self.maybe_prune(now);

        if !self.counters.contains_key(key) && self.counters.len() >= self.max_keys {
            tracing::warn!(keys = self.counters.len(), "Rate limiter full, refusing new client");
            return Err(PRUNE_INTERVAL);
        }

        let mut entry = self.counters.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });

        if now.saturating_duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        if entry.count >= self.max_requests {
            let elapsed = now.saturating_duration_since(entry.started);
            return Err(self.window.saturating_sub(elapsed));
        }

        entry.count += 1;
        Ok(())
    }

    /// Drop expired windows, at most once per `PRUNE_INTERVAL`.
    fn maybe_prune(&self, now: Instant) {
        let now_ms = now.saturating_duration_since(self.created).as_millis() as u64;
        let last = self.last_prune_ms.load(Ordering::Relaxed);
        if now_ms.saturating_sub(last) < PRUNE_INTERVAL.as_millis() as u64 {
            return;
        }
        // One caller wins the sweep; the rest carry on.
        if self
            .last_prune_ms
            .compare_exchange(last, now_ms, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            return;
        }

        let window = self.window;
        self.counters
            .retain(|_, w| now.saturating_duration_since(w.started) < window);
    }
}

/// Client address used in limiter keys.
///
/// `X-Forwarded-For` is honored only when `trust_proxy_headers` is set;
/// otherwise a client could pick a fresh key per request.
fn client_ip(request: &Request, trust_proxy_headers: bool) -> String {
    if trust_proxy_headers {
        if let Some(forwarded) = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            return forwarded.to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn enforce(
    limiter: &RateLimiter,
    trust_proxy_headers: bool,
    request: Request,
) -> Result<Request, AppError> {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let key = format!(
        "{} {}|{}",
        request.method(),
        route,
        client_ip(&request, trust_proxy_headers)
    );

    match limiter.check(&key) {
        Ok(()) => Ok(request),
        Err(retry_after) => {
            tracing::warn!(key = %key, "Rate limit exceeded");
            Err(AppError::RateLimited {
                retry_after_secs: retry_after.as_secs().max(1),
            })
        }
    }
}

/// Rate limit for the unauthenticated `/api/auth/*` routes.
pub async fn limit_auth_routes(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let request = enforce(
        &state.auth_limiter,
        state.config.trust_proxy_headers,
        request,
    )?;
    Ok(next.run(request).await)
}

/// Rate limit for the reminders routes.
pub async fn limit_api_routes(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let request = enforce(
        &state.api_limiter,
        state.config.trust_proxy_headers,
        request,
    )?;
    Ok(next.run(request).await)
}
