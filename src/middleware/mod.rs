// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Middleware modules (authentication, rate limiting, security headers).

pub mod auth;
pub mod rate_limit;
pub mod security;
pub mod validated_json;

pub use auth::require_auth;
pub use validated_json::ValidatedJson;
