// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod auth;
pub mod crypto;
pub mod icloud;
pub mod reminders;
pub mod upstream;

pub use auth::{AuthService, Session};
pub use crypto::CredentialCipher;
pub use icloud::ICloudUpstream;
pub use reminders::RemindersGateway;
pub use upstream::{InMemoryUpstream, RemindersSession, RemindersUpstream};
