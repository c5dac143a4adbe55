//! User model for storage.

use std::fmt;

/// Registered user as stored in the `users` table.
///
/// Holds the encrypted third-party password; never serialize this type
/// into an API response.
#[derive(Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    /// Local handle, unique across the store
    pub username: String,
    /// Apple ID (email-shaped) used to sign in to iCloud
    pub apple_id: String,
    /// AES-256-GCM blob of the app-specific password
    pub apple_password_encrypted: Vec<u8>,
    /// Argon2id PHC string of the app-specific password
    pub password_hash: String,
    /// When the user registered (RFC 3339)
    pub created_at: String,
    /// When the credentials were last written (RFC 3339)
    pub updated_at: String,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("apple_id", &self.apple_id)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish_non_exhaustive()
    }
}

/// Decrypted iCloud credentials, alive only for the duration of one upstream call.
#[derive(Clone)]
pub struct AccountCredentials {
    pub apple_id: String,
    pub password: String,
}

impl fmt::Debug for AccountCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountCredentials")
            .field("apple_id", &self.apple_id)
            .field("password", &"<redacted>")
            .finish()
    }
}
