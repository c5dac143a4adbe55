// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Account registration, login and session tokens.
//!
//! The iCloud app-specific password is stored twice: as an AES-GCM blob
//! (recoverable, needed to talk to iCloud) and as an Argon2id hash (the
//! login verifier). Plaintext exists only transiently in memory.

use crate::db::sqlite::{CredentialStore, NewUser};
use crate::error::AppError;
use crate::middleware::auth::{create_jwt, decode_jwt};
use crate::models::{AccountCredentials, User};
use crate::services::crypto::CredentialCipher;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand_core::OsRng;
use subtle::ConstantTimeEq;
use validator::ValidateEmail;

/// Local username length bounds, in characters.
pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 32;
/// App-specific password length bounds, in characters.
pub const PASSWORD_MIN_LEN: usize = 8;
pub const PASSWORD_MAX_LEN: usize = 128;

/// Freshly issued session.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user_id: i64,
}

/// Authentication service.
#[derive(Clone)]
pub struct AuthService {
    store: CredentialStore,
    cipher: CredentialCipher,
    jwt_signing_key: Vec<u8>,
}

impl AuthService {
    pub fn new(store: CredentialStore, cipher: CredentialCipher, jwt_signing_key: Vec<u8>) -> Self {
        Self {
            store,
            cipher,
            jwt_signing_key,
        }
    }

    /// Register a new user and issue a session.
    ///
    /// Fails with `Validation` on malformed input and `Conflict` when the
    /// username is taken.
    pub async fn register(
        &self,
        username: &str,
        apple_id: &str,
        apple_password: &str,
    ) -> Result<Session, AppError> {
        validate_username(username)?;
        validate_account(apple_id, apple_password)?;

        let encrypted = self.cipher.encrypt(apple_password, username)?;
        let password_hash = hash_password(apple_password)?;

        let user_id = self
            .store
            .insert_user(&NewUser {
                username,
                apple_id,
                apple_password_encrypted: &encrypted,
                password_hash: &password_hash,
            })
            .await?;

        tracing::info!(user_id, username = %username, "User registered");
        self.issue(user_id, username)
    }

    /// Check credentials and issue a session.
    ///
    /// Every failure cause yields the same `InvalidCredentials` error.
    pub async fn login(
        &self,
        username: &str,
        apple_id: &str,
        apple_password: &str,
    ) -> Result<Session, AppError> {
        let Some(user) = self.store.get_user_by_username(username).await? else {
            tracing::info!(username = %username, "Login for unknown user");
            return Err(AppError::InvalidCredentials);
        };

        let apple_id_matches: bool = user.apple_id.as_bytes().ct_eq(apple_id.as_bytes()).into();
        if !apple_id_matches || !verify_password(apple_password, &user.password_hash) {
            tracing::info!(user_id = user.id, "Login with mismatched credentials");
            return Err(AppError::InvalidCredentials);
        }

        // The stored blob must still decrypt to the same secret, otherwise
        // the account is unusable for reminders and login is refused.
        let stored = self.decrypt(&user).map_err(|e| {
            tracing::error!(user_id = user.id, error = %e, "Stored credentials unreadable");
            AppError::InvalidCredentials
        })?;
        let password_matches: bool = stored.password.as_bytes().ct_eq(apple_password.as_bytes()).into();
        if !password_matches {
            return Err(AppError::InvalidCredentials);
        }

        tracing::info!(user_id = user.id, "User logged in");
        self.issue(user.id, &user.username)
    }

    /// Verify a session token and return the bound user id.
    pub fn verify_token(&self, token: &str) -> Result<i64, AppError> {
        decode_jwt(token, &self.jwt_signing_key)
    }

    /// Replace the iCloud credentials of an existing user.
    pub async fn update_credentials(
        &self,
        user_id: i64,
        apple_id: &str,
        apple_password: &str,
    ) -> Result<(), AppError> {
        validate_account(apple_id, apple_password)?;
        let user = self.load(user_id).await?;

        let encrypted = self.cipher.encrypt(apple_password, &user.username)?;
        let password_hash = hash_password(apple_password)?;

        self.store
            .update_credentials(user_id, apple_id, &encrypted, &password_hash)
            .await?;

        tracing::info!(user_id, "Credentials updated");
        Ok(())
    }

    /// Decrypt the stored iCloud credentials for one upstream call.
    pub async fn account_credentials(&self, user_id: i64) -> Result<AccountCredentials, AppError> {
        let user = self.load(user_id).await?;
        self.decrypt(&user)
    }

    async fn load(&self, user_id: i64) -> Result<User, AppError> {
        // A valid token for a row that no longer exists is treated as unauthenticated.
        self.store
            .get_user(user_id)
            .await?
            .ok_or(AppError::InvalidToken)
    }

    fn decrypt(&self, user: &User) -> Result<AccountCredentials, AppError> {
        let password = self
            .cipher
            .decrypt(&user.apple_password_encrypted, &user.username)?;
        Ok(AccountCredentials {
            apple_id: user.apple_id.clone(),
            password,
        })
    }

    fn issue(&self, user_id: i64, username: &str) -> Result<Session, AppError> {
        let token = create_jwt(user_id, username, &self.jwt_signing_key)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT creation failed: {}", e)))?;
        Ok(Session { token, user_id })
    }
}

/// Characters allowed in local usernames: ASCII letters, digits, `_`, `.` and `-`.
pub fn is_valid_username_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

fn validate_username(username: &str) -> Result<(), AppError> {
    let len = username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err(AppError::Validation(format!(
            "username: must be {}-{} characters",
            USERNAME_MIN_LEN, USERNAME_MAX_LEN
        )));
    }
    if !username.chars().all(is_valid_username_char) {
        return Err(AppError::Validation(
            "username: may only contain letters, digits, '_', '.' and '-'".to_string(),
        ));
    }
    Ok(())
}

fn validate_account(apple_id: &str, apple_password: &str) -> Result<(), AppError> {
    if !apple_id.validate_email() {
        return Err(AppError::Validation(
            "apple_id: must be an email address".to_string(),
        ));
    }
    let len = apple_password.chars().count();
    if !(PASSWORD_MIN_LEN..=PASSWORD_MAX_LEN).contains(&len) {
        return Err(AppError::Validation(format!(
            "apple_password: must be {}-{} characters",
            PASSWORD_MIN_LEN, PASSWORD_MAX_LEN
        )));
    }
    Ok(())
}

fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Password hashing failed: {}", e)))
}

fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}
