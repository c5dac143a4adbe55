// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! SQLite-backed credential store.
//!
//! One row per registered user. Username uniqueness is enforced by the
//! schema, so concurrent registrations for the same name resolve atomically.

use crate::db::tables;
use crate::error::AppError;
use crate::models::User;
use crate::time_utils::now_rfc3339;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

const MAX_CONNECTIONS: u32 = 5;

/// Fields needed to insert a new user row.
pub struct NewUser<'a> {
    pub username: &'a str,
    pub apple_id: &'a str,
    pub apple_password_encrypted: &'a [u8],
    pub password_hash: &'a str,
}

/// Credential store client.
#[derive(Clone)]
pub struct CredentialStore {
    pool: SqlitePool,
}

impl CredentialStore {
    /// Connect to the database at `url`, creating the file if needed, and
    /// make sure the schema exists.
    pub async fn connect(url: &str) -> Result<Self, AppError> {
        if url.contains(":memory:") {
            tracing::warn!("Using in-memory credential store; accounts are lost on restart");
            return Self::in_memory().await;
        }

        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| AppError::Database(format!("Invalid database URL: {}", e)))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(|e| AppError::Database(format!("Failed to open database: {}", e)))?;

        let store = Self { pool };
        store.migrate().await?;
        tracing::info!("Credential store ready");
        Ok(store)
    }

    /// Create a private in-memory store (tests and local development).
    ///
    /// A single connection that never expires, since every SQLite
    /// `:memory:` connection is its own database.
    pub async fn in_memory() -> Result<Self, AppError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), AppError> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT UNIQUE NOT NULL,
                apple_id TEXT NOT NULL,
                apple_password_encrypted BLOB NOT NULL,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            tables::USERS
        );
        sqlx::query(&ddl).execute(&self.pool).await?;
        Ok(())
    }

    // ─── User Operations ─────────────────────────────────────────

    /// Insert a new user and return its id.
    ///
    /// Returns `AppError::Conflict` if the username is already taken.
    pub async fn insert_user(&self, user: &NewUser<'_>) -> Result<i64, AppError> {
        let now = now_rfc3339();
        let sql = format!(
            "INSERT INTO {} (username, apple_id, apple_password_encrypted, password_hash, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            tables::USERS
        );

        let result = sqlx::query(&sql)
            .bind(user.username)
            .bind(user.apple_id)
            .bind(user.apple_password_encrypted)
            .bind(user.password_hash)
            .bind(&now)
            .bind(&now)
            .execute(&self.pool)
            .await;

        match result {
            Ok(done) => Ok(done.last_insert_rowid()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
                AppError::Conflict("Username already exists".to_string()),
            ),
            Err(e) => Err(e.into()),
        }
    }

    /// Get a user by username.
    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT * FROM {} WHERE username = ?", tables::USERS);
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Get a user by id.
    pub async fn get_user(&self, user_id: i64) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT * FROM {} WHERE id = ?", tables::USERS);
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Rewrite a user's iCloud credentials.
    ///
    /// Returns `AppError::NotFound` if no such user exists.
    pub async fn update_credentials(
        &self,
        user_id: i64,
        apple_id: &str,
        apple_password_encrypted: &[u8],
        password_hash: &str,
    ) -> Result<(), AppError> {
        let sql = format!(
            "UPDATE {} SET apple_id = ?, apple_password_encrypted = ?, password_hash = ?, updated_at = ?
             WHERE id = ?",
            tables::USERS
        );

        let done = sqlx::query(&sql)
            .bind(apple_id)
            .bind(apple_password_encrypted)
            .bind(password_hash)
            .bind(now_rfc3339())
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if done.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User {} not found", user_id)));
        }
        Ok(())
    }
}
