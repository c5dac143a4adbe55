//! Database layer (SQLite credential store).

pub mod sqlite;

pub use sqlite::CredentialStore;

/// Table names as constants.
pub mod tables {
    pub const USERS: &str = "users";
}
