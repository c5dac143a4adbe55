// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Upstream reminders backend abstraction.
//!
//! The gateway opens one session per request through [`RemindersUpstream`]
//! and drops it afterwards. [`InMemoryUpstream`] is an in-process backend
//! used by tests and by local development.

use crate::error::AppError;
use crate::models::{AccountCredentials, NewReminder, Reminder, ReminderList};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Something that can open an authenticated reminders session.
#[async_trait]
pub trait RemindersUpstream: Send + Sync {
    /// Sign in with the account credentials.
    ///
    /// Fails with `UpstreamAuth` or `TwoFactorRequired` when the account
    /// rejects the credentials, `Upstream` on transport errors.
    async fn connect(
        &self,
        credentials: &AccountCredentials,
    ) -> Result<Box<dyn RemindersSession>, AppError>;
}

/// An authenticated session against one reminders account.
#[async_trait]
pub trait RemindersSession: Send + Sync {
    async fn lists(&self) -> Result<Vec<ReminderList>, AppError>;

    /// Reminders of one list. The caller has already checked the list exists.
    async fn reminders(&self, list_id: &str) -> Result<Vec<Reminder>, AppError>;

    async fn create_reminder(&self, reminder: &NewReminder) -> Result<Reminder, AppError>;

    /// Mark `reminder` (read from `list_id` in this session) completed.
    async fn complete_reminder(&self, list_id: &str, reminder: &Reminder)
        -> Result<(), AppError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory backend
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Account {
    password: String,
    two_factor_required: bool,
    lists: Vec<(ReminderList, Vec<Reminder>)>,
}

impl Account {
    fn new(password: &str) -> Self {
        Self {
            password: password.to_string(),
            two_factor_required: false,
            lists: Vec::new(),
        }
    }
}

/// In-process reminders backend keyed by Apple ID.
#[derive(Clone, Default)]
pub struct InMemoryUpstream {
    accounts: Arc<DashMap<String, Account>>,
    /// Create an empty account with a default list on first sign-in.
    auto_provision: bool,
    connects: Arc<AtomicUsize>,
    completions: Arc<AtomicUsize>,
}

impl InMemoryUpstream {
    /// Backend that only knows accounts added through [`add_account`](Self::add_account).
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend that accepts any credentials (local development).
    pub fn auto_provisioning() -> Self {
        Self {
            auto_provision: true,
            ..Self::default()
        }
    }

    pub fn add_account(&self, apple_id: &str, password: &str) {
        self.accounts
            .insert(apple_id.to_string(), Account::new(password));
    }

    /// Make sign-ins for `apple_id` demand a second factor.
    pub fn require_two_factor(&self, apple_id: &str) {
        if let Some(mut account) = self.accounts.get_mut(apple_id) {
            account.two_factor_required = true;
        }
    }

    pub fn add_list(&self, apple_id: &str, id: &str, title: &str) {
        if let Some(mut account) = self.accounts.get_mut(apple_id) {
            account.lists.push((
                ReminderList {
                    id: id.to_string(),
                    title: title.to_string(),
                    color: None,
                },
                Vec::new(),
            ));
        }
    }

    pub fn add_reminder(&self, apple_id: &str, list_id: &str, id: &str, title: &str) {
        if let Some(mut account) = self.accounts.get_mut(apple_id) {
            if let Some((_, reminders)) = account.lists.iter_mut().find(|(l, _)| l.id == list_id)
            {
                reminders.push(Reminder {
                    id: id.to_string(),
                    title: title.to_string(),
                    description: String::new(),
                    completed: false,
                    due_date: None,
                    priority: 0,
                    etag: None,
                });
            }
        }
    }

    /// Current state of a reminder, for assertions.
    pub fn reminder(&self, apple_id: &str, list_id: &str, id: &str) -> Option<Reminder> {
        let account = self.accounts.get(apple_id)?;
        let (_, reminders) = account.lists.iter().find(|(l, _)| l.id == list_id)?;
        reminders.iter().find(|r| r.id == id).cloned()
    }

    /// Number of successful sign-ins so far.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::Relaxed)
    }

    /// Number of completion writes so far.
    pub fn completion_count(&self) -> usize {
        self.completions.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RemindersUpstream for InMemoryUpstream {
    async fn connect(
        &self,
        credentials: &AccountCredentials,
    ) -> Result<Box<dyn RemindersSession>, AppError> {
        if self.auto_provision && !self.accounts.contains_key(&credentials.apple_id) {
            self.add_account(&credentials.apple_id, &credentials.password);
            self.add_list(&credentials.apple_id, "reminders", "Reminders");
        }

        let account = self.accounts.get(&credentials.apple_id).ok_or_else(|| {
            AppError::UpstreamAuth("Invalid Apple ID or app-specific password".to_string())
        })?;

        if account.password != credentials.password {
            return Err(AppError::UpstreamAuth(
                "Invalid Apple ID or app-specific password".to_string(),
            ));
        }
        if account.two_factor_required {
            return Err(AppError::TwoFactorRequired);
        }

        self.connects.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(InMemorySession {
            upstream: self.clone(),
            apple_id: credentials.apple_id.clone(),
        }))
    }
}

struct InMemorySession {
    upstream: InMemoryUpstream,
    apple_id: String,
}

impl InMemorySession {
    fn account(&self) -> Result<dashmap::mapref::one::RefMut<'_, String, Account>, AppError> {
        self.upstream
            .accounts
            .get_mut(&self.apple_id)
            .ok_or_else(|| AppError::Upstream("Account disappeared".to_string()))
    }
}

#[async_trait]
impl RemindersSession for InMemorySession {
    async fn lists(&self) -> Result<Vec<ReminderList>, AppError> {
        Ok(self.account()?.lists.iter().map(|(l, _)| l.clone()).collect())
    }

    async fn reminders(&self, list_id: &str) -> Result<Vec<Reminder>, AppError> {
        let account = self.account()?;
        account
            .lists
            .iter()
            .find(|(l, _)| l.id == list_id)
            .map(|(_, reminders)| reminders.clone())
            .ok_or_else(|| AppError::Upstream(format!("Unknown collection {}", list_id)))
    }

    async fn create_reminder(&self, new: &NewReminder) -> Result<Reminder, AppError> {
        let mut account = self.account()?;
        let (_, reminders) = account
            .lists
            .iter_mut()
            .find(|(l, _)| l.id == new.list_id)
            .ok_or_else(|| AppError::Upstream(format!("Unknown collection {}", new.list_id)))?;

        let reminder = Reminder {
            id: uuid::Uuid::new_v4().to_string().to_uppercase(),
            title: new.title.clone(),
            description: new.description.clone(),
            completed: false,
            due_date: None,
            priority: 0,
            etag: None,
        };
        reminders.push(reminder.clone());
        Ok(reminder)
    }

    async fn complete_reminder(
        &self,
        list_id: &str,
        reminder: &Reminder,
    ) -> Result<(), AppError> {
        let mut account = self.account()?;
        let stored = account
            .lists
            .iter_mut()
            .find(|(l, _)| l.id == list_id)
            .and_then(|(_, reminders)| reminders.iter_mut().find(|r| r.id == reminder.id))
            .ok_or_else(|| AppError::Upstream(format!("Unknown reminder {}", reminder.id)))?;

        stored.completed = true;
        self.upstream.completions.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(apple_id: &str, password: &str) -> AccountCredentials {
        AccountCredentials {
            apple_id: apple_id.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_rejects_wrong_password() {
        let upstream = InMemoryUpstream::new();
        upstream.add_account("a@icloud.com", "right-password");

        let err = upstream
            .connect(&creds("a@icloud.com", "wrong-password"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::UpstreamAuth(_)));
        assert_eq!(upstream.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_two_factor_challenge() {
        let upstream = InMemoryUpstream::new();
        upstream.add_account("a@icloud.com", "pw");
        upstream.require_two_factor("a@icloud.com");

        let err = upstream.connect(&creds("a@icloud.com", "pw")).await.err().unwrap();
        assert!(matches!(err, AppError::TwoFactorRequired));
    }

    #[tokio::test]
    async fn test_auto_provisioning() {
        let upstream = InMemoryUpstream::auto_provisioning();
        let session = upstream
            .connect(&creds("new@icloud.com", "anything"))
            .await
            .unwrap();

        let lists = session.lists().await.unwrap();
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].title, "Reminders");
    }

    #[tokio::test]
    async fn test_create_then_complete() {
        let upstream = InMemoryUpstream::new();
        upstream.add_account("a@icloud.com", "pw");
        upstream.add_list("a@icloud.com", "L1", "Personal");

        let session = upstream.connect(&creds("a@icloud.com", "pw")).await.unwrap();
        let created = session
            .create_reminder(&NewReminder {
                list_id: "L1".to_string(),
                title: "Buy milk".to_string(),
                description: String::new(),
            })
            .await
            .unwrap();

        session.complete_reminder("L1", &created).await.unwrap();

        let stored = upstream.reminder("a@icloud.com", "L1", &created.id).unwrap();
        assert!(stored.completed);
        assert_eq!(upstream.completion_count(), 1);
    }
}
