// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Reminders gateway: per-request upstream sessions for a verified user.
//!
//! Each operation decrypts the caller's stored credentials, opens one
//! upstream session, performs the call and drops everything. There is no
//! caching and no retry; an upstream failure is returned as-is.

use crate::error::AppError;
use crate::models::{NewReminder, Reminder, ReminderList};
use crate::services::auth::AuthService;
use crate::services::upstream::{RemindersSession, RemindersUpstream};
use std::sync::Arc;

/// High-level reminders service used by the HTTP handlers.
#[derive(Clone)]
pub struct RemindersGateway {
    auth: AuthService,
    upstream: Arc<dyn RemindersUpstream>,
}

impl RemindersGateway {
    pub fn new(auth: AuthService, upstream: Arc<dyn RemindersUpstream>) -> Self {
        Self { auth, upstream }
    }

    async fn session(&self, user_id: i64) -> Result<Box<dyn RemindersSession>, AppError> {
        let credentials = self.auth.account_credentials(user_id).await?;
        self.upstream.connect(&credentials).await.map_err(|e| {
            tracing::warn!(user_id, error = %e, "Failed to open upstream session");
            e
        })
    }

    /// Fail with `NotFound` unless `list_id` is one of the account's lists.
    async fn require_list(
        session: &dyn RemindersSession,
        list_id: &str,
    ) -> Result<ReminderList, AppError> {
        session
            .lists()
            .await?
            .into_iter()
            .find(|l| l.id == list_id)
            .ok_or_else(|| AppError::NotFound("List not found".to_string()))
    }

    /// All reminder lists of the user's account.
    pub async fn list_lists(&self, user_id: i64) -> Result<Vec<ReminderList>, AppError> {
        let session = self.session(user_id).await?;
        let lists = session.lists().await?;
        tracing::debug!(user_id, count = lists.len(), "Fetched reminder lists");
        Ok(lists)
    }

    /// Reminders of one list.
    pub async fn list_reminders(
        &self,
        user_id: i64,
        list_id: &str,
    ) -> Result<Vec<Reminder>, AppError> {
        let session = self.session(user_id).await?;
        Self::require_list(session.as_ref(), list_id).await?;
        let reminders = session.reminders(list_id).await?;
        tracing::debug!(user_id, list_id, count = reminders.len(), "Fetched reminders");
        Ok(reminders)
    }

    /// Create a reminder in an existing list.
    pub async fn create_reminder(
        &self,
        user_id: i64,
        reminder: NewReminder,
    ) -> Result<Reminder, AppError> {
        let session = self.session(user_id).await?;
        Self::require_list(session.as_ref(), &reminder.list_id).await?;
        let created = session.create_reminder(&reminder).await?;
        tracing::info!(user_id, list_id = %reminder.list_id, reminder_id = %created.id, "Reminder created");
        Ok(created)
    }

    /// Mark a reminder completed.
    ///
    /// The reminder must be present in the given list; otherwise `NotFound`
    /// is returned and no write is sent upstream.
    pub async fn complete_reminder(
        &self,
        user_id: i64,
        list_id: &str,
        reminder_id: &str,
    ) -> Result<(), AppError> {
        let session = self.session(user_id).await?;
        Self::require_list(session.as_ref(), list_id).await?;

        let reminder = session
            .reminders(list_id)
            .await?
            .into_iter()
            .find(|r| r.id == reminder_id)
            .ok_or_else(|| AppError::NotFound("Reminder not found".to_string()))?;

        session.complete_reminder(list_id, &reminder).await?;
        tracing::info!(user_id, list_id, reminder_id, "Reminder completed");
        Ok(())
    }
}
