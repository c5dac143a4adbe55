// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Reminder lists and reminders as read from the upstream account.
//!
//! These are transient views; nothing here is persisted.

use serde::Serialize;

/// A reminder list (iCloud "collection").
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReminderList {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// A single reminder within a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reminder {
    pub id: String,
    pub title: String,
    pub description: String,
    pub completed: bool,
    /// Due date as `YYYY-MM-DD`, if set
    pub due_date: Option<String>,
    pub priority: u32,
    /// Upstream revision tag, needed when writing the reminder back
    #[serde(skip)]
    pub etag: Option<String>,
}

/// Fields for a reminder to be created.
#[derive(Debug, Clone)]
pub struct NewReminder {
    pub list_id: String,
    pub title: String,
    pub description: String,
}
