// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Reminders routes for authenticated users.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::middleware::ValidatedJson;
use crate::models::{NewReminder, Reminder, ReminderList};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

/// Upstream identifiers are GUIDs; anything longer is rejected before the upstream call.
const MAX_ID_LEN: usize = 128;

/// Reminders routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/reminders/lists", get(get_lists))
        .route("/api/reminders/list/{id}", get(get_reminders))
        .route("/api/reminders", post(create_reminder))
        .route("/api/reminders/{id}/complete", post(complete_reminder))
}

fn check_id(id: &str, what: &str) -> Result<()> {
    if id.is_empty() || id.len() > MAX_ID_LEN {
        return Err(AppError::Validation(format!("Invalid {}", what)));
    }
    Ok(())
}

// ─── Lists ───────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ListsResponse {
    pub lists: Vec<ReminderList>,
}

async fn get_lists(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ListsResponse>> {
    let lists = state.reminders.list_lists(user.user_id).await?;
    Ok(Json(ListsResponse { lists }))
}

// ─── Reminders ───────────────────────────────────────────────

#[derive(Serialize)]
pub struct RemindersResponse {
    pub reminders: Vec<Reminder>,
}

async fn get_reminders(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(list_id): Path<String>,
) -> Result<Json<RemindersResponse>> {
    check_id(&list_id, "list id")?;
    let reminders = state
        .reminders
        .list_reminders(user.user_id, &list_id)
        .await?;
    Ok(Json(RemindersResponse { reminders }))
}

#[derive(Deserialize, Validate)]
pub struct CreateReminderRequest {
    #[validate(length(min = 1, max = 128, message = "is required"))]
    pub list_id: String,
    #[validate(length(min = 1, max = 500, message = "must be 1-500 characters"))]
    pub title: String,
    #[serde(default)]
    #[validate(length(max = 4000, message = "must be at most 4000 characters"))]
    pub description: Option<String>,
}

#[derive(Serialize)]
pub struct CreateReminderResponse {
    pub success: bool,
    pub reminder: Reminder,
}

async fn create_reminder(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    ValidatedJson(req): ValidatedJson<CreateReminderRequest>,
) -> Result<(StatusCode, Json<CreateReminderResponse>)> {
    let reminder = state
        .reminders
        .create_reminder(
            user.user_id,
            NewReminder {
                list_id: req.list_id,
                title: req.title,
                description: req.description.unwrap_or_default(),
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateReminderResponse {
            success: true,
            reminder,
        }),
    ))
}

#[derive(Deserialize, Validate)]
pub struct CompleteReminderRequest {
    #[validate(length(min = 1, max = 128, message = "is required"))]
    pub list_id: String,
}

#[derive(Serialize)]
pub struct CompleteReminderResponse {
    pub success: bool,
}

async fn complete_reminder(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(reminder_id): Path<String>,
    ValidatedJson(req): ValidatedJson<CompleteReminderRequest>,
) -> Result<Json<CompleteReminderResponse>> {
    check_id(&reminder_id, "reminder id")?;
    state
        .reminders
        .complete_reminder(user.user_id, &req.list_id, &reminder_id)
        .await?;
    Ok(Json(CompleteReminderResponse { success: true }))
}
