// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! iCloud web services client for Reminders.
//!
//! Handles:
//! - Apple ID sign-in (`/appleauth/auth/signin`)
//! - Account login and service discovery (`/setup/ws/1/accountLogin`)
//! - Second-factor detection (surfaced as an error, never completed here)
//! - Reminders collections and tasks under the discovered `rd/` root
//!
//! A fresh cookie jar is used for every connection; nothing is cached
//! between requests.

use crate::error::AppError;
use crate::models::{AccountCredentials, NewReminder, Reminder, ReminderList};
use crate::services::upstream::{RemindersSession, RemindersUpstream};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

/// Public widget key of the iCloud web client.
const WIDGET_KEY: &str = "d39ba9916b7251055b22c7f910e2ea796ee65e98b2ddecea8f5dde8d9d1a815d";
const ICLOUD_ORIGIN: &str = "https://www.icloud.com";
const CLIENT_BUILD_NUMBER: &str = "2021Project52";

/// iCloud reminders backend.
#[derive(Clone)]
pub struct ICloudUpstream {
    auth_endpoint: String,
    setup_endpoint: String,
    timeout: Duration,
}

impl ICloudUpstream {
    pub fn new(auth_endpoint: &str, setup_endpoint: &str, timeout: Duration) -> Self {
        Self {
            auth_endpoint: auth_endpoint.trim_end_matches('/').to_string(),
            setup_endpoint: setup_endpoint.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// Sign in with the Apple ID and return the web session token.
    async fn sign_in(
        &self,
        http: &reqwest::Client,
        client_id: &str,
        credentials: &AccountCredentials,
    ) -> Result<SignIn, AppError> {
        let body = json!({
            "accountName": credentials.apple_id,
            "password": credentials.password,
            "rememberMe": true,
            "trustTokens": [],
        });

        let response = http
            .post(format!("{}/signin", self.auth_endpoint))
            .query(&[("isRememberMeEnabled", "true")])
            .headers(auth_headers(client_id))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Sign-in request failed: {}", e)))?;

        match response.status() {
            s if s.is_success() => {}
            StatusCode::CONFLICT => return Err(AppError::TwoFactorRequired),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(AppError::UpstreamAuth(
                    "Invalid Apple ID or app-specific password".to_string(),
                ))
            }
            s => return Err(AppError::Upstream(format!("Sign-in failed: HTTP {}", s))),
        }

        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|h| h.to_str().ok())
                .map(str::to_string)
        };

        let session_token = header("x-apple-session-token")
            .ok_or_else(|| AppError::Upstream("Sign-in returned no session token".to_string()))?;

        Ok(SignIn {
            session_token,
            account_country: header("x-apple-id-account-country").unwrap_or_default(),
        })
    }

    /// Exchange the session token for the account's service map.
    async fn account_login(
        &self,
        http: &reqwest::Client,
        sign_in: &SignIn,
    ) -> Result<AccountLogin, AppError> {
        let body = json!({
            "accountCountryCode": sign_in.account_country,
            "dsWebAuthToken": sign_in.session_token,
            "extended_login": true,
            "trustToken": "",
        });

        let response = http
            .post(format!("{}/accountLogin", self.setup_endpoint))
            .header(reqwest::header::ORIGIN, ICLOUD_ORIGIN)
            .header(reqwest::header::REFERER, format!("{}/", ICLOUD_ORIGIN))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Account login request failed: {}", e)))?;

        check_response_json(response).await
    }
}

#[async_trait]
impl RemindersUpstream for ICloudUpstream {
    async fn connect(
        &self,
        credentials: &AccountCredentials,
    ) -> Result<Box<dyn RemindersSession>, AppError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(self.timeout)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client build failed: {}", e)))?;

        let client_id = format!("auth-{}", uuid::Uuid::new_v4());

        let sign_in = self.sign_in(&http, &client_id, credentials).await?;
        let login = self.account_login(&http, &sign_in).await?;

        if login.requires_two_factor() {
            tracing::warn!("iCloud account requires a second factor");
            return Err(AppError::TwoFactorRequired);
        }

        let root = login
            .webservices
            .reminders
            .map(|s| s.url.trim_end_matches('/').to_string())
            .ok_or_else(|| {
                AppError::Upstream("Reminders service not available for this account".to_string())
            })?;

        tracing::debug!(dsid = %login.ds_info.dsid, "iCloud session established");

        Ok(Box::new(ICloudSession {
            http,
            root,
            params: vec![
                ("clientBuildNumber", CLIENT_BUILD_NUMBER.to_string()),
                ("clientId", client_id),
                ("dsid", login.ds_info.dsid),
                ("lang", "en-us".to_string()),
                ("usertz", "UTC".to_string()),
            ],
        }))
    }
}

/// One authenticated iCloud session (cookie jar + reminders root).
struct ICloudSession {
    http: reqwest::Client,
    root: String,
    params: Vec<(&'static str, String)>,
}

impl ICloudSession {
    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, AppError> {
        let response = self
            .http
            .get(format!("{}{}", self.root, path))
            .query(&self.params)
            .header(reqwest::header::ORIGIN, ICLOUD_ORIGIN)
            .send()
            .await
            .map_err(|e| AppError::Upstream(e.to_string()))?;

        check_response_json(response).await
    }

    async fn post_tasks(&self, body: &Value, method_override: Option<&str>) -> Result<(), AppError> {
        let mut request = self
            .http
            .post(format!("{}/rd/reminders/tasks", self.root))
            .query(&self.params)
            .header(reqwest::header::ORIGIN, ICLOUD_ORIGIN)
            .json(body);
        if let Some(method) = method_override {
            request = request.query(&[("methodOverride", method)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::Upstream(e.to_string()))?;

        check_response(response).await
    }
}

#[async_trait]
impl RemindersSession for ICloudSession {
    async fn lists(&self) -> Result<Vec<ReminderList>, AppError> {
        let startup: Startup = self.get_json("/rd/startup").await?;
        Ok(startup
            .collections
            .into_iter()
            .map(|c| ReminderList {
                id: c.guid,
                title: c.title,
                color: c.color,
            })
            .collect())
    }

    async fn reminders(&self, list_id: &str) -> Result<Vec<Reminder>, AppError> {
        let page: RemindersPage = self.get_json(&format!("/rd/reminders/{}", list_id)).await?;
        Ok(page
            .reminders
            .into_iter()
            .filter(|r| r.p_guid.as_deref().map_or(true, |p| p == list_id))
            .map(RawReminder::into_reminder)
            .collect())
    }

    async fn create_reminder(&self, new: &NewReminder) -> Result<Reminder, AppError> {
        let guid = uuid::Uuid::new_v4().to_string().to_uppercase();
        let now_ms = chrono::Utc::now().timestamp_millis();

        let body = json!({
            "Reminders": {
                "title": new.title,
                "description": new.description,
                "pGuid": new.list_id,
                "etag": null,
                "order": null,
                "priority": 0,
                "recurrence": null,
                "alarms": [],
                "startDate": null,
                "startDateTz": null,
                "startDateIsAllDay": false,
                "completedDate": null,
                "dueDate": null,
                "dueDateIsAllDay": false,
                "lastModifiedDate": null,
                "createdDate": null,
                "isFamily": null,
                "createdDateExtended": now_ms,
                "guid": guid,
            },
            "ClientState": { "Collections": [] },
        });

        self.post_tasks(&body, None).await?;

        Ok(Reminder {
            id: guid,
            title: new.title.clone(),
            description: new.description.clone(),
            completed: false,
            due_date: None,
            priority: 0,
            etag: None,
        })
    }

    async fn complete_reminder(
        &self,
        list_id: &str,
        reminder: &Reminder,
    ) -> Result<(), AppError> {
        let body = json!({
            "Reminders": {
                "guid": reminder.id,
                "pGuid": list_id,
                "etag": reminder.etag,
                "title": reminder.title,
                "description": reminder.description,
                "priority": reminder.priority,
                "completedDate": completed_date_now(),
            },
            "ClientState": { "Collections": [] },
        });

        self.post_tasks(&body, Some("PUT")).await
    }
}

// ─── Wire types ─────────────────────────────────────────────────

struct SignIn {
    session_token: String,
    account_country: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountLogin {
    ds_info: DsInfo,
    #[serde(default)]
    hsa_challenge_required: bool,
    #[serde(default = "default_true")]
    hsa_trusted_browser: bool,
    #[serde(default)]
    webservices: Webservices,
}

impl AccountLogin {
    /// HSA2 accounts need a second factor unless this browser is trusted.
    fn requires_two_factor(&self) -> bool {
        self.ds_info.hsa_version == 2 && (self.hsa_challenge_required || !self.hsa_trusted_browser)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DsInfo {
    #[serde(deserialize_with = "string_or_number")]
    dsid: String,
    #[serde(default)]
    hsa_version: u32,
}

#[derive(Debug, Default, Deserialize)]
struct Webservices {
    reminders: Option<Service>,
}

#[derive(Debug, Deserialize)]
struct Service {
    url: String,
}

#[derive(Debug, Deserialize)]
struct Startup {
    #[serde(rename = "Collections", default)]
    collections: Vec<RawCollection>,
}

#[derive(Debug, Deserialize)]
struct RawCollection {
    guid: String,
    title: String,
    color: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RemindersPage {
    #[serde(rename = "Reminders", default)]
    reminders: Vec<RawReminder>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReminder {
    guid: String,
    #[serde(default)]
    title: String,
    description: Option<String>,
    completed_date: Option<Value>,
    due_date: Option<Value>,
    priority: Option<u32>,
    etag: Option<String>,
    p_guid: Option<String>,
}

impl RawReminder {
    fn into_reminder(self) -> Reminder {
        Reminder {
            id: self.guid,
            title: self.title,
            description: self.description.unwrap_or_default(),
            completed: self.completed_date.is_some_and(|v| !v.is_null()),
            due_date: self.due_date.as_ref().and_then(format_date_array),
            priority: self.priority.unwrap_or(0),
            etag: self.etag,
        }
    }
}

fn default_true() -> bool {
    true
}

fn string_or_number<'de, D: serde::Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match Value::deserialize(d)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

/// iCloud dates are arrays: `[yyyymmdd, year, month, day, hour, minute]`.
fn format_date_array(value: &Value) -> Option<String> {
    let parts = value.as_array()?;
    let year = parts.get(1)?.as_u64()?;
    let month = parts.get(2)?.as_u64()?;
    let day = parts.get(3)?.as_u64()?;
    Some(format!("{:04}-{:02}-{:02}", year, month, day))
}

fn completed_date_now() -> Value {
    use chrono::{Datelike, Timelike};

    let now = chrono::Utc::now();
    let stamp = now.year() as i64 * 10_000 + now.month() as i64 * 100 + now.day() as i64;
    json!([
        stamp,
        now.year(),
        now.month(),
        now.day(),
        now.hour(),
        now.minute()
    ])
}

fn auth_headers(client_id: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let mut put = |name: &'static str, value: &str| {
        if let Ok(v) = HeaderValue::from_str(value) {
            headers.insert(HeaderName::from_static(name), v);
        }
    };

    put("origin", ICLOUD_ORIGIN);
    put("referer", "https://www.icloud.com/");
    put("x-apple-widget-key", WIDGET_KEY);
    put("x-apple-oauth-client-id", WIDGET_KEY);
    put("x-apple-oauth-client-type", "firstPartyAuth");
    put("x-apple-oauth-redirect-uri", ICLOUD_ORIGIN);
    put("x-apple-oauth-require-grant-code", "true");
    put("x-apple-oauth-response-mode", "web_message");
    put("x-apple-oauth-response-type", "code");
    put("x-apple-oauth-state", client_id);
    headers
}

/// Map non-success statuses onto the error taxonomy.
async fn status_error(response: reqwest::Response) -> AppError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    // The body stays in the log; only the status reaches the client.
    tracing::warn!(status = %status, body = %truncate(&body, 200), "iCloud request failed");

    match status.as_u16() {
        401 | 421 | 450 => AppError::UpstreamAuth(format!("iCloud session rejected (HTTP {})", status)),
        _ => AppError::Upstream(format!("HTTP {}", status)),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Check response status and return error if not successful.
async fn check_response(response: reqwest::Response) -> Result<(), AppError> {
    if response.status().is_success() {
        return Ok(());
    }
    Err(status_error(response).await)
}

/// Check response and parse JSON body.
async fn check_response_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, AppError> {
    if !response.status().is_success() {
        return Err(status_error(response).await);
    }

    response
        .json()
        .await
        .map_err(|e| AppError::Upstream(format!("JSON parse error: {}", e)))
}
