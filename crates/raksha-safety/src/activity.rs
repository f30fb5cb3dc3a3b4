//! Activity history from the audit backend
//!
//! Always read live (`NetworkOnly`); an offline read is an error, never a
//! stale copy.

use crate::backend::BackendClient;
use crate::context::SafetyContext;
use crate::error::ActivityError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Display class of an activity entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Expired timers and SOS
    Danger,
    /// Safe check-ins
    Success,
    /// Anything else
    Info,
}

impl Severity {
    /// Classify from the backend's free-text reason
    #[must_use]
    pub fn classify(reason: &str) -> Self {
        let reason = reason.to_lowercase();
        if reason.contains("expired") || reason.contains("sos") {
            Self::Danger
        } else if reason.contains("safe") {
            Self::Success
        } else {
            Self::Info
        }
    }
}

/// One audit record
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ActivityEntry {
    /// Free-text reason, e.g. "SOS button triggered"
    pub reason: String,
    /// Server timestamp as formatted by the backend
    pub time: String,
    /// Owner, when the backend includes it
    #[serde(default)]
    pub user: Option<String>,
    /// Latitude recorded with an SOS
    #[serde(default)]
    pub latitude: Option<f64>,
    /// Longitude recorded with an SOS
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl ActivityEntry {
    /// Display class
    #[inline]
    #[must_use]
    pub fn severity(&self) -> Severity {
        Severity::classify(&self.reason)
    }
}

/// `GET /stats/{userId}` reply
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct UserStats {
    /// All alerts ever
    pub total_alerts: u64,
    /// Alerts today (server time zone)
    pub alerts_today: u64,
    /// Alerts this week
    pub alerts_this_week: u64,
    /// Timestamp of the first alert
    pub first_alert: Option<String>,
    /// Timestamp of the latest alert
    pub last_alert: Option<String>,
    /// Server time of the read
    pub current_time: Option<String>,
    /// Server weekday name
    pub current_day: Option<String>,
    /// ISO week number
    pub week_number: Option<u32>,
}

/// Reads activity for the signed-in user
#[derive(Debug, Clone)]
pub struct ActivityLog {
    backend: Arc<BackendClient>,
    context: SafetyContext,
}

impl ActivityLog {
    /// New reader
    #[must_use]
    pub fn new(backend: Arc<BackendClient>, context: SafetyContext) -> Self {
        Self { backend, context }
    }

    /// All entries, newest first
    ///
    /// # Errors
    /// `AuthRequired` with no user; the backend failure otherwise
    pub async fn recent(&self) -> Result<Vec<ActivityEntry>, ActivityError> {
        let user = self.context.user_id().ok_or(ActivityError::AuthRequired)?;
        Ok(self.backend.get(&["logs", user.as_str()]).await?)
    }

    /// Entries on one `YYYY-MM-DD` date
    ///
    /// # Errors
    /// `InvalidDate` before any network call; `AuthRequired`; the backend failure
    pub async fn on_date(&self, date: &str) -> Result<Vec<ActivityEntry>, ActivityError> {
        let date = parse_date(date)?;
        let user = self.context.user_id().ok_or(ActivityError::AuthRequired)?;
        let date = date.format("%Y-%m-%d").to_string();
        Ok(self
            .backend
            .get(&["logs", user.as_str(), "date", date.as_str()])
            .await?)
    }

    /// Aggregate counters
    ///
    /// # Errors
    /// `AuthRequired` with no user; the backend failure otherwise
    pub async fn stats(&self) -> Result<UserStats, ActivityError> {
        let user = self.context.user_id().ok_or(ActivityError::AuthRequired)?;
        Ok(self.backend.get(&["stats", user.as_str()]).await?)
    }
}

/// Validate a `YYYY-MM-DD` date
///
/// # Errors
/// `ActivityError::InvalidDate` for anything else
pub fn parse_date(raw: &str) -> Result<NaiveDate, ActivityError> {
    let trimmed = raw.trim();
    if trimmed.len() != 10 {
        return Err(ActivityError::InvalidDate(raw.to_string()));
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .map_err(|_| ActivityError::InvalidDate(raw.to_string()))
}
