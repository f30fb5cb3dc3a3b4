//! Audit/timer backend client
//!
//! Every call is a single `NetworkOnly` attempt through the cache agent's
//! router with a short timeout. Nothing is cached, queued or retried.
//! [`BackendNotifier`] adapts the client to the fire-and-forget
//! [`NotificationSink`] contract.

use crate::error::BackendError;
use crate::notify::NotificationSink;
use crate::types::{Coordinates, UserId};
use async_trait::async_trait;
use raksha_cache::{Request, RequestRouter, Response, RoutingDecision};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Hosted backend of the stock client
pub const DEFAULT_BACKEND_URL: &str = "https://rakshanetwork-backend.onrender.com/";

/// Backend connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendConfig {
    /// Base URL; endpoints are joined onto it
    pub base_url: String,
    /// Per-request budget in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BACKEND_URL.to_string(),
            request_timeout_ms: 5_000,
        }
    }
}

impl BackendConfig {
    /// With base URL
    #[inline]
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// With request timeout
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Request budget
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Base URL with a trailing slash so relative joins append
    ///
    /// # Errors
    /// `BackendError::InvalidUrl` if `base_url` is not absolute
    pub fn base(&self) -> Result<Url, BackendError> {
        let mut raw = self.base_url.clone();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw).map_err(|e| BackendError::InvalidUrl {
            endpoint: raw,
            reason: e.to_string(),
        })
    }

    /// Host of the backend, for routing rules
    #[must_use]
    pub fn host(&self) -> Option<String> {
        self.base().ok()?.host_str().map(str::to_string)
    }
}

/// `POST /start-timer` reply
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct StartTimerReply {
    /// Human message
    pub message: String,
    /// Server time the timer started
    pub started_at: Option<String>,
    /// Server wall-clock time the remote timer fires
    pub fires_at: Option<String>,
    /// Minutes the backend armed for
    pub duration_min: Option<u32>,
}

/// `POST /check-in` reply
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct CheckInReply {
    /// Human message
    pub message: String,
    /// Server time of the check-in
    pub checked_in: Option<String>,
}

/// `POST /sos` reply
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct SosReply {
    /// Human message
    pub message: String,
    /// Server time of the alert
    pub time: Option<String>,
    /// Maps link or "No location"
    pub location: Option<String>,
}

/// Generic `{message}` reply
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct MessageReply {
    /// Human message
    pub message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserBody<'a> {
    user_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lng: Option<f64>,
}

impl<'a> UserBody<'a> {
    fn new(user: &'a UserId) -> Self {
        Self {
            user_id: user.as_str(),
            minutes: None,
            phone: None,
            lat: None,
            lng: None,
        }
    }
}

/// Typed client for the audit/timer/contact backend
#[derive(Debug, Clone)]
pub struct BackendClient {
    base: Url,
    timeout: Duration,
    router: RequestRouter,
}

impl BackendClient {
    /// Client over the agent's router
    ///
    /// # Errors
    /// `BackendError::InvalidUrl` if the configured base URL is not absolute
    pub fn new(config: &BackendConfig, router: RequestRouter) -> Result<Self, BackendError> {
        Ok(Self {
            base: config.base()?,
            timeout: config.timeout(),
            router,
        })
    }

    /// Base URL
    #[inline]
    #[must_use]
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Arm the remote per-user timer, replacing any previous one
    ///
    /// # Errors
    /// Any transport, status or payload failure
    pub async fn start_timer(
        &self,
        user: &UserId,
        minutes: u32,
    ) -> Result<StartTimerReply, BackendError> {
        let body = UserBody {
            minutes: Some(minutes),
            ..UserBody::new(user)
        };
        self.post("start-timer", &body).await
    }

    /// Cancel the remote timer and record a safe check-in
    ///
    /// # Errors
    /// Any transport, status or payload failure
    pub async fn check_in(&self, user: &UserId) -> Result<CheckInReply, BackendError> {
        self.post("check-in", &UserBody::new(user)).await
    }

    /// Record an SOS
    ///
    /// # Errors
    /// Any transport, status or payload failure
    pub async fn sos(
        &self,
        user: &UserId,
        coordinates: Option<Coordinates>,
    ) -> Result<SosReply, BackendError> {
        let body = UserBody {
            lat: coordinates.map(|c| c.lat),
            lng: coordinates.map(|c| c.lng),
            ..UserBody::new(user)
        };
        self.post("sos", &body).await
    }

    /// Save an emergency contact
    ///
    /// # Errors
    /// Any transport, status or payload failure
    pub async fn add_contact(&self, user: &UserId, phone: &str) -> Result<MessageReply, BackendError> {
        let body = UserBody {
            phone: Some(phone),
            ..UserBody::new(user)
        };
        self.post("add-contact", &body).await
    }

    /// Remove an emergency contact
    ///
    /// # Errors
    /// Any transport, status or payload failure
    pub async fn delete_contact(
        &self,
        user: &UserId,
        phone: &str,
    ) -> Result<MessageReply, BackendError> {
        let body = UserBody {
            phone: Some(phone),
            ..UserBody::new(user)
        };
        self.post("delete-contact", &body).await
    }

    /// POST `body` as JSON to `endpoint`
    ///
    /// # Errors
    /// Any transport, status or payload failure
    pub async fn post<B, R>(&self, endpoint: &str, body: &B) -> Result<R, BackendError>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let url = self.endpoint(&[endpoint])?;
        let request = Request::post_json(url, body).map_err(|e| BackendError::payload(endpoint, e))?;
        let response = self.send(endpoint, request).await?;
        response.json().map_err(|e| BackendError::payload(endpoint, e))
    }

    /// GET the resource at `segments` (each one percent-encoded)
    ///
    /// # Errors
    /// Any transport, status or payload failure
    pub async fn get<R: DeserializeOwned>(&self, segments: &[&str]) -> Result<R, BackendError> {
        let endpoint = segments.first().copied().unwrap_or_default();
        let url = self.endpoint(segments)?;
        let response = self.send(endpoint, Request::get(url)).await?;
        response.json().map_err(|e| BackendError::payload(endpoint, e))
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, BackendError> {
        let path = segments
            .iter()
            .map(|s| urlencoding::encode(s).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        self.base.join(&path).map_err(|e| BackendError::InvalidUrl {
            endpoint: path,
            reason: e.to_string(),
        })
    }

    async fn send(&self, endpoint: &str, request: Request) -> Result<Response, BackendError> {
        let response = tokio::time::timeout(
            self.timeout,
            self.router.execute(request, RoutingDecision::NetworkOnly),
        )
        .await
        .map_err(|_| BackendError::Timeout {
            endpoint: endpoint.to_string(),
            after_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
        })??;

        if !response.is_success() {
            return Err(BackendError::Status {
                endpoint: endpoint.to_string(),
                status: response.status(),
            });
        }
        Ok(response)
    }
}

/// [`NotificationSink`] backed by the backend; every failure is logged and dropped
#[derive(Debug, Clone)]
pub struct BackendNotifier {
    client: Arc<BackendClient>,
}

impl BackendNotifier {
    /// Wrap a client
    #[must_use]
    pub fn new(client: Arc<BackendClient>) -> Self {
        Self { client }
    }
}

fn log_outcome<T>(call: &'static str, user: &UserId, result: Result<T, BackendError>) {
    match result {
        Ok(_) => tracing::debug!(call, %user, "backend notified"),
        Err(e) if e.is_offline() => {
            tracing::warn!(call, %user, error = %e, "backend unreachable, notification dropped");
        }
        Err(e) => tracing::warn!(call, %user, error = %e, "backend notification failed"),
    }
}

#[async_trait]
impl NotificationSink for BackendNotifier {
    async fn notify_armed(&self, user: &UserId, minutes: u32) {
        log_outcome("start-timer", user, self.client.start_timer(user, minutes).await);
    }

    async fn notify_checked_in(&self, user: &UserId) {
        log_outcome("check-in", user, self.client.check_in(user).await);
    }

    async fn notify_sos(&self, user: &UserId, coordinates: Option<Coordinates>) {
        log_outcome("sos", user, self.client.sos(user, coordinates).await);
    }
}
