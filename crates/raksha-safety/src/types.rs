//! Core types for the safety escalation flow

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use ulid::Ulid;

/// Escalation session identifier (ULID, sortable by arm time)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Ulid);

impl SessionId {
    /// Generate new session ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("session-").unwrap_or(s);
        Ulid::from_str(raw).map(Self)
    }
}

/// Stable user identifier as known to the backend (the account email)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Identifier used when no one is signed in
    pub const ANONYMOUS: &'static str = "anonymous";

    /// Wrap an identifier
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The anonymous user
    #[must_use]
    pub fn anonymous() -> Self {
        Self(Self::ANONYMOUS.to_string())
    }

    /// Whether this is the anonymous user
    #[inline]
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.0 == Self::ANONYMOUS
    }

    /// Identifier as a string
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Signed-in user as reported by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Name shown in the UI
    pub display_name: Option<String>,
    /// Account email; doubles as the user id
    pub email: String,
}

impl Identity {
    /// New identity
    #[must_use]
    pub fn new(display_name: Option<String>, email: impl Into<String>) -> Self {
        Self {
            display_name,
            email: email.into(),
        }
    }

    /// User id derived from the email
    #[must_use]
    pub fn user_id(&self) -> UserId {
        UserId::new(self.email.clone())
    }

    /// First word of the display name, for greetings
    #[must_use]
    pub fn first_name(&self) -> &str {
        self.display_name
            .as_deref()
            .and_then(|n| n.split_whitespace().next())
            .unwrap_or("friend")
    }
}

/// WGS84 position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub lng: f64,
}

impl Coordinates {
    /// New coordinates
    #[inline]
    #[must_use]
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Whether both components are finite and in range
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Short maps link used inside alert messages
    #[must_use]
    pub fn alert_link(&self) -> String {
        format!("https://maps.google.com/?q={},{}", self.lat, self.lng)
    }

    /// Share link with six-decimal precision
    #[must_use]
    pub fn share_link(&self) -> String {
        format!("https://www.google.com/maps?q={:.6},{:.6}", self.lat, self.lng)
    }
}

impl Display for Coordinates {
    /// `12.97160° N,  77.59460° E`
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let lat_dir = if self.lat >= 0.0 { 'N' } else { 'S' };
        let lng_dir = if self.lng >= 0.0 { 'E' } else { 'W' };
        write!(
            f,
            "{:.5}° {lat_dir},  {:.5}° {lng_dir}",
            self.lat.abs(),
            self.lng.abs()
        )
    }
}

/// Escalation session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EscalationState {
    /// Nothing armed
    Idle,
    /// Counting down
    Armed,
    /// User confirmed safety before expiry (terminal)
    CheckedIn,
    /// Countdown reached zero (terminal)
    Expired,
}

impl EscalationState {
    /// Terminal states end the session
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::CheckedIn | Self::Expired)
    }
}

/// Kind of escalation event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Session armed
    Armed,
    /// User checked in
    CheckedIn,
    /// Session expired
    Expired,
}

impl From<EventKind> for EscalationState {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Armed => Self::Armed,
            EventKind::CheckedIn => Self::CheckedIn,
            EventKind::Expired => Self::Expired,
        }
    }
}

/// Immutable record of one escalation transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationEvent {
    /// Session the event belongs to
    pub session_id: SessionId,
    /// What happened
    pub kind: EventKind,
    /// Wall-clock time of the transition
    pub occurred_at: DateTime<Utc>,
}

/// View of one escalation session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationSession {
    /// Session identity
    pub session_id: SessionId,
    /// Owner
    pub user: UserId,
    /// Wall-clock arm time
    pub armed_at: DateTime<Utc>,
    /// Countdown length
    pub duration_secs: u64,
    /// Current state
    pub state: EscalationState,
    /// Seconds left as of the last tick
    pub last_tick_remaining: u64,
}

/// Why an alert is being dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertReason {
    /// Timer expired without check-in
    TimerExpired,
    /// User pressed SOS
    Manual,
}

impl AlertReason {
    /// Opening line of the alert message
    #[must_use]
    pub fn headline(self) -> &'static str {
        match self {
            Self::TimerExpired => "🚨 EMERGENCY! I missed my safety check-in.",
            Self::Manual => "🚨 EMERGENCY! I need help.",
        }
    }
}

/// Emergency message composed fresh for every dispatch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPayload {
    /// User raising the alert
    pub origin_user_id: UserId,
    /// Position, if one was acquired in time
    pub coordinates: Option<Coordinates>,
    /// Text sent over every channel
    pub human_message: String,
    /// Composition time
    pub generated_at: DateTime<Utc>,
}

impl AlertPayload {
    /// Compose the payload for `reason`
    #[must_use]
    pub fn compose(
        user: UserId,
        reason: AlertReason,
        coordinates: Option<Coordinates>,
        generated_at: DateTime<Utc>,
    ) -> Self {
        let human_message = match coordinates {
            Some(c) => format!("{} My location: {}", reason.headline(), c.alert_link()),
            None => format!("{} My location is unavailable.", reason.headline()),
        };
        Self {
            origin_user_id: user,
            coordinates,
            human_message,
            generated_at,
        }
    }
}
