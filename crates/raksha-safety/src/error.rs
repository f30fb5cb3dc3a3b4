//! Error types for the safety core
//!
//! Nothing here terminates the process. Escalation errors are user-facing
//! notices; backend and location failures degrade the flow and are logged.

use crate::types::EscalationState;
use raksha_cache::RouteError;

/// Errors from the escalation state machine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EscalationError {
    /// `arm` called with a zero duration
    #[error("timer duration must be greater than zero seconds")]
    InvalidDuration,

    /// Identity policy requires a signed-in user and none is present
    #[error("sign-in required before arming the safety timer")]
    AuthRequired,

    /// No armed session matches the request
    #[error("no active safety session")]
    NoActiveSession,

    /// State machine rejected a transition
    #[error("illegal escalation transition {from:?} -> {to:?}")]
    IllegalTransition {
        from: EscalationState,
        to: EscalationState,
    },
}

impl EscalationError {
    /// Whether the error is worth showing to the user as-is
    #[inline]
    #[must_use]
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, Self::IllegalTransition { .. })
    }
}

/// Errors acquiring a location fix
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocationError {
    /// Device has no fix or positioning is unsupported
    #[error("location unavailable: {0}")]
    Unavailable(String),

    /// User or platform denied positioning
    #[error("location permission denied")]
    PermissionDenied,

    /// No fix within the configured budget
    #[error("location timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
}

/// Errors talking to the audit/timer backend
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Transport failure; the request was never cached or retried
    #[error(transparent)]
    Network(#[from] RouteError),

    /// No answer within the backend budget
    #[error("backend {endpoint} did not answer within {after_ms}ms")]
    Timeout { endpoint: String, after_ms: u64 },

    /// Backend answered with a non-success status
    #[error("backend {endpoint} returned status {status}")]
    Status { endpoint: String, status: u16 },

    /// Body could not be encoded or decoded
    #[error("backend {endpoint} payload error: {reason}")]
    Payload { endpoint: String, reason: String },

    /// Endpoint URL could not be built
    #[error("invalid backend url for {endpoint}: {reason}")]
    InvalidUrl { endpoint: String, reason: String },
}

impl BackendError {
    /// Create a payload error
    pub fn payload(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        Self::Payload {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    /// True for failures caused by connectivity rather than the backend itself
    #[inline]
    #[must_use]
    pub fn is_offline(&self) -> bool {
        match self {
            Self::Network(e) => e.is_network_unavailable(),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }
}

/// Errors managing emergency contacts
#[derive(Debug, thiserror::Error)]
pub enum ContactError {
    /// Phone number rejected before submission
    #[error("invalid phone number '{phone}': {reason}")]
    InvalidPhone { phone: String, reason: &'static str },

    /// No signed-in user to own the contact list
    #[error("sign-in required to manage contacts")]
    AuthRequired,

    /// Backend call failed
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Errors reading the activity log
#[derive(Debug, thiserror::Error)]
pub enum ActivityError {
    /// Date filter not in `YYYY-MM-DD` form
    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    /// No signed-in user
    #[error("sign-in required to view activity")]
    AuthRequired,

    /// Backend call failed
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Errors delivering an alert over one channel
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// Channel has nothing to deliver to
    #[error("channel {channel} has no recipients")]
    NoRecipients { channel: &'static str },

    /// Handing the link to the platform failed
    #[error("channel {channel} failed: {reason}")]
    Delivery {
        channel: &'static str,
        reason: String,
    },
}

/// Configuration errors for the safety core
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SafetyConfigError {
    /// Field failed validation
    #[error("invalid safety config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Combined safety-core error
#[derive(Debug, thiserror::Error)]
pub enum SafetyError {
    #[error("escalation error: {0}")]
    Escalation(#[from] EscalationError),

    #[error("location error: {0}")]
    Location(#[from] LocationError),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("contact error: {0}")]
    Contact(#[from] ContactError),

    #[error("activity error: {0}")]
    Activity(#[from] ActivityError),

    #[error("config error: {0}")]
    Config(#[from] SafetyConfigError),
}

impl SafetyError {
    /// Whether the caller can carry on (everything but bad configuration)
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Config(_))
    }
}

/// Result type alias for safety operations
pub type SafetyResult<T> = Result<T, SafetyError>;
