//! Escalation configuration

use crate::alert::DEFAULT_LOCATION_TIMEOUT;
use crate::context::IdentityPolicy;
use crate::error::SafetyConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Alert channel selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelKind {
    /// `wa.me` link, recipient chosen in the app
    Whatsapp,
    /// `wa.me/<number>` link per contact
    WhatsappContacts,
    /// `sms:` link per contact
    Sms,
    /// Location link to the share target
    Share,
}

/// Settings for the escalation timer and alert fan-out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EscalationConfig {
    /// Countdown used when the caller does not pick one
    pub default_seconds: u64,
    /// Bound on waiting for a location fix during an alert
    pub location_timeout_ms: u64,
    /// Whether arming requires a signed-in user
    pub identity_policy: IdentityPolicy,
    /// Channels every alert goes out on
    pub channels: Vec<ChannelKind>,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            default_seconds: 60,
            location_timeout_ms: u64::try_from(DEFAULT_LOCATION_TIMEOUT.as_millis())
                .unwrap_or(8_000),
            identity_policy: IdentityPolicy::Required,
            channels: vec![ChannelKind::Whatsapp, ChannelKind::Sms, ChannelKind::Share],
        }
    }
}

impl EscalationConfig {
    /// Default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With default countdown
    #[inline]
    #[must_use]
    pub fn with_default_seconds(mut self, seconds: u64) -> Self {
        self.default_seconds = seconds;
        self
    }

    /// With identity policy
    #[inline]
    #[must_use]
    pub fn with_identity_policy(mut self, policy: IdentityPolicy) -> Self {
        self.identity_policy = policy;
        self
    }

    /// With channels
    #[inline]
    #[must_use]
    pub fn with_channels(mut self, channels: Vec<ChannelKind>) -> Self {
        self.channels = channels;
        self
    }

    /// Location budget
    #[inline]
    #[must_use]
    pub fn location_timeout(&self) -> Duration {
        Duration::from_millis(self.location_timeout_ms)
    }

    /// Check the configuration is usable
    ///
    /// # Errors
    /// The first invalid field
    pub fn validate(&self) -> Result<(), SafetyConfigError> {
        if self.default_seconds == 0 {
            return Err(SafetyConfigError::InvalidValue {
                field: "escalation.default_seconds",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.location_timeout_ms == 0 {
            return Err(SafetyConfigError::InvalidValue {
                field: "escalation.location_timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.channels.is_empty() {
            return Err(SafetyConfigError::InvalidValue {
                field: "escalation.channels",
                reason: "at least one alert channel is required".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_stock_client() {
        let config = EscalationConfig::default();
        assert_eq!(config.default_seconds, 60);
        assert_eq!(config.location_timeout(), Duration::from_secs(8));
        config.validate().unwrap();
    }

    #[test]
    fn zero_countdown_rejected() {
        let err = EscalationConfig::new().with_default_seconds(0).validate().unwrap_err();
        assert!(matches!(
            err,
            SafetyConfigError::InvalidValue { field: "escalation.default_seconds", .. }
        ));
    }

    #[test]
    fn no_channels_rejected() {
        assert!(EscalationConfig::new().with_channels(vec![]).validate().is_err());
    }
}
