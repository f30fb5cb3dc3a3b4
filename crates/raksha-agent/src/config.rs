//! Agent configuration
//!
//! One TOML file, every section optional. The path comes from `--config`
//! or `RAKSHA_CONFIG`; with neither, the stock defaults apply.
//!
//! ```toml
//! [cache]
//! version = "rakshanet-v2"
//! origin = "https://raksha.example/"
//!
//! [backend]
//! base_url = "https://rakshanetwork-backend.onrender.com"
//! request_timeout_ms = 5000
//!
//! [escalation]
//! default_seconds = 60
//! identity_policy = "allow_anonymous"
//! channels = ["whatsapp", "sms"]
//!
//! [logging]
//! filter = "raksha=debug"
//! json = true
//! ```

use raksha_cache::{CacheConfig, CacheConfigError, RoutingPolicy};
use raksha_safety::{BackendConfig, EscalationConfig, SafetyConfigError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "RAKSHA_CONFIG";

/// Errors loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Not valid TOML, or an unknown key
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// Value out of range
    #[error("invalid config value for {field}: {reason}")]
    InvalidValue {
        /// Dotted key
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// Cache section rejected
    #[error(transparent)]
    Cache(#[from] CacheConfigError),

    /// Escalation section rejected
    #[error(transparent)]
    Safety(#[from] SafetyConfigError),
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "raksha=info".to_string(),
            json: false,
        }
    }
}

/// Complete agent configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    /// Offline cache and routing
    pub cache: CacheConfig,
    /// Audit/timer backend
    pub backend: BackendConfig,
    /// Timer and alert fan-out
    pub escalation: EscalationConfig,
    /// Log output
    pub logging: LoggingConfig,
}

impl AgentConfig {
    /// Load from `path`, else `RAKSHA_CONFIG`, else defaults; then validate
    ///
    /// # Errors
    /// Unreadable file, bad TOML, or an invalid value
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let config = match path.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::from_path(&path)?,
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a file without validating
    ///
    /// # Errors
    /// Unreadable file or bad TOML
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    /// Parse TOML text without validating
    ///
    /// # Errors
    /// Bad TOML or unknown keys
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Check every section
    ///
    /// # Errors
    /// The first invalid value
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cache.validate()?;
        self.escalation.validate()?;
        self.backend
            .base()
            .map_err(|e| ConfigError::InvalidValue {
                field: "backend.base_url",
                reason: e.to_string(),
            })?;
        if self.co_hosted_backend_path().as_deref() == Some("/") {
            return Err(ConfigError::InvalidValue {
                field: "backend.base_url",
                reason: "shares the app origin's host at its root; give it a path such as /api/"
                    .to_string(),
            });
        }
        if self.backend.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "backend.request_timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.logging.filter.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "logging.filter",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Routing policy with the configured backend forced network-only
    ///
    /// A backend on its own host makes that host network-only. A backend on
    /// the app origin's host only claims its path, so the shell stays
    /// cacheable.
    #[must_use]
    pub fn routing(&self) -> RoutingPolicy {
        let routing = self.cache.routing.clone();
        match (self.co_hosted_backend_path(), self.backend.host()) {
            (Some(path), _) => routing.with_network_only_path_prefix(path),
            (None, Some(host)) => routing.with_network_only_host(host),
            (None, None) => routing,
        }
    }

    /// Backend path when the origin's host is the backend host or under it
    fn co_hosted_backend_path(&self) -> Option<String> {
        let origin = self.cache.origin_url().ok()?;
        let base = self.backend.base().ok()?;
        let origin_host = origin.host_str()?.to_ascii_lowercase();
        let backend_host = base.host_str()?.to_ascii_lowercase();
        let shared = origin_host == backend_host
            || origin_host.ends_with(&format!(".{backend_host}"));
        shared.then(|| base.path().to_string())
    }

    /// Cache section with [`routing`](Self::routing) applied
    #[must_use]
    pub fn effective_cache(&self) -> CacheConfig {
        self.cache.clone().with_routing(self.routing())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raksha_safety::{ChannelKind, IdentityPolicy};

    #[test]
    fn empty_file_is_all_defaults() {
        let config = AgentConfig::from_toml("").unwrap();
        assert_eq!(config, AgentConfig::default());
        config.validate().unwrap();
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let config = AgentConfig::from_toml(
            r#"
            [escalation]
            default_seconds = 300
            identity_policy = "allow_anonymous"
            channels = ["whatsapp-contacts"]

            [logging]
            json = true
            "#,
        )
        .unwrap();
        assert_eq!(config.escalation.default_seconds, 300);
        assert_eq!(config.escalation.identity_policy, IdentityPolicy::AllowAnonymous);
        assert_eq!(config.escalation.channels, vec![ChannelKind::WhatsappContacts]);
        assert_eq!(config.escalation.location_timeout_ms, 8_000);
        assert!(config.logging.json);
        assert_eq!(config.logging.filter, "raksha=info");
        assert_eq!(config.cache.version, "rakshanet-v1");
    }

    #[test]
    fn unknown_keys_rejected() {
        assert!(matches!(
            AgentConfig::from_toml("[cache]\nttl = 5\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn backend_host_becomes_network_only() {
        let config = AgentConfig {
            backend: BackendConfig::default().with_base_url("https://audit.example.org/api"),
            ..AgentConfig::default()
        };
        assert!(config
            .routing()
            .network_only_hosts
            .contains(&"audit.example.org".to_string()));
    }

    #[test]
    fn co_hosted_backend_claims_only_its_path() {
        let config = AgentConfig {
            cache: CacheConfig::default().with_origin("https://raksha.example/"),
            backend: BackendConfig::default().with_base_url("https://raksha.example/audit"),
            ..AgentConfig::default()
        };
        config.validate().unwrap();

        let routing = config.routing();
        assert!(!routing
            .network_only_hosts
            .contains(&"raksha.example".to_string()));
        assert!(routing
            .network_only_path_prefixes
            .contains(&"/audit/".to_string()));
    }

    #[test]
    fn backend_on_parent_domain_claims_only_its_path() {
        let config = AgentConfig {
            cache: CacheConfig::default().with_origin("https://app.raksha.example/"),
            backend: BackendConfig::default().with_base_url("https://raksha.example/api/"),
            ..AgentConfig::default()
        };
        let routing = config.routing();
        assert!(!routing
            .network_only_hosts
            .contains(&"raksha.example".to_string()));
        assert_eq!(
            routing
                .network_only_path_prefixes
                .iter()
                .filter(|p| p.as_str() == "/api/")
                .count(),
            1
        );
    }

    #[test]
    fn co_hosted_backend_at_root_rejected() {
        let config = AgentConfig {
            cache: CacheConfig::default().with_origin("https://raksha.example/"),
            backend: BackendConfig::default().with_base_url("https://raksha.example"),
            ..AgentConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "backend.base_url", .. })
        ));
    }

    #[test]
    fn zero_backend_timeout_rejected() {
        let config = AgentConfig::from_toml("[backend]\nrequest_timeout_ms = 0\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "backend.request_timeout_ms", .. })
        ));
    }
}
