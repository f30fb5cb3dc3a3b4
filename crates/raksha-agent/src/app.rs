//! Application wiring
//!
//! [`RakshaApp`] builds the whole client from an [`AgentConfig`]: one cache
//! agent whose router carries every outbound request, the backend client on
//! top of that router, and the escalation timer whose alerts fan out over
//! the configured channels.

use crate::config::AgentConfig;
use raksha_cache::{Activation, CacheAgent, Fetcher, HttpFetcher, Request, Response, RouteError};
use raksha_safety::{
    ActivityLog, AlertChannel, AlertDispatcher, AlertReason, BackendClient, BackendNotifier,
    ChannelKind, ContactBook, ContactSource, DispatchReport, EscalationError, EscalationTimer,
    IdentityHandle, LastKnownLocation, LinkOpener, LocationSource, NotificationSink,
    SafetyContext, SessionHandle, ShareChannel, SmsChannel, WhatsAppChannel,
    WhatsAppContactsChannel,
};
use std::sync::Arc;

/// Errors assembling the application
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Configuration rejected
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    /// Cache agent rejected its settings
    #[error(transparent)]
    Cache(#[from] raksha_cache::CacheConfigError),

    /// HTTP transport could not be built
    #[error(transparent)]
    Fetch(#[from] raksha_cache::FetchError),

    /// Backend base URL unusable
    #[error(transparent)]
    Backend(#[from] raksha_safety::BackendError),
}

/// Platform capabilities the core does not own
#[derive(Debug, Clone)]
pub struct Platform {
    /// Network transport under the router
    pub fetcher: Arc<dyn Fetcher>,
    /// Device positioning
    pub location: Arc<dyn LocationSource>,
    /// Deep-link opener used by alert channels
    pub opener: Arc<dyn LinkOpener>,
}

/// Fully wired RakshaNet client
#[derive(Debug)]
pub struct RakshaApp {
    config: AgentConfig,
    agent: CacheAgent,
    backend: Arc<BackendClient>,
    contacts: Arc<ContactBook>,
    location: Arc<LastKnownLocation>,
    activity: ActivityLog,
    timer: EscalationTimer,
    context: SafetyContext,
    identity: IdentityHandle,
}

impl RakshaApp {
    /// Wire the app over real HTTP
    ///
    /// # Errors
    /// Invalid configuration or HTTP client construction failure
    pub fn from_config(
        config: AgentConfig,
        location: Arc<dyn LocationSource>,
        opener: Arc<dyn LinkOpener>,
    ) -> Result<Self, AppError> {
        config.validate()?;
        let fetcher = Arc::new(HttpFetcher::new(config.backend.timeout())?);
        Self::new(
            config,
            Platform {
                fetcher,
                location,
                opener,
            },
        )
    }

    /// Wire the app over the given platform
    ///
    /// # Errors
    /// Invalid configuration
    pub fn new(config: AgentConfig, platform: Platform) -> Result<Self, AppError> {
        config.validate()?;

        let agent = CacheAgent::new(&config.effective_cache(), platform.fetcher)?;
        let backend = Arc::new(BackendClient::new(&config.backend, agent.router().clone())?);
        let sink: Arc<dyn NotificationSink> = Arc::new(BackendNotifier::new(Arc::clone(&backend)));

        let (context, identity) = SafetyContext::new(config.escalation.identity_policy);
        let contacts = Arc::new(ContactBook::new(Arc::clone(&backend), context.clone()));
        let location = Arc::new(LastKnownLocation::new(platform.location));

        let dispatcher = config.escalation.channels.iter().fold(
            AlertDispatcher::new(
                context.clone(),
                Arc::clone(&location) as Arc<dyn LocationSource>,
                Arc::clone(&contacts) as Arc<dyn ContactSource>,
                Arc::clone(&sink),
            )
            .with_location_timeout(config.escalation.location_timeout()),
            |dispatcher, kind| dispatcher.with_channel(channel(*kind, &platform.opener)),
        );

        let timer = EscalationTimer::new(context.clone(), sink, dispatcher);
        let activity = ActivityLog::new(Arc::clone(&backend), context.clone());

        tracing::debug!(
            cache = %config.cache.version,
            backend = %backend.base(),
            channels = ?timer.dispatcher().channel_names(),
            "app wired"
        );

        Ok(Self {
            config,
            agent,
            backend,
            contacts,
            location,
            activity,
            timer,
            context,
            identity,
        })
    }

    /// Install and activate the offline shell
    pub async fn start(&self) -> Activation {
        self.agent.start().await
    }

    /// Route one request through the cache agent
    ///
    /// # Errors
    /// Network unavailable with nothing cached to fall back to
    pub async fn fetch(&self, request: Request) -> Result<Response, RouteError> {
        self.agent.on_request(request).await
    }

    /// Arm with `seconds`, or the configured default
    ///
    /// # Errors
    /// Zero duration, or no signed-in user under a required identity policy
    pub fn arm(&self, seconds: Option<u64>) -> Result<SessionHandle, EscalationError> {
        self.timer
            .arm(seconds.unwrap_or(self.config.escalation.default_seconds))
    }

    /// Raise a manual alert immediately
    pub async fn sos(&self) -> DispatchReport {
        self.timer.dispatcher().dispatch(AlertReason::Manual).await
    }

    /// Give backend notifications up to the request timeout to finish
    ///
    /// Call once before the runtime shuts down. Returns how many calls were
    /// abandoned.
    pub async fn flush(&self) -> usize {
        self.timer.flush(self.config.backend.timeout()).await
    }

    /// Configuration the app was built from
    #[inline]
    #[must_use]
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Cache agent
    #[inline]
    #[must_use]
    pub fn agent(&self) -> &CacheAgent {
        &self.agent
    }

    /// Backend client
    #[inline]
    #[must_use]
    pub fn backend(&self) -> &Arc<BackendClient> {
        &self.backend
    }

    /// Contact book
    #[inline]
    #[must_use]
    pub fn contacts(&self) -> &ContactBook {
        &self.contacts
    }

    /// Location with last-fix memory
    #[inline]
    #[must_use]
    pub fn location(&self) -> &LastKnownLocation {
        &self.location
    }

    /// Activity log and stats
    #[inline]
    #[must_use]
    pub fn activity(&self) -> &ActivityLog {
        &self.activity
    }

    /// Escalation timer
    #[inline]
    #[must_use]
    pub fn timer(&self) -> &EscalationTimer {
        &self.timer
    }

    /// Identity and policy shared by every component
    #[inline]
    #[must_use]
    pub fn context(&self) -> &SafetyContext {
        &self.context
    }

    /// Sign-in / sign-out handle
    #[inline]
    #[must_use]
    pub fn identity(&self) -> &IdentityHandle {
        &self.identity
    }
}

fn channel(kind: ChannelKind, opener: &Arc<dyn LinkOpener>) -> Arc<dyn AlertChannel> {
    let opener = Arc::clone(opener);
    match kind {
        ChannelKind::Whatsapp => Arc::new(WhatsAppChannel::new(opener)),
        ChannelKind::WhatsappContacts => Arc::new(WhatsAppContactsChannel::new(opener)),
        ChannelKind::Sms => Arc::new(SmsChannel::new(opener)),
        ChannelKind::Share => Arc::new(ShareChannel::new(opener)),
    }
}
