//! Emergency alert fan-out
//!
//! [`AlertDispatcher::dispatch`] composes a fresh [`AlertPayload`] and hands
//! it to every configured [`AlertChannel`]. Channels are independent: one
//! failing never stops the others, and dispatch itself never fails.

use crate::clock::{Clock, SystemClock};
use crate::contacts::{ContactSource, PhoneNumber};
use crate::context::SafetyContext;
use crate::error::{ChannelError, LocationError};
use crate::location::{acquire_within, LocationSource};
use crate::notify::{spawn_sos, NotificationSink, NotificationTasks};
use crate::types::{AlertPayload, AlertReason, UserId};
use async_trait::async_trait;
use futures::future::join_all;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// Default bound on waiting for a location fix
pub const DEFAULT_LOCATION_TIMEOUT: Duration = Duration::from_secs(8);

/// Platform capability to open a deep link (browser, messaging app, share sheet)
pub trait LinkOpener: Send + Sync + Debug {
    /// Open `url`
    ///
    /// # Errors
    /// Free-form reason if the platform refused
    fn open(&self, url: &str) -> Result<(), String>;
}

/// Opener that only logs the link (headless runs)
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingOpener;

impl LinkOpener for LoggingOpener {
    fn open(&self, url: &str) -> Result<(), String> {
        tracing::info!(%url, "alert link");
        Ok(())
    }
}

/// One way of getting the alert to a human
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AlertChannel: Send + Sync + Debug {
    /// Short channel name for reports and logs
    fn name(&self) -> &'static str;

    /// Deliver `payload`; `contacts` is the list known at dispatch time
    async fn deliver(
        &self,
        payload: &AlertPayload,
        contacts: &[PhoneNumber],
    ) -> Result<(), ChannelError>;
}

/// `https://wa.me/?text=…`, recipient picked in the app
#[derive(Debug, Clone)]
pub struct WhatsAppChannel {
    opener: Arc<dyn LinkOpener>,
}

impl WhatsAppChannel {
    /// Channel opening links through `opener`
    #[must_use]
    pub fn new(opener: Arc<dyn LinkOpener>) -> Self {
        Self { opener }
    }

    /// Deep link carrying `message`
    #[must_use]
    pub fn link(message: &str) -> String {
        format!("https://wa.me/?text={}", urlencoding::encode(message))
    }
}

#[async_trait]
impl AlertChannel for WhatsAppChannel {
    fn name(&self) -> &'static str {
        "whatsapp"
    }

    async fn deliver(&self, payload: &AlertPayload, _contacts: &[PhoneNumber]) -> Result<(), ChannelError> {
        self.opener
            .open(&Self::link(&payload.human_message))
            .map_err(|reason| ChannelError::Delivery {
                channel: self.name(),
                reason,
            })
    }
}

/// `https://wa.me/<digits>?text=…` for every contact
#[derive(Debug, Clone)]
pub struct WhatsAppContactsChannel {
    opener: Arc<dyn LinkOpener>,
}

impl WhatsAppContactsChannel {
    /// Channel opening links through `opener`
    #[must_use]
    pub fn new(opener: Arc<dyn LinkOpener>) -> Self {
        Self { opener }
    }

    /// Deep link to `phone` carrying `message`
    #[must_use]
    pub fn link(phone: &PhoneNumber, message: &str) -> String {
        format!(
            "https://wa.me/{}?text={}",
            phone.digits(),
            urlencoding::encode(message)
        )
    }
}

#[async_trait]
impl AlertChannel for WhatsAppContactsChannel {
    fn name(&self) -> &'static str {
        "whatsapp-contacts"
    }

    async fn deliver(&self, payload: &AlertPayload, contacts: &[PhoneNumber]) -> Result<(), ChannelError> {
        per_contact(self.name(), self.opener.as_ref(), contacts, |phone| {
            Self::link(phone, &payload.human_message)
        })
    }
}

/// `sms:<phone>?body=…` for every contact
#[derive(Debug, Clone)]
pub struct SmsChannel {
    opener: Arc<dyn LinkOpener>,
}

impl SmsChannel {
    /// Channel opening links through `opener`
    #[must_use]
    pub fn new(opener: Arc<dyn LinkOpener>) -> Self {
        Self { opener }
    }

    /// SMS compose link
    #[must_use]
    pub fn link(phone: &PhoneNumber, message: &str) -> String {
        format!("sms:{}?body={}", phone.as_str(), urlencoding::encode(message))
    }
}

#[async_trait]
impl AlertChannel for SmsChannel {
    fn name(&self) -> &'static str {
        "sms"
    }

    async fn deliver(&self, payload: &AlertPayload, contacts: &[PhoneNumber]) -> Result<(), ChannelError> {
        per_contact(self.name(), self.opener.as_ref(), contacts, |phone| {
            Self::link(phone, &payload.human_message)
        })
    }
}

/// Hands the location link (or the bare message) to a share target
#[derive(Debug, Clone)]
pub struct ShareChannel {
    opener: Arc<dyn LinkOpener>,
}

impl ShareChannel {
    /// Channel opening links through `opener`
    #[must_use]
    pub fn new(opener: Arc<dyn LinkOpener>) -> Self {
        Self { opener }
    }
}

#[async_trait]
impl AlertChannel for ShareChannel {
    fn name(&self) -> &'static str {
        "share"
    }

    async fn deliver(&self, payload: &AlertPayload, _contacts: &[PhoneNumber]) -> Result<(), ChannelError> {
        let target = payload
            .coordinates
            .map_or_else(|| payload.human_message.clone(), |c| c.share_link());
        self.opener
            .open(&target)
            .map_err(|reason| ChannelError::Delivery {
                channel: self.name(),
                reason,
            })
    }
}

fn per_contact(
    channel: &'static str,
    opener: &dyn LinkOpener,
    contacts: &[PhoneNumber],
    link: impl Fn(&PhoneNumber) -> String,
) -> Result<(), ChannelError> {
    if contacts.is_empty() {
        return Err(ChannelError::NoRecipients { channel });
    }
    // Try everyone; report the first refusal.
    let mut first_error = None;
    for phone in contacts {
        if let Err(reason) = opener.open(&link(phone)) {
            tracing::warn!(channel, %phone, %reason, "alert link refused");
            first_error.get_or_insert(ChannelError::Delivery { channel, reason });
        }
    }
    first_error.map_or(Ok(()), Err)
}

/// What happened during one dispatch
#[derive(Debug, Clone)]
pub struct DispatchReport {
    /// Payload sent on every channel
    pub payload: AlertPayload,
    /// Why the location is missing, if it is
    pub location_error: Option<LocationError>,
    /// Number of contacts known at dispatch time
    pub contacts: usize,
    /// Channels that accepted the alert
    pub delivered: Vec<&'static str>,
    /// Channels that failed, with the reason
    pub failed: Vec<(&'static str, ChannelError)>,
}

impl DispatchReport {
    /// Whether at least one channel accepted the alert
    #[inline]
    #[must_use]
    pub fn reached_anyone(&self) -> bool {
        !self.delivered.is_empty()
    }
}

/// Composes alerts and fans them out
#[derive(Debug, Clone)]
pub struct AlertDispatcher {
    context: SafetyContext,
    location: Arc<dyn LocationSource>,
    contacts: Arc<dyn ContactSource>,
    channels: Vec<Arc<dyn AlertChannel>>,
    sink: Arc<dyn NotificationSink>,
    tasks: Arc<NotificationTasks>,
    clock: Arc<dyn Clock>,
    location_timeout: Duration,
}

impl AlertDispatcher {
    /// Dispatcher with no channels and the default location budget
    #[must_use]
    pub fn new(
        context: SafetyContext,
        location: Arc<dyn LocationSource>,
        contacts: Arc<dyn ContactSource>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            context,
            location,
            contacts,
            channels: Vec::new(),
            sink,
            tasks: Arc::new(NotificationTasks::new()),
            clock: Arc::new(SystemClock),
            location_timeout: DEFAULT_LOCATION_TIMEOUT,
        }
    }

    /// Add a channel
    #[must_use]
    pub fn with_channel(mut self, channel: Arc<dyn AlertChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    /// With location budget
    #[must_use]
    pub fn with_location_timeout(mut self, timeout: Duration) -> Self {
        self.location_timeout = timeout;
        self
    }

    /// With clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Backend calls spawned by this dispatcher and its timer
    #[inline]
    #[must_use]
    pub fn tasks(&self) -> &Arc<NotificationTasks> {
        &self.tasks
    }

    /// Wait up to `budget` for spawned backend calls; returns how many remain
    pub async fn flush(&self, budget: Duration) -> usize {
        self.tasks.flush(budget).await
    }

    /// Configured channels
    #[must_use]
    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Dispatch on behalf of the current user (anonymous if none)
    pub async fn dispatch(&self, reason: AlertReason) -> DispatchReport {
        let user = self
            .context
            .effective_user()
            .unwrap_or_else(UserId::anonymous);
        self.dispatch_for(user, reason).await
    }

    /// Dispatch on behalf of `user`; never fails
    pub async fn dispatch_for(&self, user: UserId, reason: AlertReason) -> DispatchReport {
        let (location, contacts) = futures::join!(
            acquire_within(self.location.as_ref(), self.location_timeout),
            self.contacts.contacts(&user),
        );

        let (coordinates, location_error) = match location {
            Ok(c) => (Some(c), None),
            Err(e) => {
                tracing::warn!(error = %e, "alert going out without location");
                (None, Some(e))
            }
        };

        let payload = AlertPayload::compose(user.clone(), reason, coordinates, self.clock.wall());
        spawn_sos(&self.tasks, &self.sink, user, coordinates);

        let outcomes = join_all(self.channels.iter().map(|channel| {
            let payload = &payload;
            let contacts = contacts.as_slice();
            async move { (channel.name(), channel.deliver(payload, contacts).await) }
        }))
        .await;

        let mut delivered = Vec::new();
        let mut failed = Vec::new();
        for (name, outcome) in outcomes {
            match outcome {
                Ok(()) => delivered.push(name),
                Err(e) => {
                    tracing::warn!(channel = name, error = %e, "alert channel failed");
                    failed.push((name, e));
                }
            }
        }

        tracing::info!(
            ?reason,
            located = coordinates.is_some(),
            contacts = contacts.len(),
            delivered = delivered.len(),
            failed = failed.len(),
            "alert dispatched"
        );

        DispatchReport {
            payload,
            location_error,
            contacts: contacts.len(),
            delivered,
            failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contacts::StaticContacts;
    use crate::context::IdentityPolicy;
    use crate::location::{FixedLocation, LastKnownLocation, UnavailableLocation};
    use crate::notify::NoopSink;
    use crate::types::Coordinates;

    fn phone(raw: &str) -> PhoneNumber {
        PhoneNumber::parse(raw).unwrap()
    }

    fn dispatcher(location: Arc<dyn LocationSource>, contacts: Vec<PhoneNumber>) -> AlertDispatcher {
        let (ctx, _handle) = SafetyContext::new(IdentityPolicy::AllowAnonymous);
        AlertDispatcher::new(
            ctx,
            location,
            Arc::new(StaticContacts(contacts)),
            Arc::new(NoopSink),
        )
    }

    #[test]
    fn links_are_url_encoded() {
        let link = WhatsAppChannel::link("🚨 help me: a&b");
        assert!(link.starts_with("https://wa.me/?text=%F0%9F%9A%A8%20help%20me%3A%20a%26b"));

        let sms = SmsChannel::link(&phone("+919876543210"), "hi there");
        assert_eq!(sms, "sms:+919876543210?body=hi%20there");

        let wa = WhatsAppContactsChannel::link(&phone("+919876543210"), "x");
        assert_eq!(wa, "https://wa.me/919876543210?text=x");
    }

    #[tokio::test]
    async fn one_failing_channel_does_not_stop_others() {
        let mut broken = MockAlertChannel::new();
        broken.expect_name().return_const("broken");
        broken.expect_deliver().times(1).returning(|_, _| {
            Err(ChannelError::Delivery {
                channel: "broken",
                reason: "app missing".into(),
            })
        });

        let mut working = MockAlertChannel::new();
        working.expect_name().return_const("working");
        working
            .expect_deliver()
            .withf(|payload, contacts| {
                payload.human_message.contains("maps.google.com") && contacts.len() == 1
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let report = dispatcher(
            Arc::new(FixedLocation(Coordinates::new(12.97, 77.59))),
            vec![phone("+919876543210")],
        )
        .with_channel(Arc::new(broken))
        .with_channel(Arc::new(working))
        .dispatch(AlertReason::Manual)
        .await;

        assert_eq!(report.delivered, vec!["working"]);
        assert_eq!(report.failed.len(), 1);
        assert!(report.reached_anyone());
        assert!(report.payload.origin_user_id.is_anonymous());
    }

    #[derive(Debug, Default)]
    struct WalkingDevice(std::sync::atomic::AtomicU32);

    #[async_trait]
    impl LocationSource for WalkingDevice {
        async fn current(&self) -> Result<Coordinates, LocationError> {
            let step = self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(Coordinates::new(12.0 + f64::from(step), 77.5))
        }
    }

    #[tokio::test]
    async fn each_alert_carries_the_position_at_dispatch() {
        let location = Arc::new(LastKnownLocation::new(Arc::new(WalkingDevice::default())));
        let dispatcher = dispatcher(location, Vec::new());

        let first = dispatcher.dispatch(AlertReason::Manual).await;
        let second = dispatcher.dispatch(AlertReason::Manual).await;
        assert_eq!(first.payload.coordinates, Some(Coordinates::new(12.0, 77.5)));
        assert_eq!(second.payload.coordinates, Some(Coordinates::new(13.0, 77.5)));
    }

    #[tokio::test]
    async fn missing_location_degrades_to_message_only() {
        let report = dispatcher(Arc::new(UnavailableLocation), Vec::new())
            .with_channel(Arc::new(WhatsAppChannel::new(Arc::new(LoggingOpener))))
            .dispatch(AlertReason::TimerExpired)
            .await;

        assert!(report.payload.coordinates.is_none());
        assert!(matches!(report.location_error, Some(LocationError::Unavailable(_))));
        assert_eq!(report.delivered, vec!["whatsapp"]);
    }

    #[tokio::test]
    async fn per_contact_channels_need_recipients() {
        let report = dispatcher(Arc::new(UnavailableLocation), Vec::new())
            .with_channel(Arc::new(SmsChannel::new(Arc::new(LoggingOpener))))
            .dispatch(AlertReason::Manual)
            .await;

        assert!(!report.reached_anyone());
        assert_eq!(
            report.failed[0].1,
            ChannelError::NoRecipients { channel: "sms" }
        );
    }
}
