//! RakshaNet Safety - escalation timer and emergency alerts
//!
//! The user arms a countdown before a risky activity. Missing the check-in
//! raises an alert that shares the live location over every configured
//! channel. The local outcome never depends on the backend:
//! - [`EscalationTimer`] owns arm / countdown / check-in / expire
//! - [`AlertDispatcher`] composes the alert and fans it out
//! - [`NotificationSink`] mirrors events to the backend, fire-and-forget
//!
//! # Example
//!
//! ```rust,ignore
//! use raksha_safety::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (ctx, identity) = SafetyContext::new(IdentityPolicy::Required);
//! identity.sign_in(Identity::new(Some("Asha".into()), "asha@raksha.test"));
//!
//! let dispatcher = AlertDispatcher::new(
//!     ctx.clone(),
//!     Arc::new(UnavailableLocation),
//!     Arc::new(StaticContacts::default()),
//!     Arc::new(NoopSink),
//! );
//! let timer = EscalationTimer::new(ctx, Arc::new(NoopSink), dispatcher);
//!
//! let session = timer.arm(60)?;
//! timer.check_in(session.id())?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod activity;
pub mod alert;
pub mod backend;
pub mod clock;
pub mod config;
pub mod contacts;
pub mod context;
pub mod error;
pub mod location;
pub mod log;
pub mod notify;
pub mod state_machine;
pub mod timer;
pub mod types;

pub use activity::{ActivityEntry, ActivityLog, Severity, UserStats};
pub use alert::{
    AlertChannel, AlertDispatcher, DispatchReport, LinkOpener, LoggingOpener, ShareChannel,
    SmsChannel, WhatsAppChannel, WhatsAppContactsChannel,
};
pub use backend::{BackendClient, BackendConfig, BackendNotifier};
pub use clock::{AnchoredClock, Clock, SystemClock};
pub use config::{ChannelKind, EscalationConfig};
pub use contacts::{ContactBook, ContactSource, PhoneNumber, StaticContacts};
pub use context::{IdentityHandle, IdentityPolicy, SafetyContext};
pub use error::{
    ActivityError, BackendError, ChannelError, ContactError, EscalationError, LocationError,
    SafetyConfigError, SafetyError, SafetyResult,
};
pub use location::{FixedLocation, LastKnownLocation, LocationSource, MapSink, UnavailableLocation};
pub use log::EscalationLog;
pub use notify::{timer_minutes, NoopSink, NotificationSink, NotificationTasks};
pub use timer::{EscalationTimer, SessionHandle, SessionProgress};
pub use types::{
    AlertPayload, AlertReason, Coordinates, EscalationEvent, EscalationSession, EscalationState,
    EventKind, Identity, SessionId, UserId,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the safety core
    pub use crate::{
        AlertDispatcher, AlertReason, Coordinates, EscalationState, EscalationTimer, Identity,
        IdentityPolicy, NoopSink, NotificationSink, SafetyContext, SessionHandle, StaticContacts,
        UnavailableLocation, UserId,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
