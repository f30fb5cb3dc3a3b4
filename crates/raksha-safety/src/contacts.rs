//! Emergency contacts

use crate::backend::{BackendClient, MessageReply};
use crate::context::SafetyContext;
use crate::error::ContactError;
use crate::types::UserId;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

static E164: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+[0-9]{7,15}$").expect("phone regex is valid"));

/// International phone number, normalized to `+<digits>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Validate and normalize user input
    ///
    /// Spaces, dashes, dots and parentheses are dropped; the result must be
    /// a `+` followed by 7 to 15 digits.
    ///
    /// # Errors
    /// `ContactError::InvalidPhone` describing the first problem
    pub fn parse(raw: &str) -> Result<Self, ContactError> {
        let trimmed = raw.trim();
        if !trimmed.starts_with('+') {
            return Err(ContactError::InvalidPhone {
                phone: raw.to_string(),
                reason: "must include the country code, e.g. +91xxxxxxxxxx",
            });
        }
        let normalized: String = trimmed
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
            .collect();
        if !E164.is_match(&normalized) {
            return Err(ContactError::InvalidPhone {
                phone: raw.to_string(),
                reason: "must be + followed by 7 to 15 digits",
            });
        }
        Ok(Self(normalized))
    }

    /// Normalized form, `+` included
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Digits only, as used in `wa.me` links
    #[inline]
    #[must_use]
    pub fn digits(&self) -> &str {
        &self.0[1..]
    }
}

impl Display for PhoneNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PhoneNumber {
    type Err = ContactError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = ContactError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PhoneNumber> for String {
    fn from(phone: PhoneNumber) -> Self {
        phone.0
    }
}

/// Source of emergency contacts consulted at dispatch time
#[async_trait]
pub trait ContactSource: Send + Sync + Debug {
    /// Current contacts of `user`; an unreachable store yields whatever is
    /// known
    async fn contacts(&self, user: &UserId) -> Vec<PhoneNumber>;
}

/// `GET /contacts/{userId}` reply
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct ContactList {
    /// Raw phone numbers as stored
    pub contacts: Vec<String>,
    /// Number of contacts
    pub count: usize,
    /// Server time of the read
    pub fetched_at: Option<String>,
}

/// Backend-backed contact list with an in-memory snapshot for offline use
#[derive(Debug)]
pub struct ContactBook {
    backend: Arc<BackendClient>,
    context: SafetyContext,
    known: RwLock<Vec<PhoneNumber>>,
}

impl ContactBook {
    /// New book; nothing known until the first refresh
    #[must_use]
    pub fn new(backend: Arc<BackendClient>, context: SafetyContext) -> Self {
        Self {
            backend,
            context,
            known: RwLock::new(Vec::new()),
        }
    }

    /// Last successfully fetched list
    #[must_use]
    pub fn known(&self) -> Vec<PhoneNumber> {
        self.known.read().clone()
    }

    /// Fetch the signed-in user's list and replace the snapshot
    ///
    /// # Errors
    /// `ContactError::AuthRequired` with no user, or the backend failure
    pub async fn refresh(&self) -> Result<Vec<PhoneNumber>, ContactError> {
        let user = self.context.user_id().ok_or(ContactError::AuthRequired)?;
        self.refresh_for(&user).await
    }

    /// Fetch `user`'s list and replace the snapshot
    ///
    /// Entries that fail validation are skipped.
    ///
    /// # Errors
    /// `ContactError::AuthRequired` for the anonymous user, or the backend
    /// failure
    pub async fn refresh_for(&self, user: &UserId) -> Result<Vec<PhoneNumber>, ContactError> {
        if user.is_anonymous() {
            return Err(ContactError::AuthRequired);
        }
        let list: ContactList = self.backend.get(&["contacts", user.as_str()]).await?;

        let phones: Vec<PhoneNumber> = list
            .contacts
            .iter()
            .filter_map(|raw| match PhoneNumber::parse(raw) {
                Ok(p) => Some(p),
                Err(e) => {
                    tracing::debug!(error = %e, "skipping stored contact");
                    None
                }
            })
            .collect();
        *self.known.write() = phones.clone();
        Ok(phones)
    }

    /// Validate and save a contact
    ///
    /// # Errors
    /// Validation failure before any network call, or the backend failure
    pub async fn add(&self, raw: &str) -> Result<MessageReply, ContactError> {
        let phone = PhoneNumber::parse(raw)?;
        let user = self.context.user_id().ok_or(ContactError::AuthRequired)?;
        let reply = self.backend.add_contact(&user, phone.as_str()).await?;

        let mut known = self.known.write();
        if !known.contains(&phone) {
            known.push(phone);
        }
        Ok(reply)
    }

    /// Remove a contact
    ///
    /// # Errors
    /// Validation failure before any network call, or the backend failure
    pub async fn remove(&self, raw: &str) -> Result<MessageReply, ContactError> {
        let phone = PhoneNumber::parse(raw)?;
        let user = self.context.user_id().ok_or(ContactError::AuthRequired)?;
        let reply = self.backend.delete_contact(&user, phone.as_str()).await?;
        self.known.write().retain(|p| p != &phone);
        Ok(reply)
    }
}

#[async_trait]
impl ContactSource for ContactBook {
    async fn contacts(&self, user: &UserId) -> Vec<PhoneNumber> {
        match self.refresh_for(user).await {
            Ok(phones) => phones,
            Err(e) => {
                let known = self.known();
                tracing::warn!(error = %e, known = known.len(), "using last known contacts");
                known
            }
        }
    }
}

/// Fixed list, for configuration-provided contacts
#[derive(Debug, Clone, Default)]
pub struct StaticContacts(pub Vec<PhoneNumber>);

#[async_trait]
impl ContactSource for StaticContacts {
    async fn contacts(&self, _user: &UserId) -> Vec<PhoneNumber> {
        self.0.clone()
    }
}
