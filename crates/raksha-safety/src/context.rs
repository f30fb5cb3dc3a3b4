//! Identity context passed to every safety component
//!
//! The identity provider publishes sign-in changes through an
//! [`IdentityHandle`]; components read the current user from their
//! [`SafetyContext`] at the moment they need it.

use crate::types::{Identity, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Whether escalation requires a signed-in user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityPolicy {
    /// Refuse to arm without a user
    #[default]
    Required,
    /// Fall back to the anonymous user id
    AllowAnonymous,
}

/// Writer side of the identity channel, owned by the identity provider
#[derive(Debug)]
pub struct IdentityHandle {
    tx: watch::Sender<Option<Identity>>,
}

impl IdentityHandle {
    /// Record a sign-in
    pub fn sign_in(&self, identity: Identity) {
        tracing::info!(user = %identity.email, "signed in");
        self.tx.send_replace(Some(identity));
    }

    /// Record a sign-out
    pub fn sign_out(&self) {
        if self.tx.send_replace(None).is_some() {
            tracing::info!("signed out");
        }
    }
}

/// Read side: current identity plus policy
#[derive(Debug, Clone)]
pub struct SafetyContext {
    identity: watch::Receiver<Option<Identity>>,
    policy: IdentityPolicy,
}

impl SafetyContext {
    /// New context with no user signed in
    #[must_use]
    pub fn new(policy: IdentityPolicy) -> (Self, IdentityHandle) {
        let (tx, rx) = watch::channel(None);
        (
            Self {
                identity: rx,
                policy,
            },
            IdentityHandle { tx },
        )
    }

    /// Context with `identity` already signed in
    #[must_use]
    pub fn signed_in(identity: Identity, policy: IdentityPolicy) -> (Self, IdentityHandle) {
        let (ctx, handle) = Self::new(policy);
        handle.sign_in(identity);
        (ctx, handle)
    }

    /// Identity policy in force
    #[inline]
    #[must_use]
    pub fn policy(&self) -> IdentityPolicy {
        self.policy
    }

    /// Currently signed-in identity
    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.identity.borrow().clone()
    }

    /// Signed-in user id, if any
    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.identity.borrow().as_ref().map(Identity::user_id)
    }

    /// User id under the identity policy; `None` means the caller must
    /// refuse the operation
    #[must_use]
    pub fn effective_user(&self) -> Option<UserId> {
        match (self.user_id(), self.policy) {
            (Some(user), _) => Some(user),
            (None, IdentityPolicy::AllowAnonymous) => Some(UserId::anonymous()),
            (None, IdentityPolicy::Required) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_policy_refuses_without_user() {
        let (ctx, handle) = SafetyContext::new(IdentityPolicy::Required);
        assert_eq!(ctx.effective_user(), None);

        handle.sign_in(Identity::new(None, "asha@raksha.test"));
        assert_eq!(ctx.effective_user().unwrap().as_str(), "asha@raksha.test");

        handle.sign_out();
        assert_eq!(ctx.effective_user(), None);
    }

    #[test]
    fn anonymous_policy_falls_back() {
        let (ctx, _handle) = SafetyContext::new(IdentityPolicy::AllowAnonymous);
        assert!(ctx.effective_user().unwrap().is_anonymous());
    }
}
