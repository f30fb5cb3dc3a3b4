//! Escalation state transitions
//!
//! ```text
//! Idle ──arm──► Armed ──check_in──► CheckedIn
//!                 └────expiry────► Expired
//! ```

use crate::error::EscalationError;
use crate::types::EscalationState;

/// Validate a single transition
///
/// # Errors
/// `EscalationError::IllegalTransition` for anything outside the graph
pub fn validate_transition(
    from: EscalationState,
    to: EscalationState,
) -> Result<(), EscalationError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(EscalationError::IllegalTransition { from, to })
    }
}

/// States reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: EscalationState) -> &'static [EscalationState] {
    use EscalationState::{Armed, CheckedIn, Expired, Idle};
    match from {
        Idle => &[Armed],
        Armed => &[CheckedIn, Expired],
        CheckedIn | Expired => &[],
    }
}
