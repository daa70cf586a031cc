//! Per-tag admissibility
//!
//! Each function declares when it may be sent relative to the observed
//! authorization state. A call that is not admissible fails before it
//! reaches the transport.

use crate::auth::AuthorizationState;
use serde::{Deserialize, Serialize};

/// When a function may be sent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Admission {
    /// Any state except `Closed`
    #[default]
    Always,
    /// Only while the state is unknown or waiting for parameters
    BeforeInit,
    /// Only in one of the listed states
    InStates(Vec<AuthorizationState>),
}

impl Admission {
    /// Admissible only in `Ready`
    pub fn ready() -> Self {
        Self::InStates(vec![AuthorizationState::Ready])
    }

    /// Admissible in the given states
    pub fn in_states(states: impl IntoIterator<Item = AuthorizationState>) -> Self {
        Self::InStates(states.into_iter().collect())
    }

    /// Whether a call is admissible given the observed state (`None` when
    /// no state has been announced yet).
    pub fn admits(&self, state: Option<AuthorizationState>) -> bool {
        if state == Some(AuthorizationState::Closed) {
            return false;
        }
        match self {
            Self::Always => true,
            Self::BeforeInit => matches!(state, None | Some(AuthorizationState::WaitParameters)),
            Self::InStates(states) => state.is_some_and(|s| states.contains(&s)),
        }
    }
}
