//! Authorization state machine
//!
//! The engine's session lifecycle, replicated client-side purely from
//! `updateAuthorizationState` pushes. States are grouped into phases that
//! only move forward; within the login phase the engine may move freely
//! (e.g. back from code entry to phone entry).

use crate::object::TaggedObject;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Update tag announcing an authorization state change
pub const UPDATE_AUTHORIZATION_STATE: &str = "updateAuthorizationState";

/// Field of [`UPDATE_AUTHORIZATION_STATE`] carrying the new state object
pub const AUTHORIZATION_STATE_FIELD: &str = "authorization_state";

/// Engine session lifecycle stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthorizationState {
    /// Initialization parameters are required
    WaitParameters,
    /// A phone number (or bot token) is required
    WaitPhoneNumber,
    /// A premium purchase is required before registration
    WaitPremiumPurchase,
    /// An email address is required
    WaitEmailAddress,
    /// An email authentication code is required
    WaitEmailCode,
    /// A login code is required
    WaitCode,
    /// The user must register
    WaitRegistration,
    /// The two-step verification password is required
    WaitPassword,
    /// Another logged-in device must confirm the login link
    WaitOtherDeviceConfirmation,
    /// Authorized and ready for regular requests
    Ready,
    /// Logging out
    LoggingOut,
    /// Releasing resources; only `Closed` may follow
    Closing,
    /// Terminal
    Closed,
}

/// Forward-only grouping of authorization states
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    /// Before initialization parameters are accepted
    Setup,
    /// Any of the login prompts
    Login,
    /// Authorized
    Ready,
    /// Logging out
    LoggingOut,
    /// Shutting down
    Closing,
    /// Terminal
    Closed,
}

impl AuthorizationState {
    /// Every state, in lifecycle order
    pub const ALL: [AuthorizationState; 13] = [
        Self::WaitParameters,
        Self::WaitPhoneNumber,
        Self::WaitPremiumPurchase,
        Self::WaitEmailAddress,
        Self::WaitEmailCode,
        Self::WaitCode,
        Self::WaitRegistration,
        Self::WaitPassword,
        Self::WaitOtherDeviceConfirmation,
        Self::Ready,
        Self::LoggingOut,
        Self::Closing,
        Self::Closed,
    ];

    /// Login prompts, i.e. every state of [`Phase::Login`]
    pub const LOGIN: [AuthorizationState; 8] = [
        Self::WaitPhoneNumber,
        Self::WaitPremiumPurchase,
        Self::WaitEmailAddress,
        Self::WaitEmailCode,
        Self::WaitCode,
        Self::WaitRegistration,
        Self::WaitPassword,
        Self::WaitOtherDeviceConfirmation,
    ];

    /// Wire tag of the state object
    pub fn tag(self) -> &'static str {
        match self {
            Self::WaitParameters => "authorizationStateWaitTdlibParameters",
            Self::WaitPhoneNumber => "authorizationStateWaitPhoneNumber",
            Self::WaitPremiumPurchase => "authorizationStateWaitPremiumPurchase",
            Self::WaitEmailAddress => "authorizationStateWaitEmailAddress",
            Self::WaitEmailCode => "authorizationStateWaitEmailCode",
            Self::WaitCode => "authorizationStateWaitCode",
            Self::WaitRegistration => "authorizationStateWaitRegistration",
            Self::WaitPassword => "authorizationStateWaitPassword",
            Self::WaitOtherDeviceConfirmation => "authorizationStateWaitOtherDeviceConfirmation",
            Self::Ready => "authorizationStateReady",
            Self::LoggingOut => "authorizationStateLoggingOut",
            Self::Closing => "authorizationStateClosing",
            Self::Closed => "authorizationStateClosed",
        }
    }

    /// Parse a state object tag
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|state| state.tag() == tag)
    }

    /// Extract the announced state from an `updateAuthorizationState` push
    pub fn from_update(update: &TaggedObject) -> Option<Self> {
        if update.tag() != UPDATE_AUTHORIZATION_STATE {
            return None;
        }
        update
            .get_object(AUTHORIZATION_STATE_FIELD)
            .and_then(|state| Self::from_tag(state.tag()))
    }

    /// Build the `updateAuthorizationState` push announcing this state
    pub fn to_update(self) -> TaggedObject {
        TaggedObject::new(UPDATE_AUTHORIZATION_STATE).with(
            AUTHORIZATION_STATE_FIELD,
            TaggedObject::new(self.tag()).into_value(),
        )
    }

    /// Lifecycle phase
    pub fn phase(self) -> Phase {
        match self {
            Self::WaitParameters => Phase::Setup,
            Self::Ready => Phase::Ready,
            Self::LoggingOut => Phase::LoggingOut,
            Self::Closing => Phase::Closing,
            Self::Closed => Phase::Closed,
            _ => Phase::Login,
        }
    }

    /// Whether no further transition is possible
    pub fn is_terminal(self) -> bool {
        self == Self::Closed
    }

    /// Whether moving to `next` is consistent with the lifecycle.
    ///
    /// Re-announcing the current state is always accepted. `Closing` only
    /// leads to `Closed`, and nothing leaves `Closed`. Otherwise the phase
    /// must not go backwards.
    pub fn can_transition_to(self, next: Self) -> bool {
        if self == next {
            return true;
        }
        match self {
            Self::Closed => false,
            Self::Closing => next == Self::Closed,
            _ => next.phase() >= self.phase(),
        }
    }
}

impl fmt::Display for AuthorizationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl Serialize for AuthorizationState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        TaggedObject::new(self.tag()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AuthorizationState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let object = TaggedObject::deserialize(deserializer)?;
        Self::from_tag(object.tag()).ok_or_else(|| {
            de::Error::custom(format!("unknown authorization state `{}`", object.tag()))
        })
    }
}
