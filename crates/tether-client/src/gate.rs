//! State Gate
//!
//! Replicates the engine's authorization state from
//! `updateAuthorizationState` pushes and rejects calls that the current
//! state does not admit. The gate is the only writer of the state snapshot;
//! it runs as a permanent router subscriber inside the dispatch loop.

use crate::errors::{ClientError, Result};
use std::sync::Arc;
use tether_core::reactive::{Dynamic, Subscription};
use tether_core::{AuthorizationState, Schema, TaggedObject, TypeRegistry};

/// Result of observing an authorization update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The state changed
    Entered {
        /// Previous state, `None` if none was known
        from: Option<AuthorizationState>,
        /// New state
        to: AuthorizationState,
    },
    /// The current state was re-announced
    Unchanged(AuthorizationState),
    /// The announced state would move the lifecycle backwards; ignored
    Rejected {
        /// State kept
        from: AuthorizationState,
        /// State refused
        to: AuthorizationState,
    },
}

/// Authorization state tracker and admissibility check
pub struct StateGate {
    state: Dynamic<Option<AuthorizationState>>,
    registry: Arc<TypeRegistry>,
}

impl StateGate {
    /// Create a gate with an unknown initial state
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            state: Dynamic::new(None),
            registry,
        }
    }

    /// Observed state, `None` until the engine announces one
    pub fn current(&self) -> Option<AuthorizationState> {
        self.state.get()
    }

    /// Observe future state changes
    pub fn subscribe(&self) -> Subscription<Option<AuthorizationState>> {
        self.state.subscribe()
    }

    /// Whether `tag` may be sent now. Unknown tags are never allowed.
    pub fn is_allowed(&self, tag: &str) -> bool {
        self.registry
            .get(tag)
            .is_some_and(|schema| self.admits(schema))
    }

    /// Fail with `StateError` unless `schema` is admissible now
    pub fn check(&self, schema: &Schema) -> Result<()> {
        if self.admits(schema) {
            Ok(())
        } else {
            Err(ClientError::State {
                tag: schema.tag().to_string(),
                state: self.current(),
            })
        }
    }

    /// Apply an `updateAuthorizationState` push. Other updates, and state
    /// objects the model does not know, yield `None`.
    pub fn observe(&self, update: &TaggedObject) -> Option<Transition> {
        let next = AuthorizationState::from_update(update)?;
        let transition = match self.current() {
            Some(current) if current == next => Transition::Unchanged(current),
            Some(current) if !current.can_transition_to(next) => Transition::Rejected {
                from: current,
                to: next,
            },
            from => {
                self.state.set(Some(next));
                Transition::Entered { from, to: next }
            }
        };

        match transition {
            Transition::Entered { from, to } => {
                tracing::info!(
                    from = from.map_or("unknown", AuthorizationState::tag),
                    to = %to,
                    "authorization state changed"
                );
            }
            Transition::Unchanged(state) => {
                tracing::debug!(state = %state, "authorization state re-announced");
            }
            Transition::Rejected { from, to } => {
                tracing::warn!(from = %from, to = %to, "ignoring authorization state regression");
            }
        }
        Some(transition)
    }

    fn admits(&self, schema: &Schema) -> bool {
        schema
            .admission()
            .map_or(true, |admission| admission.admits(self.current()))
    }
}
