//! # Tether Core - Layer 1: Protocol Model
//!
//! Pure data model for driving an external messaging engine over a
//! tagged-union control protocol. Nothing in this crate performs I/O.
//!
//! ## Key Components
//!
//! - [`TaggedObject`]: a discriminated object (`@type` plus named fields)
//! - [`wire`]: JSON framing with the `@extra` correlation token
//! - [`TypeRegistry`]: tag → field shape and result shape, with nested
//!   polymorphic validation
//! - [`catalog`]: the declared protocol surface and its built-in schemas
//! - [`AuthorizationState`]: the session lifecycle replicated from updates
//! - [`Admission`]: per-tag admissibility against the observed state
//! - [`reactive::Dynamic`]: single-writer snapshot with change notification

pub mod admission;
pub mod auth;
pub mod catalog;
pub mod errors;
pub mod object;
pub mod reactive;
pub mod registry;
pub mod schema;
pub mod wire;

pub use admission::Admission;
pub use auth::{AuthorizationState, Phase, UPDATE_AUTHORIZATION_STATE};
pub use errors::{CoreError, Result, SchemaError};
pub use object::{Fields, TaggedObject};
pub use registry::{RegistryBuilder, TypeRegistry};
pub use schema::{FieldSpec, FieldType, Schema, SchemaKind};
pub use wire::{EngineFailure, IncomingMessage, Token};
