//! # Tether Transport - Layer 2: Engine Boundary
//!
//! The [`Transport`] trait is everything the client runtime needs from the
//! outside world: fire-and-forget sends, one inbound frame stream, and an
//! optional synchronous path for local requests. Framing, sockets and the
//! engine process itself live behind it.
//!
//! [`MemoryTransport`] connects a client to an [`EngineHandle`] in the same
//! process, for tests and embedding.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{TransportError, TransportResult};
pub use memory::{EngineHandle, MemoryTransport};
pub use traits::{InboundStream, Transport};
