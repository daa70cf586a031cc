//! # Tether Client - Layer 3: Runtime
//!
//! Turns "send a tagged object, eventually get a correlated typed result,
//! and also receive unsolicited updates on the same channel" into a safe,
//! ordered, typed API.
//!
//! ## Key Components
//!
//! - [`Client`]: the upward API (`call`, `subscribe`, authorization state)
//! - [`correlation`]: token issue, pending-call table, deadlines, cancellation
//! - [`router`]: update fan-out with tag and entity filters
//! - [`gate`]: authorization state replica and per-tag admissibility
//! - [`dispatch`]: the single inbound reader
//! - [`functions`]: typed request structs over the generic call path
//!
//! ```rust,ignore
//! let (transport, engine) = MemoryTransport::pair();
//! let client = Client::new(transport, ClientConfig::default())?;
//! let me: User = client.send(&GetMe {}).await?;
//! ```

pub mod client;
pub mod config;
pub mod correlation;
pub mod dispatch;
pub mod errors;
pub mod functions;
pub mod gate;
pub mod router;

pub use client::Client;
pub use config::{CallOptions, ClientConfig, Deadline};
pub use correlation::{CancelHandle, PendingCall};
pub use dispatch::StatsSnapshot;
pub use errors::{ClientError, Result};
pub use functions::RemoteFunction;
pub use router::{SubscriptionHandle, UpdateFilter, UpdateStream};

pub use tether_core::{AuthorizationState, TaggedObject};
