//! Core transport trait definitions

use crate::{TransportError, TransportResult};
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Inbound frames in arrival order. The stream ending means the engine
/// connection is gone.
pub type InboundStream = BoxStream<'static, String>;

/// Boundary to the external engine.
///
/// Frames are serialized JSON objects. Outbound sends are fire-and-forget;
/// everything the engine emits (responses and updates alike) arrives on the
/// single inbound stream, which exactly one reader may take.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Hand one serialized request to the engine
    async fn send(&self, frame: String) -> TransportResult<()>;

    /// Take the inbound stream. Only the first call succeeds; later calls
    /// return [`TransportError::InboundTaken`].
    fn take_inbound(&self) -> TransportResult<InboundStream>;

    /// Answer a local request synchronously, bypassing the inbound stream
    fn execute(&self, frame: &str) -> TransportResult<String> {
        let _ = frame;
        Err(TransportError::unsupported("execute"))
    }

    /// Release the connection. Sends after close fail with
    /// [`TransportError::Disconnected`].
    async fn close(&self) -> TransportResult<()>;

    /// Get transport type identifier
    fn transport_type(&self) -> &'static str;
}
