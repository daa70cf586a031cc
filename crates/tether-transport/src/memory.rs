//! In-memory transport for testing and local communication
//!
//! [`MemoryTransport::pair`] returns the client-side transport and an
//! [`EngineHandle`] that plays the engine: it reads outbound requests,
//! scripts inbound frames, and keeps a log of every frame the client sent.

use crate::{InboundStream, Transport, TransportError, TransportResult};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tether_core::wire::{self, Token};
use tether_core::TaggedObject;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

type Executor = Arc<dyn Fn(TaggedObject) -> TaggedObject + Send + Sync>;

#[derive(Default)]
struct Shared {
    sent: Mutex<Vec<String>>,
    executor: RwLock<Option<Executor>>,
    closed: AtomicBool,
}

/// Client side of an in-memory engine connection
pub struct MemoryTransport {
    outbound: mpsc::UnboundedSender<String>,
    inbound: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    shared: Arc<Shared>,
}

/// Engine side of an in-memory connection
pub struct EngineHandle {
    requests: mpsc::UnboundedReceiver<String>,
    inbound: Option<mpsc::UnboundedSender<String>>,
    shared: Arc<Shared>,
}

impl MemoryTransport {
    /// Create a connected transport and engine handle.
    ///
    /// The transport holds no inbound sender of its own, so dropping or
    /// disconnecting the handle ends the inbound stream.
    pub fn pair() -> (Self, EngineHandle) {
        let (outbound, requests) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());

        let transport = Self {
            outbound,
            inbound: Mutex::new(Some(inbound_rx)),
            shared: shared.clone(),
        };
        let engine = EngineHandle {
            requests,
            inbound: Some(inbound_tx),
            shared,
        };
        (transport, engine)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, frame: String) -> TransportResult<()> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(TransportError::Disconnected);
        }
        self.outbound
            .send(frame.clone())
            .map_err(|_| TransportError::Disconnected)?;
        self.shared.sent.lock().push(frame);
        Ok(())
    }

    fn take_inbound(&self) -> TransportResult<InboundStream> {
        self.inbound
            .lock()
            .take()
            .map(|rx| UnboundedReceiverStream::new(rx).boxed())
            .ok_or(TransportError::InboundTaken)
    }

    fn execute(&self, frame: &str) -> TransportResult<String> {
        let Some(executor) = self.shared.executor.read().clone() else {
            return Err(TransportError::unsupported("execute"));
        };
        let (_, request) =
            wire::decode_request(frame).map_err(|err| TransportError::send(err.to_string()))?;
        wire::encode_object(&executor(request)).map_err(|err| TransportError::send(err.to_string()))
    }

    async fn close(&self) -> TransportResult<()> {
        self.shared.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn transport_type(&self) -> &'static str {
        "memory"
    }
}

impl EngineHandle {
    /// Next raw frame sent by the client, or `None` once the client side is
    /// dropped.
    pub async fn next_frame(&mut self) -> Option<String> {
        self.requests.recv().await
    }

    /// Next raw frame if one is already queued
    pub fn try_next_frame(&mut self) -> Option<String> {
        self.requests.try_recv().ok()
    }

    /// Next correlated request, decoded. Frames that do not decode or carry
    /// no token are skipped.
    pub async fn next_request(&mut self) -> Option<(Token, TaggedObject)> {
        while let Some(frame) = self.next_frame().await {
            match wire::decode_request(&frame) {
                Ok((Some(token), request)) => return Some((token, request)),
                Ok((None, request)) => {
                    tracing::warn!(tag = %request.tag(), "engine received request without token");
                }
                Err(err) => tracing::warn!(error = %err, "engine received undecodable frame"),
            }
        }
        None
    }

    /// Every frame the client sent, in order
    pub fn sent_frames(&self) -> Vec<String> {
        self.shared.sent.lock().clone()
    }

    /// Number of frames the client sent
    pub fn sent_count(&self) -> usize {
        self.shared.sent.lock().len()
    }

    /// Deliver a raw inbound frame. Returns `false` once disconnected.
    pub fn push(&self, frame: impl Into<String>) -> bool {
        self.inbound
            .as_ref()
            .is_some_and(|tx| tx.send(frame.into()).is_ok())
    }

    /// Answer a request with a result object
    pub fn reply(&self, token: Token, result: &TaggedObject) -> bool {
        wire::encode_request(token, result).is_ok_and(|frame| self.push(frame))
    }

    /// Answer a request with an engine error
    pub fn fail(&self, token: Token, code: i32, message: &str) -> bool {
        self.reply(token, &wire::error_object(code, message))
    }

    /// Push an un-correlated update
    pub fn update(&self, update: &TaggedObject) -> bool {
        wire::encode_object(update).is_ok_and(|frame| self.push(frame))
    }

    /// Install the handler answering local (synchronous) requests
    pub fn set_executor(&self, executor: impl Fn(TaggedObject) -> TaggedObject + Send + Sync + 'static) {
        *self.shared.executor.write() = Some(Arc::new(executor));
    }

    /// Drop the inbound side, ending the client's inbound stream
    pub fn disconnect(&mut self) {
        self.inbound = None;
    }

    /// Whether the client closed its side
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}
