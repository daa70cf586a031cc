//! Dispatch Loop
//!
//! The single reader of the inbound stream. Every frame is classified and
//! routed exactly once, in arrival order: tokened frames complete pending
//! calls, update frames go to the router, everything else is counted and
//! dropped. When the stream ends, shutdown is requested, or the engine
//! announces `authorizationStateClosed`, every pending call fails with
//! `ConnectionLost` and every subscriber receives one final
//! `authorizationStateClosed` update.

use crate::correlation::{Completion, CorrelationTable, Outcome};
use crate::errors::ClientError;
use crate::router::UpdateRouter;
use futures::StreamExt;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tether_core::wire::{self, IncomingMessage};
use tether_core::{AuthorizationState, TaggedObject, Token};
use tether_transport::InboundStream;
use tokio::sync::oneshot;

/// Counters kept by the dispatch loop
#[derive(Debug, Default)]
pub struct DispatchStats {
    responses: AtomicU64,
    updates: AtomicU64,
    unmatched: AtomicU64,
    late: AtomicU64,
    undecodable: AtomicU64,
    unroutable: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Tokened frames received, matched or not
    pub responses: u64,
    /// Updates published
    pub updates: u64,
    /// Responses whose token was never issued or already completed
    pub unmatched: u64,
    /// Responses for calls that had already expired or been cancelled
    pub late: u64,
    /// Frames that did not decode
    pub undecodable: u64,
    /// Un-tokened frames whose tag is not an update
    pub unroutable: u64,
}

impl DispatchStats {
    /// Read every counter
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            responses: self.responses.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            unmatched: self.unmatched.load(Ordering::Relaxed),
            late: self.late.load(Ordering::Relaxed),
            undecodable: self.undecodable.load(Ordering::Relaxed),
            unroutable: self.unroutable.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

pub(crate) struct DispatchLoop {
    inbound: InboundStream,
    table: Arc<CorrelationTable>,
    router: Arc<UpdateRouter>,
    stats: Arc<DispatchStats>,
    shutdown: oneshot::Receiver<()>,
}

impl DispatchLoop {
    pub(crate) fn new(
        inbound: InboundStream,
        table: Arc<CorrelationTable>,
        router: Arc<UpdateRouter>,
        stats: Arc<DispatchStats>,
        shutdown: oneshot::Receiver<()>,
    ) -> Self {
        Self {
            inbound,
            table,
            router,
            stats,
            shutdown,
        }
    }

    pub(crate) async fn run(mut self) {
        tracing::info!("dispatch loop started");
        let (reason, last) = loop {
            tokio::select! {
                biased;
                _ = &mut self.shutdown => break ("shutdown", None),
                frame = self.inbound.next() => match frame {
                    Some(frame) => {
                        if let ControlFlow::Break(last) = self.route(&frame) {
                            break ("engine closed", Some(last));
                        }
                    }
                    None => break ("inbound stream ended", None),
                },
            }
        };
        let last = last.unwrap_or_else(|| AuthorizationState::Closed.to_update());
        self.terminate(reason, &last);
    }

    /// Breaks with the engine's terminal update once it announces `Closed`.
    fn route(&self, frame: &str) -> ControlFlow<TaggedObject> {
        match wire::decode_incoming(frame) {
            Ok(IncomingMessage::Result { token, object }) => self.deliver(token, Ok(object)),
            Ok(IncomingMessage::Error { token, failure }) => {
                self.deliver(token, Err(ClientError::from(failure)));
            }
            Ok(IncomingMessage::Update(update)) => {
                DispatchStats::bump(&self.stats.updates);
                if AuthorizationState::from_update(&update) == Some(AuthorizationState::Closed) {
                    return ControlFlow::Break(update);
                }
                self.router.publish(&update);
            }
            Ok(IncomingMessage::Unroutable { tag }) => {
                DispatchStats::bump(&self.stats.unroutable);
                tracing::warn!(tag = %tag, "discarding un-tokened frame that is not an update");
            }
            Err(err) => {
                DispatchStats::bump(&self.stats.undecodable);
                tracing::warn!(error = %err, "discarding undecodable frame");
            }
        }
        ControlFlow::Continue(())
    }

    fn deliver(&self, token: Token, outcome: Outcome) {
        DispatchStats::bump(&self.stats.responses);
        match self.table.complete(token, outcome) {
            Completion::Delivered => {}
            Completion::Withdrawn => {
                DispatchStats::bump(&self.stats.late);
                tracing::debug!(token = token.0, "dropping late response");
            }
            Completion::Unmatched => {
                DispatchStats::bump(&self.stats.unmatched);
                tracing::warn!(token = token.0, "response matches no pending call");
            }
        }
    }

    fn terminate(&self, reason: &str, last: &TaggedObject) {
        let failed = self.table.fail_all(ClientError::ConnectionLost);
        self.router.close(last);
        tracing::info!(reason, failed_calls = failed, "dispatch loop stopped");
    }
}
