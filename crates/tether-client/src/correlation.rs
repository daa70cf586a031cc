//! # Correlation Engine
//!
//! Pairs asynchronous responses with their requests by token.
//!
//! ## Responsibilities
//!
//! - Issue fresh, never-reused tokens and hold one waiter per live token
//! - Resolve a waiter exactly once: delivery, expiry, cancellation, or loss
//!   of the connection, whichever happens first
//! - Remember recently withdrawn tokens so late arrivals are told apart
//!   from genuine protocol anomalies
//!
//! The table is guarded by one mutex held only for map operations; nothing
//! here awaits engine I/O while holding it.

use crate::errors::{ClientError, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tether_core::{TaggedObject, Token, TypeRegistry};
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio::time::Instant;

/// How many withdrawn tokens are remembered for late-arrival detection
const WITHDRAWN_MEMORY: usize = 1024;

/// Outcome delivered to a waiter
pub type Outcome = Result<TaggedObject>;

/// What happened to an arrival handed to [`CorrelationTable::complete`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// A waiter was resolved
    Delivered,
    /// The token was recently cancelled or expired; the arrival is late
    Withdrawn,
    /// No such token is pending
    Unmatched,
}

struct Waiter {
    tag: String,
    sender: oneshot::Sender<Outcome>,
    created: Instant,
    deadline: Option<Duration>,
    timer: Option<AbortHandle>,
}

impl Waiter {
    fn resolve(self, outcome: Outcome) {
        if let Some(timer) = self.timer {
            timer.abort();
        }
        // The receiver may already be gone (dropped PendingCall).
        let _ = self.sender.send(outcome);
    }
}

#[derive(Default)]
struct TableState {
    next_token: u64,
    pending: HashMap<Token, Waiter>,
    withdrawn: HashSet<Token>,
    withdrawn_order: VecDeque<Token>,
    closed: bool,
}

impl TableState {
    fn withdraw(&mut self, token: Token) {
        if self.withdrawn.insert(token) {
            self.withdrawn_order.push_back(token);
        }
        while self.withdrawn_order.len() > WITHDRAWN_MEMORY {
            if let Some(old) = self.withdrawn_order.pop_front() {
                self.withdrawn.remove(&old);
            }
        }
    }
}

/// Pending-call table
pub struct CorrelationTable {
    state: Mutex<TableState>,
    limit: usize,
}

impl CorrelationTable {
    /// Create a table holding at most `limit` in-flight calls
    pub fn new(limit: usize) -> Self {
        Self {
            state: Mutex::new(TableState {
                next_token: 1,
                ..TableState::default()
            }),
            limit,
        }
    }

    /// Allocate a token and its waiter.
    ///
    /// Fails with `ConnectionLost` once the table is closed and with
    /// `TooManyPending` when full.
    pub fn register(
        &self,
        tag: &str,
        deadline: Option<Duration>,
    ) -> Result<(Token, oneshot::Receiver<Outcome>)> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(ClientError::ConnectionLost);
        }
        if state.pending.len() >= self.limit {
            return Err(ClientError::TooManyPending { limit: self.limit });
        }

        let token = Token(state.next_token);
        state.next_token += 1;

        let (sender, receiver) = oneshot::channel();
        state.pending.insert(
            token,
            Waiter {
                tag: tag.to_string(),
                sender,
                created: Instant::now(),
                deadline,
                timer: None,
            },
        );
        Ok((token, receiver))
    }

    /// Spawn the deadline timer of a registered call
    pub fn arm_deadline(table: &Arc<Self>, token: Token, after: Duration) {
        let weak = Arc::downgrade(table);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(table) = weak.upgrade() {
                table.expire(token);
            }
        });
        let handle = timer.abort_handle();

        let mut state = table.state.lock();
        match state.pending.get_mut(&token) {
            Some(waiter) => waiter.timer = Some(handle),
            // Resolved before the timer was attached.
            None => handle.abort(),
        }
    }

    /// Resolve the waiter of `token` with an arrival from the engine.
    ///
    /// Absent tokens are a no-op; the first delivery wins.
    pub fn complete(&self, token: Token, outcome: Outcome) -> Completion {
        let waiter = {
            let mut state = self.state.lock();
            let removed = state.pending.remove(&token);
            match removed {
                Some(waiter) => waiter,
                None if state.withdrawn.remove(&token) => return Completion::Withdrawn,
                None => return Completion::Unmatched,
            }
        };
        tracing::debug!(
            token = token.0,
            tag = %waiter.tag,
            elapsed = ?waiter.created.elapsed(),
            ok = outcome.is_ok(),
            "call completed"
        );
        waiter.resolve(outcome);
        Completion::Delivered
    }

    /// Resolve a call with `Timeout`. Returns `false` if it was no longer
    /// pending.
    pub fn expire(&self, token: Token) -> bool {
        let Some(waiter) = self.withdraw(token) else {
            return false;
        };
        let after = waiter.deadline.unwrap_or_else(|| waiter.created.elapsed());
        tracing::debug!(token = token.0, tag = %waiter.tag, ?after, "call timed out");
        let tag = waiter.tag.clone();
        waiter.resolve(Err(ClientError::Timeout { tag, after }));
        true
    }

    /// Resolve a call with `Cancelled`. Returns `false` if it was no longer
    /// pending.
    pub fn cancel(&self, token: Token) -> bool {
        let Some(waiter) = self.withdraw(token) else {
            return false;
        };
        tracing::debug!(token = token.0, tag = %waiter.tag, "call cancelled");
        let tag = waiter.tag.clone();
        waiter.resolve(Err(ClientError::Cancelled { tag }));
        true
    }

    /// Close the table and resolve every pending call with `error`.
    ///
    /// Later registrations fail with `ConnectionLost`. Returns the number
    /// of calls failed.
    pub fn fail_all(&self, error: ClientError) -> usize {
        let drained: Vec<Waiter> = {
            let mut state = self.state.lock();
            state.closed = true;
            state.pending.drain().map(|(_, waiter)| waiter).collect()
        };
        let count = drained.len();
        for waiter in drained {
            waiter.resolve(Err(error.clone()));
        }
        count
    }

    /// Number of in-flight calls
    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Whether no call is in flight
    pub fn is_empty(&self) -> bool {
        self.state.lock().pending.is_empty()
    }

    /// Whether `token` is in flight
    pub fn contains(&self, token: Token) -> bool {
        self.state.lock().pending.contains_key(&token)
    }

    /// Whether [`fail_all`](Self::fail_all) has run
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn withdraw(&self, token: Token) -> Option<Waiter> {
        let mut state = self.state.lock();
        let waiter = state.pending.remove(&token)?;
        state.withdraw(token);
        Some(waiter)
    }
}

/// Handle a caller awaits for the outcome of one call.
///
/// Resolves to the result object, checked against the declared result type.
/// Dropping it before it resolves cancels the call.
pub struct PendingCall {
    token: Token,
    tag: String,
    expected: String,
    receiver: oneshot::Receiver<Outcome>,
    table: Arc<CorrelationTable>,
    registry: Arc<TypeRegistry>,
    done: bool,
}

impl PendingCall {
    pub(crate) fn new(
        token: Token,
        tag: impl Into<String>,
        expected: impl Into<String>,
        receiver: oneshot::Receiver<Outcome>,
        table: Arc<CorrelationTable>,
        registry: Arc<TypeRegistry>,
    ) -> Self {
        Self {
            token,
            tag: tag.into(),
            expected: expected.into(),
            receiver,
            table,
            registry,
            done: false,
        }
    }

    /// Correlation token of this call
    pub fn token(&self) -> Token {
        self.token
    }

    /// Tag of the request
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Handle that can cancel this call from elsewhere
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            token: self.token,
            table: Arc::downgrade(&self.table),
        }
    }

    fn conform(&self, result: TaggedObject) -> Outcome {
        if self.registry.conforms(result.tag(), &self.expected) {
            Ok(result)
        } else {
            Err(ClientError::UnexpectedResult {
                tag: self.tag.clone(),
                expected: self.expected.clone(),
                actual: result.tag().to_string(),
            })
        }
    }
}

impl Future for PendingCall {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let received = match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(received) => received,
        };
        self.done = true;
        Poll::Ready(match received {
            Ok(Ok(result)) => self.conform(result),
            Ok(Err(err)) => Err(err),
            // Waiter dropped without an outcome: the table went away.
            Err(_) => Err(ClientError::ConnectionLost),
        })
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        if !self.done {
            self.table.cancel(self.token);
        }
    }
}

impl std::fmt::Debug for PendingCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCall")
            .field("token", &self.token)
            .field("tag", &self.tag)
            .field("expected", &self.expected)
            .finish_non_exhaustive()
    }
}

/// Cloneable cancellation signal for one call
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: Token,
    table: std::sync::Weak<CorrelationTable>,
}

impl CancelHandle {
    /// Withdraw the call. Advisory only: the engine may still process it.
    /// Returns `false` if the call had already resolved.
    pub fn cancel(&self) -> bool {
        self.table
            .upgrade()
            .is_some_and(|table| table.cancel(self.token))
    }

    /// Token of the call
    pub fn token(&self) -> Token {
        self.token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Arc<TypeRegistry> {
        Arc::new(TypeRegistry::builtin().unwrap())
    }

    fn pending(table: &Arc<CorrelationTable>, tag: &str, expected: &str) -> PendingCall {
        let (token, rx) = table.register(tag, None).unwrap();
        PendingCall::new(token, tag, expected, rx, table.clone(), registry())
    }

    #[tokio::test]
    async fn test_tokens_are_unique_and_monotonic() {
        let table = CorrelationTable::new(16);
        let (a, _ra) = table.register("getMe", None).unwrap();
        let (b, _rb) = table.register("getMe", None).unwrap();
        assert!(b > a);
        assert_eq!(table.len(), 2);
    }

    #[tokio::test]
    async fn test_complete_is_idempotent() {
        let table = Arc::new(CorrelationTable::new(16));
        let call = pending(&table, "getMe", "user");
        let token = call.token();

        let user = TaggedObject::new("user").with("id", 1);
        assert_eq!(table.complete(token, Ok(user.clone())), Completion::Delivered);
        assert_eq!(
            table.complete(token, Ok(TaggedObject::new("user").with("id", 2))),
            Completion::Unmatched
        );
        assert_eq!(call.await.unwrap(), user);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_capacity_limit() {
        let table = CorrelationTable::new(1);
        let _first = table.register("getMe", None).unwrap();
        assert_eq!(
            table.register("getMe", None).unwrap_err(),
            ClientError::TooManyPending { limit: 1 }
        );
    }

    #[tokio::test]
    async fn test_cancel_then_late_arrival() {
        let table = Arc::new(CorrelationTable::new(16));
        let call = pending(&table, "getMe", "user");
        let token = call.token();
        let handle = call.cancel_handle();

        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert_eq!(
            call.await.unwrap_err(),
            ClientError::Cancelled { tag: "getMe".into() }
        );
        assert_eq!(
            table.complete(token, Ok(TaggedObject::new("user"))),
            Completion::Withdrawn
        );
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_drop_cancels() {
        let table = Arc::new(CorrelationTable::new(16));
        let call = pending(&table, "getMe", "user");
        let token = call.token();
        drop(call);
        assert!(!table.contains(token));
        assert_eq!(
            table.complete(token, Ok(TaggedObject::new("user"))),
            Completion::Withdrawn
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires() {
        let table = Arc::new(CorrelationTable::new(16));
        let (token, rx) = table.register("getMe", Some(Duration::from_millis(50))).unwrap();
        CorrelationTable::arm_deadline(&table, token, Duration::from_millis(50));
        let call = PendingCall::new(token, "getMe", "user", rx, table.clone(), registry());

        let started = Instant::now();
        let err = call.await.unwrap_err();
        assert_eq!(
            err,
            ClientError::Timeout {
                tag: "getMe".into(),
                after: Duration::from_millis(50)
            }
        );
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_fail_all_closes_table() {
        let table = Arc::new(CorrelationTable::new(16));
        let a = pending(&table, "getMe", "user");
        let b = pending(&table, "getChat", "chat");
        assert_eq!(table.fail_all(ClientError::ConnectionLost), 2);
        assert!(table.is_closed());
        assert_eq!(a.await.unwrap_err(), ClientError::ConnectionLost);
        assert_eq!(b.await.unwrap_err(), ClientError::ConnectionLost);
        assert_eq!(
            table.register("getMe", None).unwrap_err(),
            ClientError::ConnectionLost
        );
    }

    #[tokio::test]
    async fn test_result_conformance() {
        let table = Arc::new(CorrelationTable::new(16));
        let call = pending(&table, "getMe", "user");
        table.complete(call.token(), Ok(TaggedObject::new("chat").with("id", 1)));
        assert_eq!(
            call.await.unwrap_err(),
            ClientError::UnexpectedResult {
                tag: "getMe".into(),
                expected: "user".into(),
                actual: "chat".into(),
            }
        );

        let call = pending(&table, "getAuthorizationState", "AuthorizationState");
        table.complete(call.token(), Ok(TaggedObject::new("authorizationStateReady")));
        assert_eq!(call.await.unwrap().tag(), "authorizationStateReady");
    }
}
