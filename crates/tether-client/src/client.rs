//! Client
//!
//! Upward API over one engine connection. A call goes through, in order:
//! registry validation, the state gate, the correlation table, and the
//! transport. The first two fail synchronously with nothing sent.
//!
//! `Client` is a cheap handle; clones share the connection. The dispatch
//! loop stops when the last clone is dropped, on [`Client::shutdown`], when
//! the transport's inbound stream ends, or when the engine announces
//! `authorizationStateClosed`.

use crate::config::{CallOptions, ClientConfig};
use crate::correlation::{CancelHandle, CorrelationTable, PendingCall};
use crate::dispatch::{DispatchLoop, DispatchStats, StatsSnapshot};
use crate::errors::{ClientError, Result};
use crate::functions::RemoteFunction;
use crate::gate::StateGate;
use crate::router::{SubscriptionHandle, UpdateFilter, UpdateRouter, UpdateStream};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tether_core::reactive::Subscription;
use tether_core::wire;
use tether_core::{AuthorizationState, Fields, TaggedObject, TypeRegistry, UPDATE_AUTHORIZATION_STATE};
use tether_transport::Transport;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

struct ClientInner {
    transport: Arc<dyn Transport>,
    registry: Arc<TypeRegistry>,
    config: ClientConfig,
    table: Arc<CorrelationTable>,
    router: Arc<UpdateRouter>,
    gate: Arc<StateGate>,
    stats: Arc<DispatchStats>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    dispatch: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to one engine connection
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Connect over `transport` with the built-in protocol surface.
    ///
    /// Must be called inside a Tokio runtime; the dispatch loop is spawned
    /// onto it.
    pub fn new(transport: impl Transport, config: ClientConfig) -> Result<Self> {
        Self::with_registry(transport, config, TypeRegistry::builtin()?)
    }

    /// Connect with a custom registry
    pub fn with_registry(
        transport: impl Transport,
        config: ClientConfig,
        registry: TypeRegistry,
    ) -> Result<Self> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| ClientError::config("Client must be created inside a Tokio runtime"))?;

        let transport: Arc<dyn Transport> = Arc::new(transport);
        let inbound = transport.take_inbound()?;
        let registry = Arc::new(registry);
        let table = Arc::new(CorrelationTable::new(config.max_pending_calls));
        let router = Arc::new(UpdateRouter::new());
        let gate = Arc::new(StateGate::new(registry.clone()));
        let stats = Arc::new(DispatchStats::default());

        // First subscriber: later subscribers see the state already applied.
        let observer = gate.clone();
        router.subscribe_permanent(UpdateFilter::tag(UPDATE_AUTHORIZATION_STATE), move |update| {
            observer.observe(update);
        });

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let dispatch = DispatchLoop::new(
            inbound,
            table.clone(),
            router.clone(),
            stats.clone(),
            shutdown_rx,
        );
        let handle = runtime.spawn(dispatch.run());

        tracing::info!(
            transport = transport.transport_type(),
            tags = registry.len(),
            max_pending_calls = config.max_pending_calls,
            "client started"
        );

        Ok(Self {
            inner: Arc::new(ClientInner {
                transport,
                registry,
                config,
                table,
                router,
                gate,
                stats,
                shutdown: Mutex::new(Some(shutdown_tx)),
                dispatch: Mutex::new(Some(handle)),
            }),
        })
    }

    /// Call `tag` with `fields` and wait for its result
    pub async fn call(&self, tag: &str, fields: Fields) -> Result<TaggedObject> {
        self.call_object(TaggedObject::with_fields(tag, fields)).await
    }

    /// Call with a prebuilt request object
    pub async fn call_object(&self, request: TaggedObject) -> Result<TaggedObject> {
        self.call_with(request, CallOptions::default()).await
    }

    /// Call with per-call options
    pub async fn call_with(&self, request: TaggedObject, options: CallOptions) -> Result<TaggedObject> {
        let (pending, _cancel) = self.submit(request, options).await?;
        pending.await
    }

    /// Send a request and return its waiter without awaiting the result.
    ///
    /// Fails without sending anything if the request is malformed, not
    /// admissible in the current state, or the table is full.
    pub async fn submit(
        &self,
        request: TaggedObject,
        options: CallOptions,
    ) -> Result<(PendingCall, CancelHandle)> {
        let inner = &self.inner;
        if inner.table.is_closed() {
            return Err(ClientError::ConnectionLost);
        }
        let schema = inner.registry.validate(&request)?;
        inner.gate.check(schema)?;
        let expected = schema.result().unwrap_or_default().to_string();

        let deadline = options.resolve(&inner.config);
        let (token, receiver) = inner.table.register(request.tag(), deadline)?;
        if let Some(after) = deadline {
            CorrelationTable::arm_deadline(&inner.table, token, after);
        }
        // Dropping `pending` on any early return withdraws the entry.
        let pending = PendingCall::new(
            token,
            request.tag(),
            expected,
            receiver,
            inner.table.clone(),
            inner.registry.clone(),
        );

        let frame = wire::encode_request(token, &request)?;
        tracing::debug!(token = token.0, tag = %request.tag(), ?deadline, "submitting call");
        inner.transport.send(frame).await?;

        let cancel = pending.cancel_handle();
        Ok((pending, cancel))
    }

    /// Call a typed function
    pub async fn send<F: RemoteFunction>(&self, function: &F) -> Result<F::Output> {
        let request = typed_request(function)?;
        let result = self.call_object(request).await?;
        decode_output::<F>(result)
    }

    /// Answer a local request synchronously.
    ///
    /// Bypasses the correlation table and the state gate; only tags the
    /// registry marks as local are accepted.
    pub fn execute(&self, request: TaggedObject) -> Result<TaggedObject> {
        let inner = &self.inner;
        let schema = inner.registry.validate(&request)?;
        if !schema.is_local() {
            return Err(ClientError::NotSynchronous {
                tag: request.tag().to_string(),
            });
        }

        let frame = wire::encode_object(&request)?;
        let reply = inner.transport.execute(&frame)?;
        let result = wire::decode_reply(&reply)?.map_err(ClientError::from)?;

        let expected = schema.result().unwrap_or_default();
        if !inner.registry.conforms(result.tag(), expected) {
            return Err(ClientError::UnexpectedResult {
                tag: request.tag().to_string(),
                expected: expected.to_string(),
                actual: result.tag().to_string(),
            });
        }
        Ok(result)
    }

    /// Execute a typed local function
    pub fn execute_typed<F: RemoteFunction>(&self, function: &F) -> Result<F::Output> {
        let result = self.execute(typed_request(function)?)?;
        decode_output::<F>(result)
    }

    /// Stream of updates passing `filter`
    pub fn subscribe(&self, filter: UpdateFilter) -> UpdateStream {
        self.inner.router.subscribe_stream(filter)
    }

    /// Run `handler` on the dispatch loop for every update passing
    /// `filter`. The handler must not block.
    pub fn subscribe_with(
        &self,
        filter: UpdateFilter,
        handler: impl Fn(&TaggedObject) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        self.inner.router.subscribe(filter, handler)
    }

    /// Remove a subscription
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.inner.router.unsubscribe(handle)
    }

    /// Observed authorization state, `None` until the engine announces one
    pub fn current_authorization_state(&self) -> Option<AuthorizationState> {
        self.inner.gate.current()
    }

    /// Observe authorization state changes
    pub fn authorization_changes(&self) -> Subscription<Option<AuthorizationState>> {
        self.inner.gate.subscribe()
    }

    /// Whether `tag` may be sent in the current state
    pub fn is_allowed(&self, tag: &str) -> bool {
        self.inner.gate.is_allowed(tag)
    }

    /// Number of in-flight calls
    pub fn pending_calls(&self) -> usize {
        self.inner.table.len()
    }

    /// Dispatch counters
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Registry the client validates against
    pub fn registry(&self) -> &TypeRegistry {
        &self.inner.registry
    }

    /// Effective configuration
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Whether the connection is still usable
    pub fn is_connected(&self) -> bool {
        !self.inner.table.is_closed()
    }

    /// Stop the dispatch loop, fail pending calls with `ConnectionLost`,
    /// and close the transport. Idempotent.
    pub async fn shutdown(&self) {
        if let Some(tx) = self.inner.shutdown.lock().take() {
            let _ = tx.send(());
        }
        let handle = self.inner.dispatch.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "dispatch loop ended abnormally");
            }
        }
        if let Err(err) = self.inner.transport.close().await {
            tracing::warn!(error = %err, "transport close failed");
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("transport", &self.inner.transport.transport_type())
            .field("state", &self.current_authorization_state())
            .field("pending_calls", &self.pending_calls())
            .finish_non_exhaustive()
    }
}

fn typed_request<F: RemoteFunction>(function: &F) -> Result<TaggedObject> {
    let fields = match serde_json::to_value(function) {
        Ok(Value::Object(fields)) => fields,
        Ok(Value::Null) => Fields::new(),
        Ok(other) => {
            return Err(ClientError::decode(format!(
                "`{}` must serialize to an object, not {other}",
                F::TAG
            )))
        }
        Err(err) => return Err(ClientError::decode(err.to_string())),
    };
    Ok(TaggedObject::with_fields(F::TAG, fields))
}

fn decode_output<F: RemoteFunction>(result: TaggedObject) -> Result<F::Output> {
    serde_json::from_value(result.into_value())
        .map_err(|err| ClientError::decode(format!("`{}` result: {err}", F::TAG)))
}
