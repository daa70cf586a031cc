//! Shared harness for client integration tests
#![allow(dead_code, missing_docs, clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;
use tether_client::{AuthorizationState, Client, ClientConfig, TaggedObject, UpdateFilter};
use tether_transport::{EngineHandle, MemoryTransport};
use tracing_subscriber::EnvFilter;

/// Update tag used as an in-order marker; nothing else in the tests sends it
pub const BARRIER_TAG: &str = "updateConnectionState";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn connect() -> (Client, EngineHandle) {
    connect_with(ClientConfig::testing())
}

pub fn connect_with(config: ClientConfig) -> (Client, EngineHandle) {
    init_tracing();
    let (transport, engine) = MemoryTransport::pair();
    let client = Client::new(transport, config).unwrap();
    (client, engine)
}

/// Announce `state` and wait until the client has applied it
pub async fn announce(client: &Client, engine: &EngineHandle, state: AuthorizationState) {
    let mut changes = client.authorization_changes();
    assert!(engine.update(&state.to_update()));
    tokio::time::timeout(Duration::from_secs(5), async {
        while client.current_authorization_state() != Some(state) {
            changes.changed().await;
        }
    })
    .await
    .expect("state was not applied");
}

/// Wait until every frame pushed before this call has been dispatched
pub async fn barrier(client: &Client, engine: &EngineHandle) {
    let mut marker = client.subscribe(UpdateFilter::tag(BARRIER_TAG));
    let update = TaggedObject::new(BARRIER_TAG)
        .with("state", TaggedObject::new("connectionStateReady").into_value());
    assert!(engine.update(&update));
    let seen = tokio::time::timeout(Duration::from_secs(5), marker.recv())
        .await
        .expect("barrier not reached");
    assert!(seen.is_some(), "update stream ended before the barrier");
    client.unsubscribe(marker.handle());
}

pub fn user(id: i64) -> TaggedObject {
    TaggedObject::new("user")
        .with("id", id)
        .with("first_name", "Ada")
        .with("last_name", "Lovelace")
}

pub fn fields(value: serde_json::Value) -> tether_core::Fields {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}
