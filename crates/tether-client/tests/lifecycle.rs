//! Concurrency, cancellation, update ordering and connection loss
#![allow(missing_docs, clippy::unwrap_used)]

mod common;

use common::{announce, barrier, connect, connect_with, fields, user};
use futures::StreamExt;
use proptest::prelude::*;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tether_client::{
    AuthorizationState, CallOptions, ClientConfig, ClientError, TaggedObject, UpdateFilter,
};

#[tokio::test]
async fn concurrent_calls_each_resolve_once_without_leaks() {
    const N: i64 = 50;
    let (client, mut engine) = connect();
    announce(&client, &engine, AuthorizationState::Ready).await;

    let mut tasks = Vec::new();
    for x in 0..N {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            let result = client
                .call("testSquareInt", fields(json!({"x": x})))
                .await
                .unwrap();
            (x, result.get_i64("value").unwrap())
        }));
    }

    let mut received = Vec::new();
    for _ in 0..N {
        received.push(engine.next_request().await.unwrap());
    }
    // Answer newest first.
    for (token, request) in received.into_iter().rev() {
        let x = request.get_i64("x").unwrap();
        engine.reply(token, &TaggedObject::new("testInt").with("value", x * x));
    }

    for task in tasks {
        let (x, squared) = task.await.unwrap();
        assert_eq!(squared, x * x);
    }
    assert_eq!(client.pending_calls(), 0);
    assert_eq!(client.stats().responses, N as u64);
}

#[tokio::test]
async fn duplicate_response_is_a_no_op() {
    let (client, mut engine) = connect();
    announce(&client, &engine, AuthorizationState::Ready).await;

    let (pending, _) = client
        .submit(TaggedObject::new("getMe"), CallOptions::default())
        .await
        .unwrap();
    let (token, _) = engine.next_request().await.unwrap();
    engine.reply(token, &user(1));
    engine.reply(token, &user(2));

    assert_eq!(pending.await.unwrap().get_i64("id"), Some(1));
    barrier(&client, &engine).await;
    assert_eq!(client.stats().unmatched, 1);
}

#[tokio::test]
async fn cancelled_call_releases_its_slot() {
    let (client, mut engine) = connect();
    announce(&client, &engine, AuthorizationState::Ready).await;

    let (pending, cancel) = client
        .submit(TaggedObject::new("getMe"), CallOptions::no_timeout())
        .await
        .unwrap();
    assert_eq!(client.pending_calls(), 1);
    assert!(cancel.cancel());
    assert_eq!(client.pending_calls(), 0);
    assert_eq!(
        pending.await.unwrap_err(),
        ClientError::Cancelled { tag: "getMe".into() }
    );

    let (token, _) = engine.next_request().await.unwrap();
    engine.reply(token, &user(1));
    barrier(&client, &engine).await;
    assert_eq!(client.stats().late, 1);
}

#[tokio::test]
async fn table_capacity_is_enforced() {
    let config = ClientConfig {
        max_pending_calls: 2,
        ..ClientConfig::testing()
    };
    let (client, engine) = connect_with(config);
    announce(&client, &engine, AuthorizationState::Ready).await;

    let _a = client.submit(TaggedObject::new("getMe"), CallOptions::default()).await.unwrap();
    let _b = client.submit(TaggedObject::new("getMe"), CallOptions::default()).await.unwrap();
    let err = client
        .submit(TaggedObject::new("getMe"), CallOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err, ClientError::TooManyPending { limit: 2 });
    assert_eq!(engine.sent_count(), 2);
}

#[tokio::test]
async fn updates_arrive_in_emission_order_for_every_subscriber() {
    let (client, engine) = connect();
    let first = client.subscribe(UpdateFilter::tag("updateChatTitle"));
    let second = client.subscribe(UpdateFilter::chat(3));

    for i in 0..20 {
        engine.update(
            &TaggedObject::new("updateChatTitle")
                .with("chat_id", 3)
                .with("title", format!("t{i}")),
        );
    }
    let expected: Vec<String> = (0..20).map(|i| format!("t{i}")).collect();
    for stream in [first, second] {
        let titles: Vec<String> = stream
            .take(20)
            .map(|u| u.get_str("title").unwrap().to_string())
            .collect()
            .await;
        assert_eq!(titles, expected);
    }
}

#[tokio::test]
async fn callbacks_see_state_already_applied() {
    let (client, engine) = connect();
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let observer = client.clone();
    let log = seen.clone();
    client.subscribe_with(UpdateFilter::tag("updateAuthorizationState"), move |_| {
        log.lock().push(observer.current_authorization_state());
    });

    announce(&client, &engine, AuthorizationState::WaitPhoneNumber).await;
    barrier(&client, &engine).await;
    assert_eq!(*seen.lock(), [Some(AuthorizationState::WaitPhoneNumber)]);
}

#[tokio::test]
async fn entity_filter_selects_one_chat() {
    let (client, engine) = connect();
    let mut chat_seven = client.subscribe(UpdateFilter::chat(7));

    engine.update(
        &TaggedObject::from_value(json!({
            "@type": "updateNewMessage",
            "message": {"@type": "message", "id": 1, "chat_id": 8}
        }))
        .unwrap(),
    );
    engine.update(
        &TaggedObject::from_value(json!({
            "@type": "updateNewMessage",
            "message": {"@type": "message", "id": 2, "chat_id": 7}
        }))
        .unwrap(),
    );

    let update = chat_seven.recv().await.unwrap();
    assert_eq!(update.lookup("message.id").and_then(|v| v.as_i64()), Some(2));
    assert!(chat_seven.try_recv().is_none());
}

#[tokio::test]
async fn connection_loss_fans_out_once() {
    let (client, mut engine) = connect();
    announce(&client, &engine, AuthorizationState::Ready).await;
    let mut updates = client.subscribe(UpdateFilter::prefix("updateChat"));

    let (a, _) = client
        .submit(TaggedObject::new("getMe"), CallOptions::default())
        .await
        .unwrap();
    let (b, _) = client
        .submit(
            TaggedObject::new("getChat").with("chat_id", 1),
            CallOptions::default(),
        )
        .await
        .unwrap();

    engine.disconnect();

    assert_eq!(a.await.unwrap_err(), ClientError::ConnectionLost);
    assert_eq!(b.await.unwrap_err(), ClientError::ConnectionLost);

    let last = updates.recv().await.unwrap();
    assert_eq!(
        AuthorizationState::from_update(&last),
        Some(AuthorizationState::Closed)
    );
    assert!(updates.recv().await.is_none());

    assert!(!client.is_connected());
    assert_eq!(
        client.current_authorization_state(),
        Some(AuthorizationState::Closed)
    );
    assert_eq!(
        client.call("close", Default::default()).await.unwrap_err(),
        ClientError::ConnectionLost
    );
}

#[tokio::test]
async fn engine_announced_close_tears_the_instance_down() {
    let (client, engine) = connect();
    announce(&client, &engine, AuthorizationState::Ready).await;
    let mut options = client.subscribe(UpdateFilter::tag("updateOption"));
    let (pending, _) = client
        .submit(TaggedObject::new("getMe"), CallOptions::no_timeout())
        .await
        .unwrap();

    announce(&client, &engine, AuthorizationState::LoggingOut).await;
    announce(&client, &engine, AuthorizationState::Closing).await;
    assert!(client.is_connected());
    announce(&client, &engine, AuthorizationState::Closed).await;

    assert_eq!(pending.await.unwrap_err(), ClientError::ConnectionLost);
    assert!(!client.is_connected());
    assert_eq!(client.pending_calls(), 0);

    // Exactly one terminal update, then the stream ends.
    let last = options.recv().await.unwrap();
    assert_eq!(
        AuthorizationState::from_update(&last),
        Some(AuthorizationState::Closed)
    );
    assert!(options.recv().await.is_none());

    assert_eq!(
        client.call("getAuthorizationState", Default::default()).await.unwrap_err(),
        ClientError::ConnectionLost
    );
}

#[tokio::test]
async fn shutdown_fails_pending_and_closes_transport() {
    let (client, engine) = connect();
    announce(&client, &engine, AuthorizationState::Ready).await;
    let (pending, _) = client
        .submit(TaggedObject::new("getMe"), CallOptions::no_timeout())
        .await
        .unwrap();

    client.shutdown().await;
    client.shutdown().await;

    assert_eq!(pending.await.unwrap_err(), ClientError::ConnectionLost);
    assert!(engine.is_closed());
    assert!(!client.is_connected());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_any_answer_order_resolves_every_call(
        order in (1usize..16).prop_flat_map(|n| Just((0..n).collect::<Vec<_>>()).prop_shuffle())
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let (client, mut engine) = connect();
            announce(&client, &engine, AuthorizationState::Ready).await;

            let mut calls = Vec::new();
            for i in 0..order.len() {
                let request = TaggedObject::new("testCallString").with("x", format!("v{i}"));
                let (pending, _) = client.submit(request, CallOptions::no_timeout()).await.unwrap();
                calls.push(pending);
            }

            let mut tokens = HashMap::new();
            for _ in 0..order.len() {
                let (token, request) = engine.next_request().await.unwrap();
                tokens.insert(request.get_str("x").unwrap().to_string(), token);
            }
            for &i in &order {
                let value = format!("v{i}");
                engine.reply(tokens[&value], &TaggedObject::new("testString").with("value", value.clone()));
            }

            for (i, pending) in calls.into_iter().enumerate() {
                let result = pending.await.unwrap();
                assert_eq!(result.get_str("value"), Some(format!("v{i}").as_str()));
            }
            assert_eq!(client.pending_calls(), 0);
        });
    }
}
