//! Typed functions and local execution
#![allow(missing_docs, clippy::unwrap_used)]

mod common;

use common::{announce, connect, user};
use tether_client::functions::{GetChat, GetFileMimeType, GetMe, OptionValue, SetOption, User};
use tether_client::{AuthorizationState, ClientError, TaggedObject};
use tether_core::wire;

#[tokio::test]
async fn typed_call_decodes_output() {
    let (client, mut engine) = connect();
    announce(&client, &engine, AuthorizationState::Ready).await;

    let engine_side = async {
        let (token, request) = engine.next_request().await.unwrap();
        assert_eq!(request.tag(), "getMe");
        engine.reply(token, &user(42));
    };
    let (me, ()) = tokio::join!(client.send(&GetMe {}), engine_side);
    assert_eq!(
        me.unwrap(),
        User {
            id: 42,
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            phone_number: String::new(),
        }
    );
}

#[tokio::test]
async fn typed_request_fields_reach_the_wire() {
    let (client, mut engine) = connect();

    let engine_side = async {
        let (token, request) = engine.next_request().await.unwrap();
        assert_eq!(request.tag(), "setOption");
        assert_eq!(request.lookup("value.value").and_then(|v| v.as_str()), Some("12"));
        engine.reply(token, &TaggedObject::new("ok"));
    };
    let option = SetOption {
        name: "notification_group_count_max".into(),
        value: Some(OptionValue::Integer { value: 12 }),
    };
    let (ack, ()) = tokio::join!(client.send(&option), engine_side);
    ack.unwrap();
}

#[tokio::test]
async fn local_function_bypasses_correlation_and_state() {
    let (client, engine) = connect();
    engine.set_executor(|request| {
        let name = request.get_str("file_name").unwrap_or_default();
        let mime = if name.ends_with(".png") { "image/png" } else { "" };
        TaggedObject::new("text").with("text", mime)
    });

    assert_eq!(client.current_authorization_state(), None);
    let mime = client
        .execute_typed(&GetFileMimeType {
            file_name: "photo.png".into(),
        })
        .unwrap();
    assert_eq!(mime.text, "image/png");
    assert_eq!(engine.sent_count(), 0);
    assert_eq!(client.pending_calls(), 0);
}

#[tokio::test]
async fn executor_error_becomes_engine_error() {
    let (client, engine) = connect();
    engine.set_executor(|_| wire::error_object(400, "Invalid file name"));

    let err = client
        .execute(TaggedObject::new("getFileMimeType").with("file_name", ""))
        .unwrap_err();
    assert_eq!(
        err,
        ClientError::Engine {
            code: 400,
            message: "Invalid file name".into()
        }
    );
}

#[tokio::test]
async fn remote_function_cannot_be_executed() {
    let (client, engine) = connect();
    announce(&client, &engine, AuthorizationState::Ready).await;
    let err = client.execute(TaggedObject::new("getMe")).unwrap_err();
    assert_eq!(err, ClientError::NotSynchronous { tag: "getMe".into() });
    assert_eq!(engine.sent_count(), 0);
}

#[tokio::test]
async fn nonconforming_result_is_rejected() {
    let (client, mut engine) = connect();
    announce(&client, &engine, AuthorizationState::Ready).await;

    let engine_side = async {
        let (token, _) = engine.next_request().await.unwrap();
        engine.reply(token, &TaggedObject::new("chat").with("id", 1).with("title", "x"));
    };
    let (result, ()) = tokio::join!(client.send(&GetMe {}), engine_side);
    assert_eq!(
        result.unwrap_err(),
        ClientError::UnexpectedResult {
            tag: "getMe".into(),
            expected: "user".into(),
            actual: "chat".into(),
        }
    );
}

#[tokio::test]
async fn typed_call_is_gated_like_any_other() {
    let (client, engine) = connect();
    announce(&client, &engine, AuthorizationState::WaitPhoneNumber).await;
    let err = client.send(&GetChat { chat_id: 1 }).await.unwrap_err();
    assert!(matches!(err, ClientError::State { ref tag, .. } if tag == "getChat"));
    assert_eq!(engine.sent_count(), 0);
}
