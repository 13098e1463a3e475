//! Integration tests for the webhook router, driven in-process with `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use tgbot::config::BotConfig;
use tgbot::error::BotError;
use tgbot::webhook::{self, WebhookState, SECRET_HEADER};
use tgbot::{Bot, Context, UpdateCategory};

const HOOK_PATH: &str = "/telegram/webhook";

fn test_bot() -> Bot {
    let mut config = BotConfig::with_token("123:test");
    // Nothing listens here; these tests never reach the Bot API.
    config.api_url = "http://127.0.0.1:9".to_string();
    config.handle_interrupt = false;
    Bot::with_config(config).expect("bot config is valid")
}

fn app(bot: Bot, secret: Option<&str>) -> Router {
    let state = Arc::new(WebhookState {
        bot,
        secret_token: secret.map(str::to_string),
    });
    webhook::router(state, HOOK_PATH)
}

fn update_request(body: Value, secret: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(HOOK_PATH)
        .header("content-type", "application/json");
    if let Some(secret) = secret {
        builder = builder.header(SECRET_HEADER, secret);
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("valid request")
}

fn text_update(id: i64, text: &str) -> Value {
    json!({
        "update_id": id,
        "message": {"message_id": 10, "chat": {"id": 77, "type": "private"}, "text": text}
    })
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("readable body");
    serde_json::from_slice(&bytes).expect("JSON body")
}

#[tokio::test]
async fn test_direct_reply_is_returned_in_response() {
    let bot = test_bot();
    bot.on(UpdateCategory::Text, |ctx: Context| async move {
        let text = ctx.message().and_then(|m| m.text.clone()).unwrap_or_default();
        ctx.direct_reply(format!("echo: {text}"));
        Ok(())
    });

    let response = app(bot.clone(), None)
        .oneshot(update_request(text_update(5, "hi"), None))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(
        body,
        json!({"method": "sendMessage", "chat_id": 77, "text": "echo: hi"})
    );
    assert_eq!(bot.update_offset(), 6);
}

#[tokio::test]
async fn test_update_without_reply_gets_empty_ok() {
    let bot = test_bot();
    let response = app(bot, None)
        .oneshot(update_request(text_update(1, "quiet"), None))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("readable body");
    assert!(bytes.is_empty());
}

#[tokio::test]
async fn test_failing_handler_still_acknowledges() {
    let bot = test_bot();
    bot.on(UpdateCategory::Message, |_ctx: Context| async {
        Err(BotError::handler("kaboom"))
    });

    let response = app(bot.clone(), None)
        .oneshot(update_request(text_update(3, "x"), None))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(bot.update_offset(), 4);
}

#[tokio::test]
async fn test_secret_token_is_enforced() {
    let bot = test_bot();
    let app = app(bot, Some("s3cret"));

    let missing = app
        .clone()
        .oneshot(update_request(text_update(1, "a"), None))
        .await
        .expect("router responds");
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let wrong = app
        .clone()
        .oneshot(update_request(text_update(2, "b"), Some("nope")))
        .await
        .expect("router responds");
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let right = app
        .oneshot(update_request(text_update(3, "c"), Some("s3cret")))
        .await
        .expect("router responds");
    assert_eq!(right.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_health_skips_secret_check() {
    let app = app(test_bot(), Some("s3cret"));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .expect("valid request"),
        )
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_undecodable_update_is_acknowledged() {
    let bot = test_bot();
    let response = app(bot.clone(), None)
        .oneshot(update_request(
            json!({"update_id": 40, "message": {"message_id": 1, "text": "no chat"}}),
            None,
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(bot.update_offset(), 41);
}

#[tokio::test]
async fn test_path_without_leading_slash() {
    let state = Arc::new(WebhookState {
        bot: test_bot(),
        secret_token: None,
    });
    let app = webhook::router(state, "hook");
    let request = Request::builder()
        .method("POST")
        .uri("/hook")
        .header("content-type", "application/json")
        .body(Body::from(text_update(1, "x").to_string()))
        .expect("valid request");

    let response = app.oneshot(request).await.expect("router responds");
    assert_eq!(response.status(), StatusCode::OK);
}
