use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::bot::Bot;

pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

pub struct WebhookState {
    pub bot: Bot,
    pub secret_token: Option<String>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Dispatch a delivered update; answer with the direct reply if one was set.
///
/// Updates that do not decode are acknowledged and skipped.
async fn receive_update(State(state): State<Arc<WebhookState>>, Json(raw): Json<Value>) -> Response {
    let Some(update) = state.bot.decode_update(raw) else {
        return StatusCode::OK.into_response();
    };
    let update_id = update.update_id;
    match state.bot.handle_update(update).await {
        Ok(Some(reply)) => Json(reply).into_response(),
        Ok(None) => StatusCode::OK.into_response(),
        Err(e) => {
            // Acknowledge anyway; a non-2xx answer makes Telegram redeliver.
            error!(update_id, "Webhook update failed: {e}");
            StatusCode::OK.into_response()
        }
    }
}

async fn secret_middleware(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    request: axum::extract::Request,
    next: Next,
) -> Response {
    if let Some(expected) = &state.secret_token {
        let given = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if given != Some(expected.as_str()) {
            return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
        }
    }
    next.run(request).await
}

/// Router serving `POST <path>` for updates and `GET /health`.
pub fn router(state: Arc<WebhookState>, path: &str) -> Router {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    let updates = Router::new()
        .route(&path, post(receive_update))
        .layer(middleware::from_fn_with_state(state.clone(), secret_middleware));

    Router::new()
        .route("/health", get(health))
        .merge(updates)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
