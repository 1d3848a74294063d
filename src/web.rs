//! HTTP surface of the service.
//!
//! Three routes: the Telegram webhook (token-guarded path), a liveness
//! endpoint, and the metrics snapshot. Payload problems on the webhook are
//! answered `200 OK` so Telegram does not redeliver the same broken update.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use teloxide::types::Update;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::bot::handlers::process_update;
use crate::bot::outbound::Responder;
use crate::config::Settings;
use crate::llm::CompletionClient;
use crate::metrics::{Metrics, MetricsSnapshot};

/// Shared per-process state; everything except the metrics counters is
/// read-only after startup.
pub struct AppState {
    pub settings: Arc<Settings>,
    pub metrics: Arc<Metrics>,
    pub completions: CompletionClient,
    pub responder: Arc<dyn Responder>,
}

/// Build the application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handler_root))
        .route("/status", get(handler_status))
        .route("/webhook/:token", post(handler_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the server and serve until a shutdown signal arrives.
///
/// # Errors
///
/// Returns an error if the listener cannot bind or the server fails.
pub async fn run(state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], state.settings.port));
    let app = build_router(Arc::clone(&state));

    info!(addr = %addr, "webhook server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => error!(error = %e, "failed to listen for shutdown signal"),
    }
}

/// `GET /` — liveness probe with a non-sensitive configuration summary.
async fn handler_root(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "Bot is running!",
        "telegram_token": state.settings.token_fingerprint(),
        "gpts_model": state.settings.gpts_model_id,
    }))
}

/// `GET /status` — current metrics snapshot.
async fn handler_status(State(state): State<Arc<AppState>>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

/// `POST /webhook/:token` — inbound Telegram updates.
async fn handler_webhook(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    body: Bytes,
) -> StatusCode {
    if token != state.settings.telegram_token {
        state.metrics.record_unauthorized();
        warn!("webhook call with wrong token path");
        return StatusCode::NOT_FOUND;
    }

    match serde_json::from_slice::<Update>(&body) {
        Ok(update) => process_update(&state, update).await,
        Err(e) => {
            // 200 on purpose: Telegram redelivers anything answered non-2xx,
            // and a broken payload stays broken
            state.metrics.record_malformed_update();
            warn!(error = %e, "discarding malformed webhook body");
        }
    }

    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::outbound::MockResponder;
    use crate::llm::{CompletionClient, MockCompletionProvider, RetryPolicy};
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    const TEST_TOKEN: &str = "123456789:AAtesttesttesttesttesttesttesttes";

    fn test_state(provider: MockCompletionProvider, responder: MockResponder) -> Arc<AppState> {
        let metrics = Arc::new(Metrics::new());
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::ZERO,
            request_timeout: Duration::from_secs(5),
        };
        Arc::new(AppState {
            settings: Arc::new(Settings {
                telegram_token: TEST_TOKEN.to_string(),
                openai_api_key: "sk-test".to_string(),
                gpts_model_id: "gpt-4o-mini".to_string(),
                webhook_url: "https://example.onrender.com".to_string(),
                port: 8000,
            }),
            metrics: Arc::clone(&metrics),
            completions: CompletionClient::new(Arc::new(provider), metrics, policy),
            responder: Arc::new(responder) as Arc<dyn Responder>,
        })
    }

    fn idle_state() -> Arc<AppState> {
        let mut provider = MockCompletionProvider::new();
        provider.expect_complete().times(0);
        let mut responder = MockResponder::new();
        responder.expect_send_text().times(0);
        test_state(provider, responder)
    }

    fn webhook_request(token: &str, body: &str) -> Result<Request<Body>, axum::http::Error> {
        Request::builder()
            .method("POST")
            .uri(format!("/webhook/{token}"))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
    }

    async fn body_string(response: axum::response::Response) -> Result<String, axum::Error> {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    #[tokio::test]
    async fn test_liveness_endpoint_hides_the_token() -> TestResult {
        let app = build_router(idle_state());
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty())?)
            .await?;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await?;
        assert!(body.contains("Bot is running!"));
        assert!(!body.contains(TEST_TOKEN));
        Ok(())
    }

    #[tokio::test]
    async fn test_status_endpoint_reports_counters() -> TestResult {
        let state = idle_state();
        state.metrics.record_request();
        state.metrics.record_request();

        let app = build_router(Arc::clone(&state));
        let response = app
            .oneshot(Request::builder().uri("/status").body(Body::empty())?)
            .await?;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await?;
        assert!(body.contains("\"requests_total\":2"));
        assert!(body.contains("uptime_seconds"));
        Ok(())
    }

    #[tokio::test]
    async fn test_webhook_rejects_wrong_token() -> TestResult {
        let state = idle_state();
        let app = build_router(Arc::clone(&state));

        let response = app
            .oneshot(webhook_request("wrong-token", "{}")?)
            .await?;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(state.metrics.snapshot().unauthorized_hits, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_webhook_answers_ok_for_malformed_body() -> TestResult {
        let state = idle_state();
        let app = build_router(Arc::clone(&state));

        let response = app
            .oneshot(webhook_request(TEST_TOKEN, "this is not json")?)
            .await?;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.metrics.snapshot().malformed_updates, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_webhook_relays_text_update_to_model() -> TestResult {
        let mut provider = MockCompletionProvider::new();
        provider
            .expect_complete()
            .times(1)
            .returning(|_| Ok("модельна відповідь".to_string()));

        let mut responder = MockResponder::new();
        responder
            .expect_send_text()
            .withf(|chat_id, text| chat_id.0 == 42 && text == "модельна відповідь")
            .times(1)
            .returning(|_, _| Ok(()));

        let state = test_state(provider, responder);
        let app = build_router(Arc::clone(&state));

        let update = serde_json::json!({
            "update_id": 1,
            "message": {
                "message_id": 10,
                "date": 1_700_000_000,
                "chat": {"id": 42, "type": "private", "first_name": "Олена"},
                "from": {"id": 7, "is_bot": false, "first_name": "Олена"},
                "text": "Привіт!",
            }
        });
        let response = app
            .oneshot(webhook_request(TEST_TOKEN, &update.to_string())?)
            .await?;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.metrics.snapshot().requests_total, 1);
        Ok(())
    }
}
