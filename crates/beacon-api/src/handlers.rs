//! Route handlers.
//!
//! All handlers are stateless: deterministic or randomized response bodies
//! with no persisted side effects beyond metrics. `/slow` and `/error`
//! exist to exercise the latency and error-path instrumentation.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use rand::Rng;
use serde_json::{Value, json};
use tracing::{error, info};

use crate::AppState;

/// Service banner returned by `GET /`.
#[derive(serde::Serialize)]
pub struct HomeResponse {
    pub message: String,
    pub timestamp: String,
    pub hostname: String,
    pub status: String,
}

/// GET /
pub async fn home(State(state): State<AppState>) -> Json<HomeResponse> {
    info!(endpoint = "/", method = "GET", "home endpoint accessed");
    Json(HomeResponse {
        message: "Hello from beacon!".to_string(),
        timestamp: Utc::now().to_rfc3339(),
        hostname: state.hostname.to_string(),
        status: "running".to_string(),
    })
}

/// GET /health
pub async fn health() -> Json<Value> {
    info!(status = "healthy", "health check");
    Json(json!({"status": "healthy"}))
}

/// GET /slow — sleeps for the configured delay before responding, used to
/// test latency instrumentation and upstream timeout behavior. The sleep
/// is an await, so concurrent requests are unaffected.
pub async fn slow(State(state): State<AppState>) -> Json<Value> {
    tokio::time::sleep(state.slow_delay).await;
    Json(json!({"message": "This was slow!"}))
}

/// GET /error — always fails with a 500, used to test error-path metrics.
/// A simulated application error, not a crash: it is counted as a normal
/// metric event by the middleware.
pub async fn error() -> impl IntoResponse {
    error!("intentional error triggered");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "Something went wrong!"})),
    )
}

/// GET /metrics — Prometheus exposition of the whole registry.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", beacon_metrics::CONTENT_TYPE)],
        state.registry.render(),
    )
}

/// POST /signup — classifies the signup into a tier and pushes a counter
/// and a value sample to the statsd side channel, tagged with the tier.
pub async fn signup(State(state): State<AppState>) -> impl IntoResponse {
    info!("user signup endpoint accessed");

    let tier = state.tiers.select();
    let tags = vec![format!("tier:{tier}")];

    state.statsd.incr("app.signup.count", &tags).await;
    let value = rand::rng().random_range(0..=100) as f64;
    state.statsd.histogram("app.signup.value", value, &tags).await;

    info!(tier, "user signed up");
    (
        StatusCode::CREATED,
        Json(json!({"message": "Signup successful!", "tier": tier})),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier::FixedTierSelector;
    use beacon_metrics::Registry;
    use beacon_statsd::StatsdClient;
    use std::sync::Arc;
    use std::time::Duration;

    fn test_state() -> AppState {
        AppState::new(
            Registry::new(),
            StatsdClient::disabled(),
            "test-host".to_string(),
            Duration::from_millis(0),
        )
        .unwrap()
    }

    async fn json_body(resp: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn home_reports_running() {
        let Json(body) = home(State(test_state())).await;
        assert_eq!(body.message, "Hello from beacon!");
        assert_eq!(body.hostname, "test-host");
        assert_eq!(body.status, "running");
        // RFC 3339 timestamps parse back.
        assert!(chrono::DateTime::parse_from_rfc3339(&body.timestamp).is_ok());
    }

    #[tokio::test]
    async fn health_is_healthy() {
        let Json(body) = health().await;
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn slow_eventually_responds() {
        let Json(body) = slow(State(test_state())).await;
        assert_eq!(body["message"], "This was slow!");
    }

    #[tokio::test]
    async fn error_returns_500_with_body() {
        let resp = error().await.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(resp).await;
        assert_eq!(body["error"], "Something went wrong!");
    }

    #[tokio::test]
    async fn metrics_returns_exposition_payload() {
        let state = test_state();
        state.metrics.requests.inc(&["GET", "/health", "200"]);

        let resp = metrics(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(content_type.contains("text/plain"));
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains(
            "beacon_request_count{method=\"GET\",endpoint=\"/health\",status=\"200\"} 1"
        ));
    }

    #[tokio::test]
    async fn signup_returns_201_and_a_tier() {
        let state = test_state().with_tier_selector(Arc::new(FixedTierSelector("premium")));

        let resp = signup(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body = json_body(resp).await;
        assert_eq!(body["message"], "Signup successful!");
        assert_eq!(body["tier"], "premium");
    }
}
