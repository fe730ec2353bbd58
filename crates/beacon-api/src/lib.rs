//! beacon-api — HTTP surface of the beacon demo service.
//!
//! Provides axum route handlers plus the request timing middleware that
//! wraps every dispatch. All shared state is carried in [`AppState`] and
//! injected explicitly; there is no ambient global registry.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/` | Service banner (message, timestamp, hostname, status) |
//! | GET | `/health` | Health check |
//! | GET | `/slow` | Delayed response, exercises latency instrumentation |
//! | GET | `/error` | Always 500, exercises error-path metrics |
//! | GET | `/metrics` | Prometheus exposition |
//! | POST | `/signup` | Simulated signup with random tier classification |

pub mod handlers;
pub mod middleware;
pub mod tier;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};

use beacon_metrics::{MetricError, Registry};
use beacon_statsd::StatsdClient;

use crate::middleware::HttpMetrics;
use crate::tier::{TierSelector, UniformTierSelector};

/// Shared state for every handler and the timing middleware.
#[derive(Clone)]
pub struct AppState {
    pub registry: Registry,
    pub metrics: HttpMetrics,
    pub statsd: StatsdClient,
    pub tiers: Arc<dyn TierSelector>,
    pub hostname: Arc<str>,
    /// How long `/slow` sleeps before responding.
    pub slow_delay: Duration,
}

impl AppState {
    /// Register the HTTP metric families and assemble the state.
    ///
    /// Fails if any metric name is already taken in `registry`; the caller
    /// must treat that as fatal misconfiguration.
    pub fn new(
        registry: Registry,
        statsd: StatsdClient,
        hostname: String,
        slow_delay: Duration,
    ) -> Result<Self, MetricError> {
        let metrics = HttpMetrics::register(&registry)?;
        Ok(Self {
            registry,
            metrics,
            statsd,
            tiers: Arc::new(UniformTierSelector),
            hostname: hostname.into(),
            slow_delay,
        })
    }

    /// Swap the tier selection strategy (tests use a deterministic one).
    pub fn with_tier_selector(mut self, tiers: Arc<dyn TierSelector>) -> Self {
        self.tiers = tiers;
        self
    }
}

/// Build the complete router with the timing middleware wrapped around
/// every route, `/metrics` included.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::home))
        .route("/health", get(handlers::health))
        .route("/slow", get(handlers::slow))
        .route("/error", get(handlers::error))
        .route("/metrics", get(handlers::metrics))
        .route("/signup", post(handlers::signup))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::track_requests,
        ))
        .with_state(state)
}
