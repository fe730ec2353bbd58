//! Request timing middleware.
//!
//! Wraps every route dispatch: the entry hook notes the start instant and
//! raises the in-flight gauge, the exit hook records latency and the
//! (method, endpoint, status) counter and lowers the gauge. Exit
//! accounting is owned by a scope guard, so it runs exactly once on every
//! path out of a request, including an unwind or an aborted future.

use std::time::Instant;

use axum::extract::{MatchedPath, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;

use beacon_metrics::{Counter, Gauge, Histogram, MetricError, Registry};

use crate::AppState;

/// Handles to the per-request metric families.
#[derive(Clone)]
pub struct HttpMetrics {
    /// (method, endpoint, status) request counter.
    pub requests: Counter,
    /// Per-endpoint latency histogram, in seconds.
    pub latency: Histogram,
    /// Requests currently being processed.
    pub in_flight: Gauge,
}

impl HttpMetrics {
    pub fn register(registry: &Registry) -> Result<Self, MetricError> {
        Ok(Self {
            requests: registry.counter(
                "beacon_request_count",
                "Total request count.",
                &["method", "endpoint", "status"],
            )?,
            latency: registry.histogram(
                "beacon_request_latency_seconds",
                "Request latency in seconds.",
                &["endpoint"],
            )?,
            in_flight: registry.gauge(
                "beacon_active_requests",
                "Number of requests currently being processed.",
            )?,
        })
    }
}

/// axum middleware: time the inner handler and record request metrics.
pub async fn track_requests(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    // Prefer the matched route template so path parameters do not explode
    // label cardinality.
    let endpoint = req
        .extensions()
        .get::<MatchedPath>()
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let timer = RequestTimer::start(state.metrics.clone(), method, endpoint);
    let res = next.run(req).await;
    timer.finish(res.status().as_u16());
    res
}

/// Per-request scope guard. Created at entry, consumed by [`finish`];
/// if the request future never completes (panic unwind, upstream abort),
/// `Drop` records the exit with status 500 so the gauge still rebalances.
///
/// [`finish`]: RequestTimer::finish
pub struct RequestTimer {
    metrics: HttpMetrics,
    method: String,
    endpoint: String,
    started: Instant,
    recorded: bool,
}

impl RequestTimer {
    pub fn start(metrics: HttpMetrics, method: String, endpoint: String) -> Self {
        metrics.in_flight.inc();
        Self {
            metrics,
            method,
            endpoint,
            started: Instant::now(),
            recorded: false,
        }
    }

    pub fn finish(mut self, status: u16) {
        self.record(status);
    }

    fn record(&mut self, status: u16) {
        if std::mem::replace(&mut self.recorded, true) {
            return;
        }
        let elapsed = self.started.elapsed().as_secs_f64();
        self.metrics.latency.observe(&[&self.endpoint], elapsed);
        self.metrics
            .requests
            .inc(&[&self.method, &self.endpoint, &status.to_string()]);
        self.metrics.in_flight.dec();
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        self.record(StatusCode::INTERNAL_SERVER_ERROR.as_u16());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_metrics() -> HttpMetrics {
        HttpMetrics::register(&Registry::new()).unwrap()
    }

    #[test]
    fn finish_records_counter_latency_and_gauge() {
        let metrics = test_metrics();

        let timer = RequestTimer::start(metrics.clone(), "GET".into(), "/health".into());
        assert_eq!(metrics.in_flight.value(), 1);
        timer.finish(200);

        assert_eq!(metrics.in_flight.value(), 0);
        assert_eq!(metrics.requests.value(&["GET", "/health", "200"]), 1);
        assert_eq!(metrics.latency.count(&["/health"]), 1);
        assert!(metrics.latency.sum(&["/health"]) >= 0.0);
    }

    #[test]
    fn drop_without_finish_records_a_500() {
        let metrics = test_metrics();

        {
            let _timer = RequestTimer::start(metrics.clone(), "GET".into(), "/".into());
            assert_eq!(metrics.in_flight.value(), 1);
            // Dropped here without finish(), as when a handler unwinds.
        }

        assert_eq!(metrics.in_flight.value(), 0);
        assert_eq!(metrics.requests.value(&["GET", "/", "500"]), 1);
        assert_eq!(metrics.latency.count(&["/"]), 1);
    }

    #[test]
    fn exit_accounting_happens_once() {
        let metrics = test_metrics();

        let timer = RequestTimer::start(metrics.clone(), "GET".into(), "/".into());
        // finish consumes the timer; its Drop must not double-record.
        timer.finish(200);

        assert_eq!(metrics.requests.value(&["GET", "/", "200"]), 1);
        assert_eq!(metrics.requests.value(&["GET", "/", "500"]), 0);
        assert_eq!(metrics.in_flight.value(), 0);
    }

    #[test]
    fn concurrent_timers_balance_the_gauge() {
        let metrics = test_metrics();

        let timers: Vec<_> = (0..16)
            .map(|_| RequestTimer::start(metrics.clone(), "GET".into(), "/health".into()))
            .collect();
        assert_eq!(metrics.in_flight.value(), 16);

        for timer in timers {
            timer.finish(200);
        }
        assert_eq!(metrics.in_flight.value(), 0);
        assert_eq!(metrics.requests.value(&["GET", "/health", "200"]), 16);
    }
}
