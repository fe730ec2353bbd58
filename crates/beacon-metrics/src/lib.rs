//! beacon-metrics — process-wide instrumentation registry.
//!
//! A narrow per-process metrics layer for one HTTP server, not a general
//! metrics library. Three metric kinds:
//!
//! - [`Counter`] — monotonic, keyed by a label-value combination
//! - [`Histogram`] — bucketed latency distribution plus sum and count
//! - [`Gauge`] — up/down value (e.g. in-flight requests)
//!
//! Families are registered once at startup through [`Registry`]; registering
//! the same name twice is a configuration error and fails fast. Handles are
//! cheap clones and safe to mutate from any number of concurrent requests:
//! values are atomics, and a lock is taken only to create a series on first
//! touch.
//!
//! [`Registry::render`] serializes everything into the Prometheus text
//! exposition format for pull-based scraping.

pub mod exposition;
pub mod registry;

pub use exposition::CONTENT_TYPE;
pub use registry::{
    Counter, DEFAULT_LATENCY_BUCKETS, Gauge, Histogram, MetricError, Registry,
};
