//! Metric registry — counter/histogram/gauge families keyed by label sets.
//!
//! Uses a lock-free design for the hot path: atomics for every value, with
//! an `RwLock`-protected map touched only when a label combination is seen
//! for the first time. The registry itself holds the family list behind a
//! mutex that is taken for registration and rendering, never per update.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;
use tracing::debug;

/// Default histogram bounds, in seconds. Tuned for HTTP request latencies.
pub const DEFAULT_LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

#[derive(Debug, Error)]
pub enum MetricError {
    /// A metric with this name already exists. Registration happens once at
    /// startup, so a duplicate signals misconfiguration and the process
    /// should not serve traffic.
    #[error("metric `{0}` is already registered")]
    DuplicateName(String),
}

/// Process-wide metric registry. Cheap to clone; all clones share state.
#[derive(Clone, Default)]
pub struct Registry {
    families: Arc<Mutex<Vec<Family>>>,
}

pub(crate) enum Family {
    Counter(Counter),
    Histogram(Histogram),
    Gauge(Gauge),
}

impl Family {
    fn name(&self) -> &str {
        match self {
            Family::Counter(c) => &c.inner.name,
            Family::Histogram(h) => &h.inner.name,
            Family::Gauge(g) => &g.inner.name,
        }
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a counter family. Label values are supplied per increment,
    /// in the same order as `label_names`.
    pub fn counter(
        &self,
        name: &str,
        help: &str,
        label_names: &[&str],
    ) -> Result<Counter, MetricError> {
        let counter = Counter {
            inner: Arc::new(CounterInner {
                name: name.to_string(),
                help: help.to_string(),
                label_names: to_owned(label_names),
                series: RwLock::new(HashMap::new()),
            }),
        };
        self.register(name, Family::Counter(counter.clone()))?;
        Ok(counter)
    }

    /// Register a histogram family with the default latency buckets.
    pub fn histogram(
        &self,
        name: &str,
        help: &str,
        label_names: &[&str],
    ) -> Result<Histogram, MetricError> {
        self.histogram_with_buckets(name, help, label_names, DEFAULT_LATENCY_BUCKETS)
    }

    /// Register a histogram family with explicit bucket bounds.
    /// Bounds must be sorted ascending; an implicit `+Inf` bucket is added
    /// at render time.
    pub fn histogram_with_buckets(
        &self,
        name: &str,
        help: &str,
        label_names: &[&str],
        bounds: &[f64],
    ) -> Result<Histogram, MetricError> {
        let histogram = Histogram {
            inner: Arc::new(HistogramInner {
                name: name.to_string(),
                help: help.to_string(),
                label_names: to_owned(label_names),
                bounds: bounds.to_vec(),
                series: RwLock::new(HashMap::new()),
            }),
        };
        self.register(name, Family::Histogram(histogram.clone()))?;
        Ok(histogram)
    }

    /// Register an unlabeled gauge.
    pub fn gauge(&self, name: &str, help: &str) -> Result<Gauge, MetricError> {
        let gauge = Gauge {
            inner: Arc::new(GaugeInner {
                name: name.to_string(),
                help: help.to_string(),
                value: AtomicI64::new(0),
            }),
        };
        self.register(name, Family::Gauge(gauge.clone()))?;
        Ok(gauge)
    }

    fn register(&self, name: &str, family: Family) -> Result<(), MetricError> {
        let mut families = lock(&self.families);
        if families.iter().any(|f| f.name() == name) {
            return Err(MetricError::DuplicateName(name.to_string()));
        }
        families.push(family);
        debug!(metric = name, "metric family registered");
        Ok(())
    }

    /// Serialize every registered family into the Prometheus text format.
    ///
    /// Safe to call while other tasks mutate metrics; each value is read
    /// atomically but the snapshot is not atomic across families.
    pub fn render(&self) -> String {
        crate::exposition::render(&lock(&self.families))
    }
}

// ── Counter ────────────────────────────────────────────────────

/// Monotonic counter family. Never decreases; resets only on restart.
#[derive(Clone, Debug)]
pub struct Counter {
    pub(crate) inner: Arc<CounterInner>,
}

#[derive(Debug)]
pub(crate) struct CounterInner {
    pub(crate) name: String,
    pub(crate) help: String,
    pub(crate) label_names: Vec<String>,
    series: RwLock<HashMap<Vec<String>, Arc<AtomicU64>>>,
}

impl Counter {
    /// Increment the series for this label combination by one.
    pub fn inc(&self, label_values: &[&str]) {
        self.add(label_values, 1);
    }

    pub fn add(&self, label_values: &[&str], delta: u64) {
        debug_assert_eq!(label_values.len(), self.inner.label_names.len());
        self.cell(label_values).fetch_add(delta, Ordering::Relaxed);
    }

    /// Current value for a label combination; zero if never touched.
    pub fn value(&self, label_values: &[&str]) -> u64 {
        let key = to_owned_values(label_values);
        read(&self.inner.series)
            .get(&key)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn cell(&self, label_values: &[&str]) -> Arc<AtomicU64> {
        let key = to_owned_values(label_values);
        if let Some(cell) = read(&self.inner.series).get(&key) {
            return cell.clone();
        }
        let mut series = write(&self.inner.series);
        series
            .entry(key)
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .clone()
    }

    pub(crate) fn snapshot(&self) -> Vec<(Vec<String>, u64)> {
        let mut rows: Vec<_> = read(&self.inner.series)
            .iter()
            .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
            .collect();
        rows.sort();
        rows
    }
}

// ── Histogram ──────────────────────────────────────────────────

/// Latency distribution family: per-series bucket counts, sum, and count.
#[derive(Clone, Debug)]
pub struct Histogram {
    pub(crate) inner: Arc<HistogramInner>,
}

#[derive(Debug)]
pub(crate) struct HistogramInner {
    pub(crate) name: String,
    pub(crate) help: String,
    pub(crate) label_names: Vec<String>,
    pub(crate) bounds: Vec<f64>,
    series: RwLock<HashMap<Vec<String>, Arc<HistogramCell>>>,
}

#[derive(Debug)]
pub(crate) struct HistogramCell {
    /// One slot per bound, non-cumulative; made cumulative at render time.
    buckets: Vec<AtomicU64>,
    sum_bits: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    /// Record one observation (seconds for latency histograms).
    pub fn observe(&self, label_values: &[&str], value: f64) {
        debug_assert_eq!(label_values.len(), self.inner.label_names.len());
        let cell = self.cell(label_values);
        if let Some(idx) = self.inner.bounds.iter().position(|b| value <= *b) {
            cell.buckets[idx].fetch_add(1, Ordering::Relaxed);
        }
        add_f64(&cell.sum_bits, value);
        cell.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Sum of all observations for a label combination.
    pub fn sum(&self, label_values: &[&str]) -> f64 {
        let key = to_owned_values(label_values);
        read(&self.inner.series)
            .get(&key)
            .map(|c| f64::from_bits(c.sum_bits.load(Ordering::Relaxed)))
            .unwrap_or(0.0)
    }

    /// Number of observations for a label combination.
    pub fn count(&self, label_values: &[&str]) -> u64 {
        let key = to_owned_values(label_values);
        read(&self.inner.series)
            .get(&key)
            .map(|c| c.count.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn cell(&self, label_values: &[&str]) -> Arc<HistogramCell> {
        let key = to_owned_values(label_values);
        if let Some(cell) = read(&self.inner.series).get(&key) {
            return cell.clone();
        }
        let bounds = self.inner.bounds.len();
        let mut series = write(&self.inner.series);
        series
            .entry(key)
            .or_insert_with(|| {
                Arc::new(HistogramCell {
                    buckets: (0..bounds).map(|_| AtomicU64::new(0)).collect(),
                    sum_bits: AtomicU64::new(0.0_f64.to_bits()),
                    count: AtomicU64::new(0),
                })
            })
            .clone()
    }

    pub(crate) fn snapshot(&self) -> Vec<(Vec<String>, Vec<u64>, f64, u64)> {
        let mut rows: Vec<_> = read(&self.inner.series)
            .iter()
            .map(|(k, c)| {
                (
                    k.clone(),
                    c.buckets.iter().map(|b| b.load(Ordering::Relaxed)).collect(),
                    f64::from_bits(c.sum_bits.load(Ordering::Relaxed)),
                    c.count.load(Ordering::Relaxed),
                )
            })
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }
}

// ── Gauge ──────────────────────────────────────────────────────

/// Up/down value representing current state, e.g. in-flight request count.
#[derive(Clone, Debug)]
pub struct Gauge {
    pub(crate) inner: Arc<GaugeInner>,
}

#[derive(Debug)]
pub(crate) struct GaugeInner {
    pub(crate) name: String,
    pub(crate) help: String,
    value: AtomicI64,
}

impl Gauge {
    pub fn inc(&self) {
        self.inner.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.inner.value.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn set(&self, value: i64) {
        self.inner.value.store(value, Ordering::Relaxed);
    }

    pub fn value(&self) -> i64 {
        self.inner.value.load(Ordering::Relaxed)
    }
}

// ── helpers ────────────────────────────────────────────────────

/// Atomic f64 add via CAS on the bit pattern.
fn add_f64(bits: &AtomicU64, delta: f64) {
    let mut current = bits.load(Ordering::Relaxed);
    loop {
        let next = (f64::from_bits(current) + delta).to_bits();
        match bits.compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return,
            Err(actual) => current = actual,
        }
    }
}

fn to_owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

fn to_owned_values(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

// Lock poisoning only happens if a panic occurred mid-update; metric state
// stays usable, so recover the guard instead of propagating.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(l: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(l: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    l.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_starts_at_zero_and_increments() {
        let registry = Registry::new();
        let requests = registry
            .counter("requests_total", "Total requests.", &["method"])
            .unwrap();

        assert_eq!(requests.value(&["GET"]), 0);
        requests.inc(&["GET"]);
        requests.inc(&["GET"]);
        requests.inc(&["POST"]);

        assert_eq!(requests.value(&["GET"]), 2);
        assert_eq!(requests.value(&["POST"]), 1);
    }

    #[test]
    fn duplicate_registration_fails() {
        let registry = Registry::new();
        registry.counter("hits", "Hits.", &[]).unwrap();

        let err = registry.counter("hits", "Hits again.", &[]).unwrap_err();
        assert!(matches!(err, MetricError::DuplicateName(name) if name == "hits"));

        // Same name across kinds is also a duplicate.
        assert!(registry.gauge("hits", "Hits gauge.").is_err());
    }

    #[test]
    fn gauge_moves_both_directions() {
        let registry = Registry::new();
        let active = registry.gauge("active", "Active requests.").unwrap();

        active.inc();
        active.inc();
        assert_eq!(active.value(), 2);
        active.dec();
        assert_eq!(active.value(), 1);
        active.set(-3);
        assert_eq!(active.value(), -3);
    }

    #[test]
    fn histogram_buckets_sum_and_count() {
        let registry = Registry::new();
        let latency = registry
            .histogram_with_buckets("latency", "Latency.", &["endpoint"], &[0.1, 1.0])
            .unwrap();

        latency.observe(&["/"], 0.05);
        latency.observe(&["/"], 0.5);
        latency.observe(&["/"], 5.0); // beyond the last bound, lands in +Inf only

        assert_eq!(latency.count(&["/"]), 3);
        let sum = latency.sum(&["/"]);
        assert!((sum - 5.55).abs() < 1e-9, "sum was {sum}");
    }

    #[test]
    fn concurrent_increments_are_lossless() {
        let registry = Registry::new();
        let hits = registry.counter("hits", "Hits.", &["worker"]).unwrap();

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let hits = hits.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        hits.inc(&["w"]);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(hits.value(&["w"]), 8000);
    }

    #[test]
    fn atomic_f64_accumulates() {
        let bits = AtomicU64::new(0.0_f64.to_bits());
        add_f64(&bits, 1.5);
        add_f64(&bits, 2.25);
        assert_eq!(f64::from_bits(bits.load(Ordering::Relaxed)), 3.75);
    }
}
