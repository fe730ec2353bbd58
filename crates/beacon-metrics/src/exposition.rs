//! Prometheus text exposition format.
//!
//! Renders the registry into the text format consumed by a Prometheus
//! server or compatible scraper: a `# HELP` / `# TYPE` preamble per family,
//! then one sample line per label combination. Series render in sorted
//! label order so output is deterministic.

use std::fmt::Write;

use crate::registry::Family;

/// Content type for the exposition payload.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub(crate) fn render(families: &[Family]) -> String {
    let mut out = String::new();
    for family in families {
        match family {
            Family::Counter(c) => {
                let inner = &c.inner;
                preamble(&mut out, &inner.name, &inner.help, "counter");
                for (values, count) in c.snapshot() {
                    let _ = writeln!(
                        out,
                        "{}{} {}",
                        inner.name,
                        label_block(&inner.label_names, &values, None),
                        count
                    );
                }
            }
            Family::Histogram(h) => {
                let inner = &h.inner;
                preamble(&mut out, &inner.name, &inner.help, "histogram");
                for (values, buckets, sum, count) in h.snapshot() {
                    let mut cumulative = 0u64;
                    for (bound, bucket) in inner.bounds.iter().zip(&buckets) {
                        cumulative += bucket;
                        let _ = writeln!(
                            out,
                            "{}_bucket{} {}",
                            inner.name,
                            label_block(&inner.label_names, &values, Some(&bound.to_string())),
                            cumulative
                        );
                    }
                    let _ = writeln!(
                        out,
                        "{}_bucket{} {}",
                        inner.name,
                        label_block(&inner.label_names, &values, Some("+Inf")),
                        count
                    );
                    let _ = writeln!(
                        out,
                        "{}_sum{} {}",
                        inner.name,
                        label_block(&inner.label_names, &values, None),
                        sum
                    );
                    let _ = writeln!(
                        out,
                        "{}_count{} {}",
                        inner.name,
                        label_block(&inner.label_names, &values, None),
                        count
                    );
                }
            }
            Family::Gauge(g) => {
                let inner = &g.inner;
                preamble(&mut out, &inner.name, &inner.help, "gauge");
                let _ = writeln!(out, "{} {}", inner.name, g.value());
            }
        }
    }
    out
}

fn preamble(out: &mut String, name: &str, help: &str, kind: &str) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} {kind}");
}

/// Format `{k1="v1",k2="v2"}`, optionally appending an `le` label.
/// Empty label sets render as nothing (bare metric name).
fn label_block(names: &[String], values: &[String], le: Option<&str>) -> String {
    let mut pairs: Vec<String> = names
        .iter()
        .zip(values)
        .map(|(name, value)| format!("{name}=\"{}\"", escape(value)))
        .collect();
    if let Some(le) = le {
        pairs.push(format!("le=\"{le}\""));
    }
    if pairs.is_empty() {
        String::new()
    } else {
        format!("{{{}}}", pairs.join(","))
    }
}

fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
