//! In-process request metrics.
//!
//! Counters and latency histograms shared by every request handler. All
//! state sits behind one mutex so a scrape never observes a torn
//! (count, sum) pair for the same path. Nothing here is persisted; the
//! numbers reset with the process.

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::{Mutex, PoisonError};

/// Latency histogram bucket boundaries, in milliseconds. A trailing `+Inf`
/// bucket counts every sample.
const LATENCY_BUCKETS_MS: [u64; 3] = [100, 500, 1000];

/// Terminal result of one webhook ingestion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Created,
    Duplicate,
    InvalidSignature,
    ValidationError,
}

impl WebhookOutcome {
    /// Label used in metrics and log events.
    pub fn as_str(self) -> &'static str {
        match self {
            WebhookOutcome::Created => "created",
            WebhookOutcome::Duplicate => "duplicate",
            WebhookOutcome::InvalidSignature => "invalid_signature",
            WebhookOutcome::ValidationError => "validation_error",
        }
    }
}

/// One path's latency series: cumulative bucket counts (one slot per
/// boundary plus `+Inf`), total count, and full-precision running sum.
#[derive(Default)]
struct LatencySeries {
    buckets: [u64; LATENCY_BUCKETS_MS.len() + 1],
    count: u64,
    sum: f64,
}

#[derive(Default)]
struct MetricsInner {
    http: HashMap<(String, u16), u64>,
    webhook: HashMap<&'static str, u64>,
    latency: HashMap<String, LatencySeries>,
}

/// Shared metrics registry.
#[derive(Default)]
pub struct Metrics {
    inner: Mutex<MetricsInner>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MetricsInner> {
        // A panic while holding this lock leaves the counters usable
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count one HTTP response for (path, status).
    pub fn inc_http(&self, path: &str, status: u16) {
        let mut inner = self.lock();
        *inner.http.entry((path.to_string(), status)).or_insert(0) += 1;
    }

    /// Count one webhook ingestion outcome.
    pub fn inc_webhook(&self, outcome: WebhookOutcome) {
        let mut inner = self.lock();
        *inner.webhook.entry(outcome.as_str()).or_insert(0) += 1;
    }

    /// Record one request latency sample for `path`.
    ///
    /// Buckets are cumulative: a sample at or below a boundary increments
    /// that bucket and every larger one, `+Inf` included.
    pub fn observe_latency(&self, path: &str, latency_ms: f64) {
        let mut inner = self.lock();
        let series = inner.latency.entry(path.to_string()).or_default();
        for (slot, boundary) in series.buckets.iter_mut().zip(LATENCY_BUCKETS_MS) {
            if latency_ms <= boundary as f64 {
                *slot += 1;
            }
        }
        series.buckets[LATENCY_BUCKETS_MS.len()] += 1;
        series.count += 1;
        series.sum += latency_ms;
    }

    /// Plain-text exposition, one line per metric.
    ///
    /// Line order across runs may vary (map iteration); values are exact.
    /// Sums are rounded to two decimals for display only; accumulation
    /// keeps full precision.
    pub fn render_text(&self) -> String {
        let inner = self.lock();
        let mut out = String::new();

        for ((path, status), value) in &inner.http {
            let _ = writeln!(
                out,
                "http_requests_total{{path=\"{path}\",status=\"{status}\"}} {value}"
            );
        }
        for (result, value) in &inner.webhook {
            let _ = writeln!(out, "webhook_requests_total{{result=\"{result}\"}} {value}");
        }
        for (path, series) in &inner.latency {
            for (i, boundary) in LATENCY_BUCKETS_MS.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "request_latency_ms_bucket{{path=\"{path}\",le=\"{boundary}\"}} {}",
                    series.buckets[i]
                );
            }
            let _ = writeln!(
                out,
                "request_latency_ms_bucket{{path=\"{path}\",le=\"+Inf\"}} {}",
                series.buckets[LATENCY_BUCKETS_MS.len()]
            );
            let _ = writeln!(
                out,
                "request_latency_ms_count{{path=\"{path}\"}} {}",
                series.count
            );
            let _ = writeln!(
                out,
                "request_latency_ms_sum{{path=\"{path}\"}} {}",
                (series.sum * 100.0).round() / 100.0
            );
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_http_counter_accumulates_per_key() {
        let metrics = Metrics::new();
        metrics.inc_http("/webhook", 200);
        metrics.inc_http("/webhook", 200);
        metrics.inc_http("/webhook", 401);
        metrics.inc_http("/messages", 200);

        let text = metrics.render_text();
        assert!(text.contains("http_requests_total{path=\"/webhook\",status=\"200\"} 2"));
        assert!(text.contains("http_requests_total{path=\"/webhook\",status=\"401\"} 1"));
        assert!(text.contains("http_requests_total{path=\"/messages\",status=\"200\"} 1"));
    }

    #[test]
    fn test_webhook_counter() {
        let metrics = Metrics::new();
        metrics.inc_webhook(WebhookOutcome::Created);
        metrics.inc_webhook(WebhookOutcome::Duplicate);
        metrics.inc_webhook(WebhookOutcome::Duplicate);

        let text = metrics.render_text();
        assert!(text.contains("webhook_requests_total{result=\"created\"} 1"));
        assert!(text.contains("webhook_requests_total{result=\"duplicate\"} 2"));
    }

    #[test]
    fn test_latency_buckets_are_cumulative() {
        let metrics = Metrics::new();
        metrics.observe_latency("/webhook", 50.0);
        metrics.observe_latency("/webhook", 100.0); // boundary is inclusive
        metrics.observe_latency("/webhook", 750.0);
        metrics.observe_latency("/webhook", 5000.0);

        let text = metrics.render_text();
        assert!(text.contains("request_latency_ms_bucket{path=\"/webhook\",le=\"100\"} 2"));
        assert!(text.contains("request_latency_ms_bucket{path=\"/webhook\",le=\"500\"} 2"));
        assert!(text.contains("request_latency_ms_bucket{path=\"/webhook\",le=\"1000\"} 3"));
        assert!(text.contains("request_latency_ms_bucket{path=\"/webhook\",le=\"+Inf\"} 4"));
        assert!(text.contains("request_latency_ms_count{path=\"/webhook\"} 4"));
        assert!(text.contains("request_latency_ms_sum{path=\"/webhook\"} 5900"));
    }

    #[test]
    fn test_sum_rounds_to_two_decimals_for_display() {
        let metrics = Metrics::new();
        metrics.observe_latency("/stats", 0.125);
        metrics.observe_latency("/stats", 0.25);

        let text = metrics.render_text();
        assert!(text.contains("request_latency_ms_sum{path=\"/stats\"} 0.38"));
    }

    #[test]
    fn test_no_updates_are_lost_under_concurrency() {
        let metrics = Arc::new(Metrics::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let metrics = Arc::clone(&metrics);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    metrics.inc_http("/webhook", 200);
                    metrics.observe_latency("/webhook", 1.0);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let text = metrics.render_text();
        assert!(text.contains("http_requests_total{path=\"/webhook\",status=\"200\"} 8000"));
        assert!(text.contains("request_latency_ms_count{path=\"/webhook\"} 8000"));
        assert!(text.contains("request_latency_ms_sum{path=\"/webhook\"} 8000"));
    }
}
