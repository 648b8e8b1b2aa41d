//! Work item execution span and metric helpers.

use super::metrics;
use opentelemetry::KeyValue;
use std::time::Instant;
use tracing::Span;

/// Start a span for one delivery attempt of a work item.
///
/// The `work_item.outcome` field is declared empty and can be filled via
/// [`record_outcome`].
pub fn start_work_item_span(work_item_type: &str, id: &str, attempt: u32) -> Span {
    tracing::info_span!(
        "work_item.process",
        "work_item.type" = work_item_type,
        "work_item.id" = id,
        "work_item.attempt" = attempt,
        "work_item.outcome" = tracing::field::Empty,
    )
}

/// Record how the attempt ended ("succeeded", "retry", "evicted", "cancelled").
pub fn record_outcome(span: &Span, outcome: &str) {
    span.record("work_item.outcome", outcome);
}

/// Records duration and result of one processing attempt when dropped.
///
/// The result is `failure` unless [`set_success`](Self::set_success) was
/// called, so an attempt that errors or is cancelled is still counted.
#[derive(Debug)]
pub struct JobTelemetryScope {
    work_item_type: String,
    started: Instant,
    success: bool,
}

impl JobTelemetryScope {
    pub fn begin(work_item_type: &str) -> Self {
        Self {
            work_item_type: work_item_type.to_string(),
            started: Instant::now(),
            success: false,
        }
    }

    pub fn set_success(&mut self) {
        self.success = true;
    }
}

impl Drop for JobTelemetryScope {
    fn drop(&mut self) {
        let result = if self.success { "success" } else { "failure" };
        let labels = [
            KeyValue::new("type", self.work_item_type.clone()),
            KeyValue::new("result", result),
        ];
        metrics::work_item_duration_ms()
            .record(self.started.elapsed().as_secs_f64() * 1000.0, &labels);
        metrics::work_items_processed().add(1, &labels);
    }
}
