//! Metric instrument factories for flowq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"flowq"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for flowq instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("flowq")
}

/// Counter: work items enqueued by producers.
/// Labels: `type`, `result` ("ok" | "error").
pub fn work_items_produced() -> Counter<u64> {
    meter()
        .u64_counter("flowq.work_items.produced")
        .with_description("Number of work items enqueued")
        .build()
}

/// Counter: work item processing attempts.
/// Labels: `type`, `result` ("success" | "failure").
pub fn work_items_processed() -> Counter<u64> {
    meter()
        .u64_counter("flowq.work_items.processed")
        .with_description("Number of work item processing attempts")
        .build()
}

/// Counter: messages deleted without successful processing.
/// Labels: `type`, `reason` ("malformed" | "non_retriable" | "max_attempts").
pub fn work_items_evicted() -> Counter<u64> {
    meter()
        .u64_counter("flowq.work_items.evicted")
        .with_description("Number of poison work item messages discarded")
        .build()
}

/// Counter: queue-level operations (create, send, read, delete).
/// Labels: `queue`, `operation`.
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("flowq.queue.operations")
        .with_description("Number of queue operations")
        .build()
}

/// Histogram: work item processing duration in milliseconds.
/// Labels: `type`, `result`.
pub fn work_item_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("flowq.work_item.duration_ms")
        .with_description("Work item processing duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: scope manager state transitions.
/// Labels: `from`, `to`.
pub fn processor_state_changes() -> Counter<u64> {
    meter()
        .u64_counter("flowq.processor.state_changes")
        .with_description("Number of work item processor state transitions")
        .build()
}
