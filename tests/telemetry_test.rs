//! Integration tests for telemetry initialization and span helpers.

use flowq::telemetry::work::{JobTelemetryScope, record_outcome, start_work_item_span};

#[test]
fn telemetry_initializes_without_endpoint() {
    // Note: tracing subscriber can only be set once per process.
    let config = flowq::telemetry::TelemetryConfig {
        endpoint: None,
        service_name: "flowq-test".to_string(),
        replica_name: "test-replica".to_string(),
        log_level: "debug".to_string(),
    };
    // This may return Err if a global subscriber was already set by
    // another test in this process; that is acceptable.
    let _guard = flowq::telemetry::init_telemetry(config);
}

#[test]
fn work_item_span_records_outcome() {
    let span = start_work_item_span("TextWorkItem", "abc", 2);
    let _enter = span.enter();
    record_outcome(&span, "retry");
}

#[test]
fn job_telemetry_scope_records_on_drop() {
    let mut ok = JobTelemetryScope::begin("TextWorkItem");
    ok.set_success();
    drop(ok);

    // Never marked successful: counted as a failure
    drop(JobTelemetryScope::begin("TextWorkItem"));
}
