//! Logging, tracing and metrics setup.
//!
//! Every process logs through `tracing` to stdout. With an OTLP endpoint
//! configured, spans, metrics and log records are also exported over gRPC,
//! tagged with the service name and the replica they came from.

pub mod metrics;
pub mod work;

use crate::error::{Error, Result};
use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::WithExportConfig as _;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

const TRACER_NAME: &str = "flowq";

pub struct TelemetryConfig {
    /// OTLP/gRPC collector, e.g. "http://localhost:4317". `None` means
    /// stdout only.
    pub endpoint: Option<String>,
    pub service_name: String,
    /// Reported as `service.instance.id`.
    pub replica_name: String,
    /// Filter directive used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl TelemetryConfig {
    fn resource(&self) -> Resource {
        Resource::builder()
            .with_service_name(self.service_name.clone())
            .with_attribute(KeyValue::new(
                "service.instance.id",
                self.replica_name.clone(),
            ))
            .build()
    }
}

/// The three OTLP export pipelines.
struct OtlpPipelines {
    tracer_provider: SdkTracerProvider,
    meter_provider: SdkMeterProvider,
    logger_provider: SdkLoggerProvider,
}

impl OtlpPipelines {
    fn build(endpoint: &str, resource: Resource) -> Result<Self> {
        let spans = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| exporter_error("span", e))?;
        let tracer_provider = SdkTracerProvider::builder()
            .with_batch_exporter(spans)
            .with_resource(resource.clone())
            .build();

        let metrics = opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| exporter_error("metric", e))?;
        let meter_provider = SdkMeterProvider::builder()
            .with_periodic_exporter(metrics)
            .with_resource(resource.clone())
            .build();

        let logs = opentelemetry_otlp::LogExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| exporter_error("log", e))?;
        let logger_provider = SdkLoggerProvider::builder()
            .with_batch_exporter(logs)
            .with_resource(resource)
            .build();

        Ok(Self {
            tracer_provider,
            meter_provider,
            logger_provider,
        })
    }

    fn force_flush(&self) {
        let _ = self.tracer_provider.force_flush();
        let _ = self.meter_provider.force_flush();
        let _ = self.logger_provider.force_flush();
    }

    /// Logs first, so records emitted while spans close still go out.
    fn shutdown(self) {
        let _ = self.logger_provider.shutdown();
        let _ = self.meter_provider.shutdown();
        let _ = self.tracer_provider.shutdown();
    }
}

fn exporter_error(signal: &str, e: impl std::fmt::Display) -> Error {
    Error::Other(format!("failed to create OTLP {signal} exporter: {e}"))
}

/// Keeps the export pipelines alive; flushes and shuts them down on drop.
///
/// Hold it for the lifetime of the process.
pub struct TelemetryGuard {
    otlp: Option<OtlpPipelines>,
}

impl TelemetryGuard {
    /// Push buffered spans, metrics and logs to the collector now.
    pub fn force_flush(&self) {
        if let Some(otlp) = &self.otlp {
            otlp.force_flush();
        }
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(otlp) = self.otlp.take() {
            otlp.shutdown();
        }
    }
}

/// Install the global tracing subscriber and, if configured, the OTLP
/// pipelines.
///
/// # Errors
///
/// Fails if an exporter cannot be built or a global subscriber is already
/// installed.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let otlp = config
        .endpoint
        .as_deref()
        .map(|endpoint| OtlpPipelines::build(endpoint, config.resource()))
        .transpose()?;

    if let Some(otlp) = &otlp {
        opentelemetry::global::set_meter_provider(otlp.meter_provider.clone());
    }
    let trace_layer = otlp.as_ref().map(|otlp| {
        tracing_opentelemetry::layer().with_tracer(otlp.tracer_provider.tracer(TRACER_NAME))
    });
    let log_layer = otlp
        .as_ref()
        .map(|otlp| OpenTelemetryTracingBridge::new(&otlp.logger_provider));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .with(trace_layer)
        .with(log_layer)
        .try_init()
        .map_err(|e| Error::Other(format!("failed to init tracing subscriber: {e}")))?;

    Ok(TelemetryGuard { otlp })
}
