//! # Telemetry
//!
//! Structured logging is always on: `tracing` events and spans are written to
//! the console through `tracing_subscriber::fmt`, filtered by `RUST_LOG`
//! (default `info`), either pretty-printed or as JSON lines (`LOG_FORMAT`).
//!
//! On top of that, spans and metrics can be exported through OpenTelemetry.
//!
//! ## Feature matrix
//!
//! - `otel`: Exports spans via OpenTelemetry.
//! - `metrics`: Enables OpenTelemetry metrics (counters, histograms).
//! - `honeycomb`: Enables the Honeycomb OTLP exporter.
//! - `stdout`: Enables the stdout OTLP exporter.
//!
//! ## Feature constraints
//!
//! - Exporters require using at least one of: `otel` or `metrics`.
//! - Both `honeycomb` and `stdout` exporters can be enabled at the same time.
//!
//! ## Metrics
//!
//! - `requests` / `request_errors`: per operation (and error kind).
//! - `streams_inflight`, `stream_duration`, `records_streamed`: list calls.
//!
//! Every recording function compiles to a no-op without `metrics`.
//!
//! ## Example usage
//!
//! ```bash
//! cargo run --bin blog-server --features otel,metrics,honeycomb
//! cargo run --bin blog-server --features otel,stdout
//! ```

// Disallow using `honeycomb` without `otel` or `metrics`
#[cfg(all(
    feature = "honeycomb",
    not(any(feature = "otel", feature = "metrics"))
))]
compile_error!(
    "The 'honeycomb' feature requires at least one of 'otel' or 'metrics' to be enabled."
);

// Disallow using `stdout` without `otel` or `metrics`
#[cfg(all(feature = "stdout", not(any(feature = "otel", feature = "metrics"))))]
compile_error!(
    "The 'stdout' feature requires at least one of 'otel' or 'metrics' to be enabled."
);

use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(any(feature = "stdout", feature = "honeycomb"))]
const EXPORT_INTERVAL: core::time::Duration = core::time::Duration::from_secs(5);
#[cfg(feature = "honeycomb")]
const EXPORT_TIMEOUT: core::time::Duration = core::time::Duration::from_secs(10);

// Honeycomb-specific imports
#[cfg(all(feature = "honeycomb", any(feature = "metrics", feature = "otel")))]
use opentelemetry_otlp::{Compression, Protocol, WithExportConfig, WithTonicConfig};
#[cfg(all(feature = "honeycomb", feature = "metrics"))]
use opentelemetry_sdk::metrics::Temporality;
#[cfg(feature = "honeycomb")]
use tonic::metadata::MetadataMap;
#[cfg(all(feature = "honeycomb", any(feature = "metrics", feature = "otel")))]
use tonic::transport::ClientTlsConfig;

// Metrics-specific imports
#[cfg(feature = "metrics")]
use opentelemetry::metrics::{Counter, Histogram, Meter, UpDownCounter};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::metrics as sdkmetrics;
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

// Either
#[cfg(any(feature = "metrics", feature = "otel"))]
use opentelemetry::{InstrumentationScope, KeyValue};
#[cfg(any(feature = "metrics", feature = "otel"))]
use opentelemetry_sdk::Resource;
#[cfg(any(feature = "metrics", feature = "otel"))]
use opentelemetry_semantic_conventions as semvcns;

// Tracing-specific imports
#[cfg(feature = "otel")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "otel")]
use opentelemetry_sdk::propagation::TraceContextPropagator;
#[cfg(feature = "otel")]
use opentelemetry_sdk::trace as sdktrace;

pub struct TelemetryProviders {
    #[cfg(feature = "otel")]
    pub tracer_provider: sdktrace::SdkTracerProvider,
    #[cfg(feature = "metrics")]
    pub meter_provider: sdkmetrics::SdkMeterProvider,
}

impl TelemetryProviders {
    /// Flushes and shuts down the exporters. Errors are reported on stderr
    /// since the subscriber may already be gone.
    pub fn shutdown(self) {
        #[cfg(feature = "otel")]
        {
            if let Err(err) = self.tracer_provider.force_flush() {
                eprintln!("Error flushing traces: {err:#?}");
            }
            if let Err(err) = self.tracer_provider.shutdown() {
                eprintln!("Error shutting down tracer: {err:#?}");
            }
        }

        #[cfg(feature = "metrics")]
        {
            if let Err(err) = self.meter_provider.force_flush() {
                eprintln!("Error flushing metrics: {err:#?}");
            }
            if let Err(err) = self.meter_provider.shutdown() {
                eprintln!("Error shutting down meter: {err:#?}");
            }
        }
    }
}

/// Console output format of the `fmt` layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Multi-line, human readable.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

pub fn init_telemetry(format: LogFormat) -> anyhow::Result<TelemetryProviders> {
    #[cfg(feature = "otel")]
    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

    #[cfg(feature = "otel")]
    let tracer_provider = init_tracer()?;

    #[cfg(feature = "metrics")]
    let meter_provider = init_metrics()?;

    #[cfg(any(feature = "metrics", feature = "otel"))]
    let scope = InstrumentationScope::builder("blog-server")
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semvcns::SCHEMA_URL)
        .build();

    // Console output is always on and unrelated to the `opentelemetry_stdout`
    // exporter.
    let fmt = tracing_subscriber::fmt::layer()
        .with_thread_ids(true)
        .with_line_number(true)
        .with_target(false)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_file(true);
    let fmt = match format {
        LogFormat::Pretty => fmt.pretty().boxed(),
        LogFormat::Json => fmt.json().with_current_span(true).boxed(),
    };

    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(fmt);

    #[cfg(feature = "otel")]
    let registry = {
        opentelemetry::global::set_tracer_provider(tracer_provider.clone());
        registry.with(
            tracing_opentelemetry::layer()
                .with_tracer(tracer_provider.tracer_with_scope(scope.clone()))
                .with_error_records_to_exceptions(true),
        )
    };

    #[cfg(feature = "metrics")]
    let registry = {
        opentelemetry::global::set_meter_provider(meter_provider.clone());
        let meter = opentelemetry::global::meter_with_scope(scope);
        init_metric_handles(meter);
        registry.with(tracing_opentelemetry::MetricsLayer::new(
            meter_provider.clone(),
        ))
    };

    registry.try_init()?;

    Ok(TelemetryProviders {
        #[cfg(feature = "otel")]
        tracer_provider,
        #[cfg(feature = "metrics")]
        meter_provider,
    })
}

/// Connection settings for the Honeycomb OTLP endpoint, read from
/// `HONEYCOMB_API_KEY`, `HONEYCOMB_DATASET`, `HONEYCOMB_ENDPOINT` and
/// `HONEYCOMB_COMPRESSION`.
#[cfg(feature = "honeycomb")]
struct HoneycombSettings {
    metadata: MetadataMap,
    endpoint: String,
    compression: Compression,
}

#[cfg(feature = "honeycomb")]
impl HoneycombSettings {
    fn from_env() -> anyhow::Result<Self> {
        use anyhow::Context;
        use std::str::FromStr;

        let var = |name: &str| std::env::var(name).with_context(|| format!("missing `{name}`"));

        let mut metadata = MetadataMap::new();
        metadata.insert(
            "x-honeycomb-team",
            var("HONEYCOMB_API_KEY")?.parse().context("invalid API key")?,
        );
        metadata.insert(
            "x-honeycomb-dataset",
            var("HONEYCOMB_DATASET")?.parse().context("invalid dataset")?,
        );

        Ok(Self {
            metadata,
            endpoint: var("HONEYCOMB_ENDPOINT")?,
            compression: Compression::from_str(&var("HONEYCOMB_COMPRESSION")?.to_ascii_lowercase())?,
        })
    }
}

#[cfg(any(feature = "metrics", feature = "otel"))]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name("blog-server")
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

#[cfg(feature = "metrics")]
fn init_metrics() -> anyhow::Result<sdkmetrics::SdkMeterProvider> {
    let builder = sdkmetrics::SdkMeterProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = {
        let reader = sdkmetrics::PeriodicReader::builder(opentelemetry_stdout::MetricExporter::default())
            .with_interval(EXPORT_INTERVAL)
            .build();
        builder.with_reader(reader)
    };

    #[cfg(feature = "honeycomb")]
    let builder = {
        use anyhow::Context;

        let settings = HoneycombSettings::from_env()?;
        let exporter = opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .with_tls_config(ClientTlsConfig::new().with_native_roots())
            .with_metadata(settings.metadata)
            .with_timeout(EXPORT_TIMEOUT)
            .with_compression(settings.compression)
            .with_endpoint(settings.endpoint)
            .with_protocol(Protocol::Grpc)
            .with_temporality(Temporality::Delta)
            .build()
            .context("failed to build metrics exporter")?;
        builder.with_periodic_exporter(exporter)
    };

    Ok(builder.build())
}

#[cfg(all(feature = "otel", any(feature = "stdout", feature = "honeycomb")))]
fn batch<E: opentelemetry_sdk::trace::SpanExporter + 'static>(
    exporter: E,
) -> sdktrace::BatchSpanProcessor {
    sdktrace::BatchSpanProcessor::builder(exporter)
        .with_batch_config(
            sdktrace::BatchConfigBuilder::default()
                .with_scheduled_delay(EXPORT_INTERVAL)
                .with_max_queue_size(2048)
                .build(),
        )
        .build()
}

#[cfg(feature = "otel")]
fn init_tracer() -> anyhow::Result<sdktrace::SdkTracerProvider> {
    let builder = sdktrace::SdkTracerProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = builder.with_span_processor(batch(opentelemetry_stdout::SpanExporter::default()));

    #[cfg(feature = "honeycomb")]
    let builder = {
        use anyhow::Context;

        let settings = HoneycombSettings::from_env()?;
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_tls_config(ClientTlsConfig::new().with_native_roots())
            .with_metadata(settings.metadata)
            .with_timeout(EXPORT_TIMEOUT)
            .with_compression(settings.compression)
            .with_endpoint(settings.endpoint)
            .with_protocol(Protocol::Grpc)
            .build()
            .context("failed to build tracer exporter")?;
        builder.with_span_processor(batch(exporter))
    };

    Ok(builder.build())
}

// Metric handles - only compiled when metrics feature is enabled
#[cfg(feature = "metrics")]
static REQUESTS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static REQUEST_ERRORS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static STREAMS_INFLIGHT: OnceLock<UpDownCounter<i64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static STREAM_DURATION_MS: OnceLock<Histogram<f64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static RECORDS_STREAMED: OnceLock<Counter<u64>> = OnceLock::new();

#[cfg(feature = "metrics")]
fn init_metric_handles(meter: Meter) {
    let _ = REQUESTS.set(
        meter
            .u64_counter("requests")
            .with_description("Total gRPC requests by operation")
            .build(),
    );

    let _ = REQUEST_ERRORS.set(
        meter
            .u64_counter("request_errors")
            .with_description("Failed or cancelled requests by operation and error kind")
            .build(),
    );

    let _ = STREAMS_INFLIGHT.set(
        meter
            .i64_up_down_counter("streams_inflight")
            .with_description("Concurrent list streams")
            .build(),
    );

    let _ = STREAM_DURATION_MS.set(
        meter
            .f64_histogram("stream_duration")
            .with_unit("ms")
            .with_description("End-to-end list stream duration")
            .build(),
    );

    let _ = RECORDS_STREAMED.set(
        meter
            .u64_counter("records_streamed")
            .with_description("Total blog records streamed to clients")
            .build(),
    );
}

// Convenience functions that compile to no-ops when metrics are disabled
#[cfg(feature = "metrics")]
pub fn increment_requests(operation: &'static str) {
    if let Some(counter) = REQUESTS.get() {
        counter.add(1, &[KeyValue::new("operation", operation)]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_requests(_operation: &'static str) {}

#[cfg(feature = "metrics")]
pub fn increment_request_errors(operation: &'static str, kind: blog_core::ErrorKind) {
    if let Some(counter) = REQUEST_ERRORS.get() {
        counter.add(
            1,
            &[
                KeyValue::new("operation", operation),
                KeyValue::new("kind", format!("{kind:?}")),
            ],
        );
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_request_errors(_operation: &'static str, _kind: blog_core::ErrorKind) {}

#[cfg(feature = "metrics")]
pub fn increment_streams_inflight() {
    if let Some(counter) = STREAMS_INFLIGHT.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_streams_inflight() {}

#[cfg(feature = "metrics")]
pub fn decrement_streams_inflight() {
    if let Some(counter) = STREAMS_INFLIGHT.get() {
        counter.add(-1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn decrement_streams_inflight() {}

#[cfg(feature = "metrics")]
pub fn record_stream_duration(duration_ms: f64) {
    if let Some(histogram) = STREAM_DURATION_MS.get() {
        histogram.record(duration_ms, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn record_stream_duration(_duration_ms: f64) {}

#[cfg(feature = "metrics")]
pub fn increment_records_streamed(count: u64) {
    if let Some(counter) = RECORDS_STREAMED.get() {
        counter.add(count, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_records_streamed(_count: u64) {}
