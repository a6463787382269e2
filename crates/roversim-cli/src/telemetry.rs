//! Structured-logging bootstrap.
//!
//! Call [`init`] once before anything else logs. Plain console output by
//! default; set `ROVERSIM_LOG_FORMAT=json` for newline-delimited JSON, and
//! set `OTEL_EXPORTER_OTLP_ENDPOINT` to also export spans to an OTLP
//! collector. `RUST_LOG` controls the filter (default `info`).

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialise the global `tracing` subscriber.
///
/// The returned guard must live for the whole process; dropping it flushes
/// any pending OTLP span batches.
pub fn init(service_name: &str) -> OtelGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("ROVERSIM_LOG_FORMAT").as_deref() == Ok("json");
    let provider = otlp_provider(service_name);

    let otel_layer = provider.as_ref().map(|provider| {
        tracing_opentelemetry::layer().with_tracer(provider.tracer("roversim"))
    });

    let registry = tracing_subscriber::registry().with(filter).with(otel_layer);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().compact())
            .init();
    }

    OtelGuard(provider)
}

/// Flushes and shuts down the OTLP exporter on drop.
pub struct OtelGuard(Option<SdkTracerProvider>);

impl Drop for OtelGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("[roversim] OTLP provider shutdown error: {e}");
        }
    }
}

/// Build the OTLP tracer provider when `OTEL_EXPORTER_OTLP_ENDPOINT` is
/// set; exporter failures fall back to console-only logging.
fn otlp_provider(service_name: &str) -> Option<SdkTracerProvider> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?;
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[roversim] OTLP exporter init failed: {e}"))
        .ok()?;

    // The simple exporter works without a running tokio runtime, which is
    // the state of the world at init time.
    Some(
        SdkTracerProvider::builder()
            .with_resource(
                Resource::builder()
                    .with_service_name(service_name.to_string())
                    .build(),
            )
            .with_simple_exporter(exporter)
            .build(),
    )
}
