//! Tracing initialisation for the fusion stack.
//!
//! Every stage of the frame path emits `tracing` events – pose resolution,
//! gate decisions, fuse outcomes, export progress – and this module decides
//! where they go.  [`init_tracing`] installs the global subscriber once at
//! process startup; until then events are silently dropped, so the CLI calls
//! it before anything else.
//!
//! Output is controlled by environment variables: `RUST_LOG` filters (default
//! `info`), `VOXFUSE_LOG_FORMAT=json` switches the console formatter to
//! newline-delimited JSON, and setting `OTEL_EXPORTER_OTLP_ENDPOINT` (e.g.
//! `http://localhost:4318`) additionally forwards spans to an OTLP/HTTP
//! collector.
//!
//! ```rust,no_run
//! // Hold the guard for the entire lifetime of the process.
//! let _guard = voxfuse_pipeline::telemetry::init_tracing("voxfuse");
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global `tracing` subscriber.
///
/// The console formatter is always present; the OTLP span layer joins it only
/// when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.  Keep the returned
/// [`TracerProviderGuard`] alive until the process exits – dropping it is
/// what flushes any spans still queued in the exporter.
pub fn init_tracing(service_name: &str) -> TracerProviderGuard {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let use_json = std::env::var("VOXFUSE_LOG_FORMAT").as_deref() == Ok("json");

    let provider = otlp_provider(service_name);

    if let Some(ref p) = provider {
        let tracer = p.tracer("voxfuse");
        let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
        if use_json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(otel_layer)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(otel_layer)
                .with(tracing_subscriber::fmt::layer().compact())
                .init();
        }
    } else if use_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().compact())
            .init();
    }

    TracerProviderGuard(provider)
}

/// Flushes and shuts down the OTel [`SdkTracerProvider`] on drop.
///
/// Carries `None` when no OTLP endpoint was configured, in which case drop is
/// a no-op.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("[voxfuse] OpenTelemetry provider shutdown error: {e}");
            }
        }
    }
}

/// Build the OTLP tracer provider, or `None` when
/// `OTEL_EXPORTER_OTLP_ENDPOINT` is absent or the exporter fails to
/// initialise.  An exporter failure is printed and otherwise ignored: losing
/// span export must never keep the fusion stack from starting.
fn otlp_provider(service_name: &str) -> Option<SdkTracerProvider> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[voxfuse] OTLP exporter init failed: {e}"))
        .ok()?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            // The simple (synchronous) exporter works before any Tokio
            // runtime exists; the CLI initialises tracing first.
            .with_simple_exporter(exporter)
            .build(),
    )
}
