//! Tracing and OpenTelemetry initialization.
//!
//! Always installs an `EnvFilter`-driven fmt subscriber. When
//! `OTEL_EXPORTER_OTLP_ENDPOINT` is set, spans are additionally exported
//! over OTLP/gRPC so verify/settle latency and chain RPC hops show up in
//! systems like Honeycomb or Jaeger.

use opentelemetry::trace::TracerProvider as _;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Initializes the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if the OTLP exporter cannot be built.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer();

    if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .build()?;
        let resource = opentelemetry_sdk::Resource::builder()
            .with_service_name(env!("CARGO_PKG_NAME"))
            .build();
        let provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .with_resource(resource)
            .build();
        let tracer = provider.tracer(env!("CARGO_PKG_NAME"));
        opentelemetry::global::set_tracer_provider(provider);

        tracing_subscriber::registry()
            .with(fmt_layer.with_filter(env_filter))
            .with(tracing_opentelemetry::layer().with_tracer(tracer))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(fmt_layer.with_filter(env_filter))
            .try_init()?;
    }
    Ok(())
}
