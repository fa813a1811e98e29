use anyhow::{Context, Error, Result};
use once_cell::sync::OnceCell;
use opentelemetry::{KeyValue, global, trace::TracerProvider};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource,
    trace::{RandomIdGenerator, Sampler, SdkTracer, SdkTracerProvider},
};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const SERVICE_NAME: &str = "clickscore-worker";

static TRACING_INIT: OnceCell<()> = OnceCell::new();
static TRACER_PROVIDER: OnceCell<SdkTracerProvider> = OnceCell::new();

/// Install the JSON tracing subscriber once per process.
///
/// When `OTEL_EXPORTER_OTLP_ENDPOINT` is set, spans are also exported over
/// OTLP; if the exporter cannot be built, logging continues without it.
///
/// # Errors
/// Fails when another global subscriber is already installed.
pub fn init() -> Result<()> {
    TRACING_INIT.get_or_try_init(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let fmt_layer = tracing_subscriber::fmt::layer().with_target(false).json();

        let otel_endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok();
        let tracer = otel_endpoint.as_deref().map(init_tracer);

        match tracer {
            Some(Ok(tracer)) => {
                let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt_layer)
                    .with(otel_layer)
                    .try_init()
                    .map_err(|e| Error::msg(e.to_string()))?;
                info!(
                    otel_enabled = true,
                    endpoint = otel_endpoint.as_deref().unwrap_or_default(),
                    "tracing initialized with OpenTelemetry"
                );
            }
            Some(Err(e)) => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt_layer)
                    .try_init()
                    .map_err(|e| Error::msg(e.to_string()))?;
                info!(
                    otel_enabled = false,
                    error = %e,
                    "tracing initialized without OpenTelemetry (exporter setup failed)"
                );
            }
            None => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt_layer)
                    .try_init()
                    .map_err(|e| Error::msg(e.to_string()))?;
                info!(otel_enabled = false, "tracing initialized");
            }
        }

        Ok::<(), Error>(())
    })?;
    Ok(())
}

/// Build an OTLP tracer; sampling follows `OTEL_SAMPLING_RATIO` (default 1.0).
fn init_tracer(endpoint: &str) -> Result<SdkTracer> {
    let sampling_ratio = std::env::var("OTEL_SAMPLING_RATIO")
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(1.0);

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .context("failed to build OTLP span exporter")?;

    let resource = Resource::builder()
        .with_attributes([
            KeyValue::new("service.name", SERVICE_NAME),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        ])
        .build();

    let tracer_provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_sampler(Sampler::TraceIdRatioBased(sampling_ratio))
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource)
        .build();

    let tracer = tracer_provider.tracer(SERVICE_NAME);
    global::set_tracer_provider(tracer_provider.clone());
    TRACER_PROVIDER.set(tracer_provider).ok();

    Ok(tracer)
}

/// Flush queued spans and stop the OTLP exporter.
///
/// The batch exporter only sends on a timer, so a one-shot invocation must
/// call this before exiting or its spans are lost. No-op without OTLP.
pub fn shutdown() {
    let Some(provider) = TRACER_PROVIDER.get() else {
        return;
    };
    if let Err(error) = provider.force_flush() {
        eprintln!("failed to flush spans: {error}");
    }
    if let Err(error) = provider.shutdown() {
        eprintln!("failed to shut down tracer provider: {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_without_exporter_is_a_noop() {
        shutdown();
        shutdown();
    }
}
