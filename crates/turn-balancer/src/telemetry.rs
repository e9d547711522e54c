//! Log subscriber setup with optional OpenTelemetry export.

use crate::config::TelemetrySettings;
use common::LogFormat;
use common::logging::env_filter;
use opentelemetry::{KeyValue, trace::TracerProvider as _};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource, runtime,
    trace::{RandomIdGenerator, Sampler, Tracer, TracerProvider},
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// OpenTelemetry tracer guard
///
/// When dropped, flushes all pending spans and shuts down the tracer
pub struct TelemetryGuard;

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        opentelemetry::global::shutdown_tracer_provider();
    }
}

/// Build the OTLP tracer and install its provider globally.
///
/// Returns `None` when export is disabled.
pub fn init_tracer(settings: &TelemetrySettings) -> common::Result<Option<Tracer>> {
    if !settings.enabled {
        return Ok(None);
    }

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(settings.otlp_endpoint.as_str())
        .build()
        .map_err(common::Error::telemetry)?;

    let resource = Resource::new(vec![
        KeyValue::new("service.name", settings.service_name.clone()),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION").to_string()),
    ]);

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(Sampler::AlwaysOn)
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(resource),
        )
        .build();

    let tracer = provider.tracer("turn-balancer");
    opentelemetry::global::set_tracer_provider(provider);

    Ok(Some(tracer))
}

/// Install the global subscriber: env filter, text or JSON lines, and the
/// OpenTelemetry layer when enabled.
///
/// Keep the returned guard alive for the lifetime of the process.
pub async fn setup_tracing(
    settings: &TelemetrySettings,
    log_level: &str,
    format: LogFormat,
) -> common::Result<Option<TelemetryGuard>> {
    let tracer = init_tracer(settings)?;
    let enabled = tracer.is_some();

    tracing_subscriber::registry()
        .with(env_filter(log_level))
        .with((format == LogFormat::Text).then(fmt::layer))
        .with((format == LogFormat::Json).then(|| fmt::layer().json()))
        .with(tracer.map(|t| tracing_opentelemetry::layer().with_tracer(t)))
        .try_init()
        .map_err(common::Error::telemetry)?;

    if enabled {
        tracing::info!(
            service_name = %settings.service_name,
            otlp_endpoint = %settings.otlp_endpoint,
            "Tracing initialized with OpenTelemetry export"
        );
        Ok(Some(TelemetryGuard))
    } else {
        tracing::debug!("Tracing initialized without OpenTelemetry");
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracer_disabled() {
        let settings = TelemetrySettings::default();
        assert!(!settings.enabled);
        assert!(init_tracer(&settings).unwrap().is_none());
    }
}
