//! Tracing initialisation for an edge runtime process.
//!
//! The supervisory crates only emit `tracing` events and never install a
//! subscriber themselves.  A host process calls [`init_tracing`] once, early,
//! and keeps the returned guard alive.
//!
//! # Environment variables
//!
//! | Variable | Effect |
//! |---|---|
//! | `RUST_LOG` | Filter directives; `info` when unset or unparsable. |
//! | `EDGE_LOG_FORMAT` | `json` for newline-delimited JSON, anything else for compact text. |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | Collector base URL, e.g. `http://localhost:4318`. Spans are exported over OTLP/HTTP when set. |
//!
//! # Example
//!
//! ```rust,no_run
//! let guard = edge_runtime::telemetry::init_tracing("edge-runtime");
//! // ... run the runtime; dropping `guard` flushes pending spans.
//! # drop(guard);
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_FORMAT_VAR: &str = "EDGE_LOG_FORMAT";
const OTLP_ENDPOINT_VAR: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
const TRACER_NAME: &str = "edge-runtime";

/// Console log encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl LogFormat {
    /// `json` (any case) selects [`LogFormat::Json`].
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Compact
        }
    }

    fn from_env() -> Self {
        std::env::var(LOG_FORMAT_VAR)
            .map(|v| Self::parse(&v))
            .unwrap_or_default()
    }
}

/// Install the global subscriber: env filter, console output in the
/// [`LogFormat`] chosen by `EDGE_LOG_FORMAT`, and an OpenTelemetry layer
/// when an OTLP endpoint is configured.
///
/// A second call leaves the first subscriber in place and only reports it on
/// stderr.
pub fn init_tracing(service_name: &str) -> TracerProviderGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let provider = build_provider(service_name);

    let console = match LogFormat::from_env() {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer().compact().boxed(),
    };
    let otel = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer(TRACER_NAME)));

    if let Err(e) = tracing_subscriber::registry()
        .with(filter)
        .with(otel)
        .with(console)
        .try_init()
    {
        eprintln!("[edge-runtime] tracing already initialised: {e}");
    }

    TracerProviderGuard(provider)
}

/// Keeps the span exporter alive; shuts it down (flushing) on drop.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl TracerProviderGuard {
    /// Whether spans leave the process.
    pub fn is_exporting(&self) -> bool {
        self.0.is_some()
    }
}

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("[edge-runtime] span exporter shutdown failed: {e}");
        }
    }
}

/// `None` without an endpoint, or when the exporter cannot be built; the
/// process then logs to the console only.
fn build_provider(service_name: &str) -> Option<SdkTracerProvider> {
    let endpoint = std::env::var(OTLP_ENDPOINT_VAR).ok()?;

    let exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
    {
        Ok(exporter) => exporter,
        Err(e) => {
            eprintln!("[edge-runtime] OTLP span exporter unavailable: {e}");
            return None;
        }
    };

    Some(
        SdkTracerProvider::builder()
            .with_resource(
                Resource::builder()
                    .with_service_name(service_name.to_owned())
                    .build(),
            )
            // Synchronous export: the supervisory core runs without an async
            // executor.
            .with_simple_exporter(exporter)
            .build(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parsing() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse(" JSON\n"), LogFormat::Json);
        assert_eq!(LogFormat::parse("compact"), LogFormat::Compact);
        assert_eq!(LogFormat::parse(""), LogFormat::Compact);
    }

    #[test]
    fn no_endpoint_means_no_exporter() {
        // SAFETY: no other test in this crate touches this variable.
        unsafe { std::env::remove_var(OTLP_ENDPOINT_VAR) };
        assert!(build_provider("edge-test").is_none());
    }

    #[test]
    fn repeated_init_does_not_panic() {
        // SAFETY: see above.
        unsafe { std::env::remove_var(OTLP_ENDPOINT_VAR) };
        let first = init_tracing("edge-test");
        let second = init_tracing("edge-test");
        assert!(!first.is_exporting());
        assert!(!second.is_exporting());
    }
}
