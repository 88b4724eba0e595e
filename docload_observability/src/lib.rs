use std::{borrow::Cow, time::Duration};

use opentelemetry::{InstrumentationScope, global, trace::TracerProvider as _};
use opentelemetry_otlp::{ExporterBuildError, MetricExporter, SpanExporter};
use opentelemetry_sdk::{
    Resource,
    metrics::{MeterProviderBuilder, PeriodicReader},
    trace::SdkTracerProvider,
};
use snafu::{ResultExt, Snafu};
use tracing::Subscriber;
use tracing_opentelemetry::MetricsLayer;
use tracing_subscriber::{EnvFilter, Layer, prelude::*, registry::LookupSpan};

pub use opentelemetry::{
    KeyValue,
    metrics::{Counter, Histogram, Meter},
};

const OTEL_SDK_DISABLED: &str = "OTEL_SDK_DISABLED";
const RUST_LOG_FORMAT: &str = "RUST_LOG_FORMAT";

pub type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync>;

#[derive(Debug, Snafu)]
pub enum ObservabilityError {
    #[snafu(display("Failed to build exporter"))]
    Exporter { source: ExporterBuildError },
}

pub fn meter(name: &'static str) -> Meter {
    global::meter(name)
}

/// Install the global tracing subscriber and meter provider.
///
/// Logs go to stderr, so that stdout only carries command output.
pub fn init_observability(
    package_name: impl Into<Cow<'static, str>>,
    package_version: impl Into<Cow<'static, str>>,
) -> Result<(), ObservabilityError> {
    // The otel sdk doesn't follow the disabled env variable flag,
    // exports stay off unless it is explicitly set to false.
    let sdk_enabled = otel_sdk_enabled(std::env::var(OTEL_SDK_DISABLED).ok().as_deref());

    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", "info");
        }
    }

    let json_fmt = std::env::var(RUST_LOG_FORMAT).is_ok_and(|format| format == "json");

    let otel_layer = otel(package_name, package_version, sdk_enabled)?;
    let layers = vec![stderr(json_fmt), otel_layer];

    tracing_subscriber::registry().with(layers).init();

    Ok(())
}

fn otel_sdk_enabled(disabled: Option<&str>) -> bool {
    disabled.is_some_and(|value| value == "false")
}

fn stderr<S>(json_fmt: bool) -> BoxedLayer<S>
where
    S: Subscriber,
    for<'a> S: LookupSpan<'a>,
{
    let log_env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("INFO"));

    if json_fmt {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .with_target(true)
            .json()
            .with_filter(log_env_filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .with_filter(log_env_filter)
            .boxed()
    }
}

fn otel<S>(
    package_name: impl Into<Cow<'static, str>>,
    version: impl Into<Cow<'static, str>>,
    sdk_enabled: bool,
) -> Result<BoxedLayer<S>, ObservabilityError>
where
    S: Subscriber + Send + Sync,
    for<'a> S: LookupSpan<'a>,
{
    let resource = Resource::builder().build();

    let otel_env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("INFO"));

    let scope = InstrumentationScope::builder(package_name.into())
        .with_version(version.into())
        .build();

    let mut trace_provider = SdkTracerProvider::builder().with_resource(resource.clone());

    if sdk_enabled {
        let span_exporter = SpanExporter::builder()
            .with_tonic()
            .build()
            .context(ExporterSnafu {})?;

        trace_provider = trace_provider.with_batch_exporter(span_exporter);
    }

    let trace_provider = trace_provider.build();
    let tracer = trace_provider.tracer_with_scope(scope);

    let mut meter_provider = MeterProviderBuilder::default().with_resource(resource);

    if sdk_enabled {
        let metrics_exporter = MetricExporter::builder()
            .with_tonic()
            .build()
            .context(ExporterSnafu {})?;

        let metrics_reader = PeriodicReader::builder(metrics_exporter)
            .with_interval(Duration::from_secs(10))
            .build();

        meter_provider = meter_provider.with_reader(metrics_reader);
    }

    let meter_provider = meter_provider.build();

    global::set_meter_provider(meter_provider.clone());

    let otel_trace_layer = tracing_opentelemetry::layer().with_tracer(tracer);
    let otel_metrics_layer = MetricsLayer::new(meter_provider);

    Ok(otel_env_filter
        .and_then(otel_metrics_layer)
        .and_then(otel_trace_layer)
        .boxed())
}
