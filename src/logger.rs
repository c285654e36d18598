use std::path::PathBuf;
use std::sync::OnceLock;

use channel_plugin::plugin::LogLevel;
use opentelemetry::{global, metrics::Counter, KeyValue};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{LogExporter, MetricExporter, Protocol, WithExportConfig};
use opentelemetry_sdk::{logs::SdkLoggerProvider, metrics::SdkMeterProvider, Resource};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

const SERVICE_NAME: &str = "greentic-dialog";

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    pub log_level: LogLevel,
    /// Also write a daily rolling log file here.
    pub log_dir: Option<PathBuf>,
    /// OTLP/HTTP collector base URL, e.g. `http://localhost:4318`.
    pub otel_endpoint: Option<String>,
}

impl LogConfig {
    pub fn new(log_level: LogLevel, log_dir: Option<PathBuf>, otel_endpoint: Option<String>) -> Self {
        Self { log_level, log_dir, otel_endpoint }
    }
}

/// Keeps the log writers alive. Flushes and shuts exporters down on drop.
pub struct TracingGuard {
    _file: Option<WorkerGuard>,
    logger_provider: Option<SdkLoggerProvider>,
    meter_provider: Option<SdkMeterProvider>,
}

impl Drop for TracingGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.logger_provider.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("log exporter shutdown failed: {e}");
            }
        }
        if let Some(provider) = self.meter_provider.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("metric exporter shutdown failed: {e}");
            }
        }
    }
}

static RESOURCE: OnceLock<Resource> = OnceLock::new();
fn get_resource() -> Resource {
    RESOURCE.get_or_init(|| Resource::builder().with_service_name(SERVICE_NAME).build()).clone()
}

fn init_logs(endpoint: &str) -> anyhow::Result<SdkLoggerProvider> {
    let exporter = LogExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(format!("{}/v1/logs", endpoint.trim_end_matches('/')))
        .build()?;
    Ok(SdkLoggerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(get_resource())
        .build())
}

fn init_metrics(endpoint: &str) -> anyhow::Result<SdkMeterProvider> {
    let exporter = MetricExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(format!("{}/v1/metrics", endpoint.trim_end_matches('/')))
        .build()?;
    Ok(SdkMeterProvider::builder()
        .with_periodic_exporter(exporter)
        .with_resource(get_resource())
        .build())
}

/// Install the global subscriber: stdout, an optional rolling file, and an
/// optional OTLP export of logs and metrics.
pub fn init_tracing(config: &LogConfig) -> anyhow::Result<TracingGuard> {
    let level = config.log_level.as_directive();

    let (file_layer, file_guard) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, format!("{SERVICE_NAME}.log"));
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    let endpoint = config.otel_endpoint.as_deref();
    let logger_provider = endpoint.map(init_logs).transpose()?;
    let meter_provider = endpoint.map(init_metrics).transpose()?;
    if let Some(provider) = &meter_provider {
        global::set_meter_provider(provider.clone());
    }

    let otel_layer = match &logger_provider {
        Some(provider) => {
            // the exporter's own http stack must not feed back into it
            let filter = EnvFilter::new(level)
                .add_directive("hyper=off".parse()?)
                .add_directive("tonic=off".parse()?)
                .add_directive("h2=off".parse()?)
                .add_directive("reqwest=off".parse()?);
            Some(OpenTelemetryTracingBridge::new(provider).with_filter(filter))
        }
        None => None,
    };

    Registry::default()
        .with(EnvFilter::new(level))
        .with(fmt::layer().with_thread_names(true))
        .with(file_layer)
        .with(otel_layer)
        .try_init()?;

    Ok(TracingGuard { _file: file_guard, logger_provider, meter_provider })
}

/// Flow lifecycle counters, labelled by flow name. Recorded against the
/// global meter, which is a no-op until an exporter is installed.
#[derive(Clone)]
pub struct FlowMetrics {
    started: Counter<u64>,
    completed: Counter<u64>,
    cancelled: Counter<u64>,
    render_failures: Counter<u64>,
}

impl Default for FlowMetrics {
    fn default() -> Self {
        let meter = global::meter(SERVICE_NAME);
        Self {
            started: meter.u64_counter("flows_started").with_description("Flows started").build(),
            completed: meter.u64_counter("flows_completed").with_description("Flows completed").build(),
            cancelled: meter
                .u64_counter("flows_cancelled")
                .with_description("Flows cancelled by the user, a step or error recovery")
                .build(),
            render_failures: meter
                .u64_counter("render_failures")
                .with_description("Prompts that could not be rendered or sent")
                .build(),
        }
    }
}

impl FlowMetrics {
    fn label(flow: &str) -> [KeyValue; 1] {
        [KeyValue::new("flow", flow.to_string())]
    }

    pub fn flow_started(&self, flow: &str) {
        self.started.add(1, &Self::label(flow));
    }

    pub fn flow_completed(&self, flow: &str) {
        self.completed.add(1, &Self::label(flow));
    }

    pub fn flow_cancelled(&self, flow: &str) {
        self.cancelled.add(1, &Self::label(flow));
    }

    pub fn render_failed(&self, flow: &str) {
        self.render_failures.add(1, &Self::label(flow));
    }
}
