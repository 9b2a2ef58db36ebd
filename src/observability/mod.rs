//! Logging and metrics setup
//!
//! The binary installs a tracing subscriber and an OpenTelemetry meter
//! provider. The library only records through the global meter, so when no
//! provider is installed (tests, embedders) the instruments are no-ops.

use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram, Meter},
};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LogFormat;

const METER_NAME: &str = "cronsync";

/// Instruments recorded by the execution coordinator
#[derive(Clone)]
pub struct ExecutionMetrics {
    executions: Counter<u64>,
    execution_duration: Histogram<f64>,
    release_noops: Counter<u64>,
}

impl ExecutionMetrics {
    pub fn new() -> Self {
        Self::from_meter(&global::meter(METER_NAME))
    }

    pub fn from_meter(meter: &Meter) -> Self {
        let executions = meter
            .u64_counter("job_executions_total")
            .with_description("Job execution attempts by outcome")
            .build();
        let execution_duration = meter
            .f64_histogram("job_execution_duration_seconds")
            .with_description("Time spent running job tasks")
            .build();
        let release_noops = meter
            .u64_counter("lock_release_noop_total")
            .with_description("Lock releases that found the lock expired or owned by someone else")
            .build();

        Self {
            executions,
            execution_duration,
            release_noops,
        }
    }

    /// Record an attempt that ran the task here
    pub fn record_outcome(&self, job_name: &str, outcome: &str, duration: Duration) {
        let attributes = [
            KeyValue::new("job", job_name.to_string()),
            KeyValue::new("outcome", outcome.to_string()),
        ];
        self.executions.add(1, &attributes);
        self.execution_duration
            .record(duration.as_secs_f64(), &attributes[..1]);
    }

    pub fn record_skipped(&self, job_name: &str) {
        self.executions.add(
            1,
            &[
                KeyValue::new("job", job_name.to_string()),
                KeyValue::new("outcome", "skipped"),
            ],
        );
    }

    pub fn record_release_noop(&self, job_name: &str) {
        self.release_noops
            .add(1, &[KeyValue::new("job", job_name.to_string())]);
    }
}

impl Default for ExecutionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Install an SDK meter provider as the global provider.
///
/// Keep the returned provider alive for the life of the process and call
/// `shutdown` on it when exiting.
pub fn init_meter_provider() -> SdkMeterProvider {
    let provider = SdkMeterProvider::builder().build();
    global::set_meter_provider(provider.clone());
    provider
}

/// Initialise the global tracing subscriber.
///
/// `RUST_LOG` wins over `level` when set.
pub fn init_tracing(level: &str, format: LogFormat) -> anyhow::Result<()> {
    let default_filter = if level == "trace" {
        format!("cronsync={level},tower_http=trace")
    } else {
        format!("cronsync={level}")
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).try_init()?,
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?,
    }
    Ok(())
}
