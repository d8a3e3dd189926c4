//! Prometheus metrics for publishers and consumer loops
//!
//! Without an installed recorder every call here is a no-op.

use crate::error::BrokerError;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tracing::info;

static EXPORTER: OnceCell<SocketAddr> = OnceCell::new();

/// Install the Prometheus exporter serving `/metrics` on `0.0.0.0:<port>`
/// (requires a running tokio runtime).
///
/// Without a port no recorder is installed and metrics stay no-ops.
/// Subsequent calls are no-ops.
pub fn init_metrics(port: Option<u16>) -> Result<(), BrokerError> {
    let Some(port) = port else {
        return Ok(());
    };

    EXPORTER
        .get_or_try_init(|| {
            let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
            PrometheusBuilder::new()
                .with_http_listener(addr)
                .install()
                .map_err(|e| BrokerError::Config(format!("metrics exporter: {e}")))?;
            info!(%addr, "Prometheus exporter listening");
            Ok(addr)
        })
        .map(|_| ())
}

/// Per-topic metrics helper
#[derive(Clone)]
pub struct TopicMetrics {
    topic: String,
}

impl TopicMetrics {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
        }
    }

    /// Record a publish outcome
    pub fn published(&self, status: &'static str) {
        counter!(
            "kafka_worker_published_total",
            "topic" => self.topic.clone(),
            "status" => status
        )
        .increment(1);
    }

    /// Record a record pulled from the broker
    pub fn record_received(&self) {
        counter!(
            "kafka_worker_records_received_total",
            "topic" => self.topic.clone()
        )
        .increment(1);
    }

    /// Record the outcome of handling one record
    pub fn record_handled(&self, status: &'static str, duration: Duration) {
        counter!(
            "kafka_worker_records_handled_total",
            "topic" => self.topic.clone(),
            "status" => status
        )
        .increment(1);

        histogram!(
            "kafka_worker_handler_duration_seconds",
            "topic" => self.topic.clone()
        )
        .record(duration.as_secs_f64());
    }

    /// Record a failed poll
    pub fn receive_error(&self, kind: &'static str) {
        counter!(
            "kafka_worker_receive_errors_total",
            "topic" => self.topic.clone(),
            "kind" => kind
        )
        .increment(1);
    }
}
