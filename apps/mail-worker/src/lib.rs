//! Mail Worker Service
//!
//! Consumes mail envelopes from Kafka and hands each one to SMTP exactly once.
//!
//! ## Architecture
//!
//! ```text
//! Upstream services (auth, users)
//!   ↓ NotificationService / Publisher
//! Kafka topic (send-mail)
//!   ↓ (Consumer Group: mail-service-group)
//! ConsumerLoop<DeliveryHandler>
//!   ↓ (decode, dedup, send once)
//! SmtpProvider (lettre)
//! ```
//!
//! ## Features
//!
//! - Topic provisioning on startup (idempotent, failure is not fatal)
//! - SMTP reachability check on startup (failure is logged, not fatal)
//! - Per-record failure isolation: bad payloads, SMTP errors and panics are
//!   logged and the loop moves on
//! - Optional handler timeout and idempotency-key dedup
//! - Prometheus metrics exporter
//! - Graceful shutdown on SIGINT/SIGTERM

pub mod config;

use crate::config::MailWorkerConfig;
use core_config::{Environment, FromEnv};
use domain_notifications::{DedupCache, DeliveryHandler, MailTransport, SendMailTopic, SmtpProvider};
use eyre::{Result, WrapErr};
use kafka_worker::{BrokerConfig, BrokerManager, ConsumerConfig, KafkaConnector};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Run the mail worker
///
/// This is the main entry point for the worker. It:
/// 1. Loads Kafka, SMTP and worker settings from the environment
/// 2. Sets up structured logging and the metrics exporter
/// 3. Ensures the `send-mail` topic exists
/// 4. Consumes envelopes until a shutdown signal arrives
///
/// # Errors
///
/// Returns an error if:
/// - Configuration is missing or invalid
/// - The metrics exporter cannot be installed
/// - The SMTP transport cannot be built
/// - The consumer cannot connect or subscribe
pub async fn run() -> Result<()> {
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    info!(
        name = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        "Starting mail worker"
    );
    info!("Environment: {:?}", environment);

    let config = MailWorkerConfig::from_env().wrap_err("Failed to load mail worker configuration")?;

    kafka_worker::init_metrics(config.metrics_port).wrap_err("Failed to install metrics exporter")?;
    if let Some(port) = config.metrics_port {
        info!(port, "Prometheus metrics exporter listening");
    }

    let broker_config = BrokerConfig::from_kafka_config(&config.kafka);
    let connector = Arc::new(KafkaConnector::new(broker_config.clone()));
    let manager = BrokerManager::new(connector, broker_config);

    // The topic may already exist or be managed elsewhere; consuming still works.
    if let Err(e) = manager.ensure_topic_def::<SendMailTopic>().await {
        warn!(error = %e, "Could not ensure send-mail topic, continuing");
    }

    let transport = SmtpProvider::new(config.smtp.clone()).wrap_err("Failed to build SMTP transport")?;
    // deliveries fail individually until the server is reachable
    check_transport(&transport).await;
    let from = transport.from_address().to_string();
    let mut handler = DeliveryHandler::new(Arc::new(transport), from);
    if let Some(ttl) = config.dedup_ttl {
        info!(ttl_secs = ttl.as_secs(), "Idempotency-key dedup enabled");
        handler = handler.with_dedup(Arc::new(DedupCache::new(ttl)));
    }

    let consumer_config = ConsumerConfig::from_topic_def::<SendMailTopic>()
        .with_handler_timeout(config.handler_timeout);
    info!(
        topic = %consumer_config.topic,
        group_id = %consumer_config.group_id,
        handler_timeout_ms = ?config.handler_timeout.map(|t| t.as_millis()),
        "Consumer configuration loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!("Error waiting for shutdown signal: {}", e);
        }
        let _ = shutdown_tx.send(true);
    });

    info!("Starting mail delivery consumer...");
    manager
        .consumer_loop(consumer_config)
        .run(&handler, shutdown_rx)
        .await
        .wrap_err("Mail consumer failed to start")?;

    info!("Mail worker stopped");
    Ok(())
}

/// Check the mail server once. Returns whether it answered.
async fn check_transport(transport: &dyn MailTransport) -> bool {
    match transport.health_check().await {
        Ok(true) => {
            info!(transport = transport.name(), "Mail transport reachable");
            true
        }
        Ok(false) => {
            warn!(transport = transport.name(), "Mail transport not reachable, continuing");
            false
        }
        Err(e) => {
            warn!(transport = transport.name(), error = %e, "Mail transport check failed, continuing");
            false
        }
    }
}

/// Wait for a shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async { signal::ctrl_c().await.wrap_err("Failed to install Ctrl+C handler") };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .wrap_err("Failed to install SIGTERM handler")?
            .recv()
            .await;
        Ok::<(), eyre::Report>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<()>>();

    tokio::select! {
        result = ctrl_c => {
            result?;
            info!("Received Ctrl+C, initiating shutdown...");
        },
        result = terminate => {
            result?;
            info!("Received SIGTERM, initiating shutdown...");
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain_notifications::MockSmtpTransport;

    #[tokio::test]
    async fn test_check_transport_reports_reachability() {
        assert!(check_transport(&MockSmtpTransport::new()).await);
        assert!(!check_transport(&MockSmtpTransport::failing()).await);
    }
}
