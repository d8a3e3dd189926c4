//! Publish one mail envelope to `send-mail`, the way an upstream service does.
//!
//! ```text
//! KAFKA_BROKERS=localhost:9092 cargo run -p mail_worker --bin send_test_mail -- \
//!     --to user@example.com --subject Welcome --html '<p>Hi</p>'
//! ```

use clap::Parser;
use core_config::kafka::KafkaConfig;
use core_config::tracing::{init_tracing, install_color_eyre};
use core_config::{Environment, FromEnv};
use domain_notifications::{Envelope, SendMailTopic};
use eyre::{Result, WrapErr};
use kafka_worker::{BrokerConfig, BrokerManager, KafkaConnector, PublishOutcome, TopicDef};
use std::sync::Arc;
use tracing::warn;

#[derive(Parser)]
#[command(name = "send_test_mail")]
#[command(about = "Publish a test mail envelope to the send-mail topic")]
struct Cli {
    /// Recipient address
    #[arg(short, long)]
    to: String,

    /// Subject line
    #[arg(short, long, default_value = "Test mail")]
    subject: String,

    /// HTML body
    #[arg(long, default_value = "<p>This is a test mail.</p>")]
    html: String,

    /// Idempotency key attached to the envelope
    #[arg(short = 'k', long)]
    idempotency_key: Option<String>,

    /// Bootstrap servers; overrides KAFKA_BROKERS
    #[arg(short, long)]
    brokers: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    install_color_eyre();
    init_tracing(&Environment::from_env());

    let cli = Cli::parse();

    let kafka = match cli.brokers {
        Some(brokers) => KafkaConfig::new(brokers, "send-test-mail"),
        None => KafkaConfig::from_env().wrap_err("Failed to load Kafka configuration")?,
    };
    let config = BrokerConfig::from_kafka_config(&kafka);
    let manager = BrokerManager::new(Arc::new(KafkaConnector::new(config.clone())), config);

    if let Err(e) = manager.ensure_topic_def::<SendMailTopic>().await {
        warn!(error = %e, "Could not ensure send-mail topic, publishing anyway");
    }

    let mut envelope = Envelope::new(cli.to, cli.subject, cli.html);
    if let Some(key) = cli.idempotency_key {
        envelope = envelope.with_idempotency_key(key);
    }

    let publisher = manager.connect_producer().await;
    let outcome = publisher.publish(SendMailTopic::TOPIC_NAME, &envelope).await;
    publisher.shutdown().await;

    match outcome {
        PublishOutcome::Delivered(meta) => {
            println!(
                "Queued mail to {} (partition {}, offset {})",
                envelope.to, meta.partition, meta.offset
            );
            Ok(())
        }
        PublishOutcome::Skipped => Err(eyre::eyre!("Broker unreachable, nothing was published")),
        PublishOutcome::Failed(e) => Err(e).wrap_err("Publish failed"),
    }
}
