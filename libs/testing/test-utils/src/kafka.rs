//! Kafka test infrastructure
//!
//! Provides a `TestKafka` helper that runs a single-node Kafka (KRaft) container.

use testcontainers::ContainerAsync;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::kafka::apache::{KAFKA_PORT, Kafka};

/// Test Kafka wrapper that ensures proper cleanup
///
/// The container is automatically stopped and removed when this struct is dropped.
///
/// # Example
///
/// ```no_run
/// use test_utils::TestKafka;
///
/// # async fn example() {
/// let kafka = TestKafka::new().await;
/// let brokers = kafka.bootstrap_servers();
/// // Point a Kafka client at `brokers`
/// # }
/// ```
pub struct TestKafka {
    #[allow(dead_code)]
    container: ContainerAsync<Kafka>,
    pub bootstrap_servers: String,
}

impl TestKafka {
    /// Start a new Kafka container
    pub async fn new() -> Self {
        let container = Kafka::default()
            .start()
            .await
            .expect("Failed to start Kafka container");

        let host_port = container
            .get_host_port_ipv4(KAFKA_PORT)
            .await
            .expect("Failed to get Kafka port");

        let bootstrap_servers = format!("127.0.0.1:{}", host_port);

        tracing::info!(port = host_port, "Test Kafka ready");

        Self {
            container,
            bootstrap_servers,
        }
    }

    /// Bootstrap servers for client configuration
    pub fn bootstrap_servers(&self) -> &str {
        &self.bootstrap_servers
    }
}

// Container is automatically cleaned up when TestKafka is dropped
impl Drop for TestKafka {
    fn drop(&mut self) {
        tracing::debug!("Cleaning up test Kafka container");
    }
}
