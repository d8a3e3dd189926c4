//! Shared test utilities
//!
//! This crate provides reusable test infrastructure for the workspace crates:
//! - `TestKafka`: Kafka container with automatic cleanup (feature: "kafka")
//! - `TestDataBuilder`: Deterministic test data generation (always available)
//! - `assertions`: Custom assertion helpers (always available)
//!
//! # Features
//!
//! - `kafka`: Enables Kafka test infrastructure (needs Docker)
//!
//! # Usage
//!
//! Add `features = ["kafka"]` to your dev-dependencies:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { workspace = true, features = ["kafka"] }
//! ```
//!
//! Then in your tests:
//!
//! ```rust,ignore
//! use test_utils::{TestDataBuilder, TestKafka};
//!
//! #[tokio::test]
//! #[ignore = "requires Docker"]
//! async fn my_kafka_test() {
//!     let kafka = TestKafka::new().await;
//!     let builder = TestDataBuilder::from_test_name("my_kafka_test");
//!
//!     let topic = builder.topic("send-mail");
//!     let to = builder.email("user");
//! }
//! ```

#[cfg(feature = "kafka")]
mod kafka;

#[cfg(feature = "kafka")]
pub use kafka::TestKafka;

/// Builder for test data with deterministic randomization
///
/// This ensures tests are reproducible by using seeded data.
pub struct TestDataBuilder {
    seed: u64,
}

impl TestDataBuilder {
    /// Create a new builder with a seed (for deterministic tests)
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Create from test name (generates seed from test name hash)
    ///
    /// This is the recommended way to create a builder for consistent test data.
    ///
    /// # Example
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let builder = TestDataBuilder::from_test_name("test_send_welcome");
    /// ```
    pub fn from_test_name(name: &str) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        Self::new(hasher.finish())
    }

    /// Generate a recipient address
    ///
    /// # Example
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let builder = TestDataBuilder::new(7);
    /// assert_eq!(builder.email("user"), "user-7@example.com");
    /// ```
    pub fn email(&self, local: &str) -> String {
        format!("{}-{}@example.com", local, self.seed)
    }

    /// Generate a topic name unique to this test
    ///
    /// Only uses characters Kafka accepts in topic names.
    pub fn topic(&self, prefix: &str) -> String {
        format!("test-{}-{}", prefix, self.seed)
    }

    /// Generate a consumer group unique to this test
    pub fn group(&self, prefix: &str) -> String {
        format!("test-{}-group-{}", prefix, self.seed)
    }
}

/// Test assertion helpers
pub mod assertions {
    /// Assert that a condition becomes true within `timeout`, polling every 10ms
    pub async fn eventually<F>(timeout: std::time::Duration, context: &str, mut condition: F)
    where
        F: FnMut() -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        while !condition() {
            if tokio::time::Instant::now() >= deadline {
                panic!("{}: condition not met within {:?}", context, timeout);
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }
}
