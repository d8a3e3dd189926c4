//! Mail pipeline end to end: publish an envelope, consume it, hand it to the
//! transport.

use domain_notifications::{
    DedupCache, DeliveryHandler, Envelope, MockSmtpTransport, NotificationService,
    NotificationServiceConfig, SendMailTopic, TemplateEngine,
};
use kafka_worker::{
    BrokerConfig, BrokerError, BrokerManager, ConsumerConfig, ConsumerLoop, ConsumerState,
    InMemoryBroker, Publisher, TopicDef,
};
use std::sync::Arc;
use std::time::Duration;
use test_utils::assertions::eventually;
use tokio::sync::watch;
use tokio::task::JoinHandle;

const FROM: &str = "noreply@example.com";

struct Worker {
    manager: BrokerManager,
    publisher: Publisher,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<Result<(), BrokerError>>,
    consumer: Arc<ConsumerLoop>,
}

impl Worker {
    /// Provision `send-mail` and start a consumer loop delivering through `handler`.
    async fn start(broker: &InMemoryBroker, handler: DeliveryHandler) -> Self {
        let manager = BrokerManager::new(Arc::new(broker.clone()), BrokerConfig::new("memory"));
        manager.ensure_topic_def::<SendMailTopic>().await.unwrap();

        let consumer = Arc::new(manager.consumer_loop(ConsumerConfig::from_topic_def::<SendMailTopic>()));
        let mut states = consumer.state_changes();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn({
            let consumer = consumer.clone();
            async move { consumer.run(&handler, shutdown_rx).await }
        });
        states
            .wait_for(|state| *state == ConsumerState::Running)
            .await
            .unwrap();

        let publisher = manager.connect_producer().await;
        Self {
            manager,
            publisher,
            shutdown,
            task,
            consumer,
        }
    }

    async fn publish_raw(&self, payload: &serde_json::Value) {
        assert!(
            self.publisher
                .publish(SendMailTopic::TOPIC_NAME, payload)
                .await
                .is_delivered()
        );
    }

    async fn stop(self) -> Arc<ConsumerLoop> {
        self.shutdown.send(true).unwrap();
        self.task.await.unwrap().unwrap();
        self.publisher.shutdown().await;
        self.consumer
    }
}

async fn wait_for_attempts(transport: &MockSmtpTransport, attempts: usize) {
    eventually(Duration::from_secs(5), "transport attempts", || {
        transport.attempts() >= attempts
    })
    .await;
}

#[tokio::test]
async fn test_envelope_is_mailed_once() {
    let broker = InMemoryBroker::new();
    let transport = MockSmtpTransport::new();
    let worker = Worker::start(&broker, DeliveryHandler::new(Arc::new(transport.clone()), FROM)).await;

    worker
        .publish_raw(&serde_json::json!({
            "to": "user@example.com",
            "subject": "Welcome",
            "html": "<p>Hi</p>"
        }))
        .await;

    wait_for_attempts(&transport, 1).await;
    let consumer = worker.stop().await;

    let sent = transport.sent_mail().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(transport.attempts(), 1);
    assert_eq!(sent[0].from, FROM);
    assert_eq!(sent[0].to, "user@example.com");
    assert_eq!(sent[0].subject, "Welcome");
    assert_eq!(sent[0].html, "<p>Hi</p>");
    assert_eq!(consumer.state(), ConsumerState::Stopped);
}

#[tokio::test]
async fn test_malformed_record_does_not_block_the_next_one() {
    let broker = InMemoryBroker::new();
    let transport = MockSmtpTransport::new();
    let worker = Worker::start(&broker, DeliveryHandler::new(Arc::new(transport.clone()), FROM)).await;

    worker.publish_raw(&serde_json::json!({ "subject": "missing recipient" })).await;
    worker.publish_raw(&serde_json::json!("not an envelope")).await;
    worker
        .publish_raw(&serde_json::json!({ "to": "a@b.com", "subject": "s", "html": "h" }))
        .await;

    wait_for_attempts(&transport, 1).await;
    worker.stop().await;

    assert_eq!(transport.attempts(), 1);
    assert!(transport.was_sent_to("a@b.com").await);
}

#[tokio::test]
async fn test_transport_failure_is_not_retried() {
    let broker = InMemoryBroker::new();
    let transport = MockSmtpTransport::failing_first(1);
    let worker = Worker::start(&broker, DeliveryHandler::new(Arc::new(transport.clone()), FROM)).await;

    worker
        .publish_raw(&serde_json::json!({ "to": "first@example.com", "subject": "s", "html": "h" }))
        .await;
    worker
        .publish_raw(&serde_json::json!({ "to": "second@example.com", "subject": "s", "html": "h" }))
        .await;

    wait_for_attempts(&transport, 2).await;
    worker.stop().await;

    assert_eq!(transport.attempts(), 2);
    assert!(!transport.was_sent_to("first@example.com").await);
    assert!(transport.was_sent_to("second@example.com").await);
}

#[tokio::test]
async fn test_redelivered_envelope_is_mailed_once_with_dedup() {
    let broker = InMemoryBroker::new();
    let transport = MockSmtpTransport::new();
    let handler = DeliveryHandler::new(Arc::new(transport.clone()), FROM)
        .with_dedup(Arc::new(DedupCache::new(Duration::from_secs(300))));
    let worker = Worker::start(&broker, handler).await;

    let envelope = Envelope::new("a@b.com", "OTP", "<p>1234</p>").with_idempotency_key("otp-1");
    for _ in 0..2 {
        assert!(
            worker
                .publisher
                .publish(SendMailTopic::TOPIC_NAME, &envelope)
                .await
                .is_delivered()
        );
    }
    worker
        .publish_raw(&serde_json::json!({ "to": "marker@example.com", "subject": "s", "html": "h" }))
        .await;

    wait_for_attempts(&transport, 2).await;
    worker.stop().await;

    assert_eq!(transport.attempts(), 2);
    assert_eq!(transport.sent_count().await, 2);
    assert!(transport.was_sent_to("marker@example.com").await);
}

#[tokio::test]
async fn test_notification_service_feeds_the_worker() {
    let broker = InMemoryBroker::new();
    let transport = MockSmtpTransport::new();
    let worker = Worker::start(&broker, DeliveryHandler::new(Arc::new(transport.clone()), FROM)).await;

    let service = NotificationService::new(
        worker.manager.connect_producer().await,
        TemplateEngine::new().unwrap(),
        NotificationServiceConfig::default(),
    );
    assert!(service.send_welcome("ada@example.com", "Ada").await.is_delivered());

    wait_for_attempts(&transport, 1).await;
    service.shutdown().await;
    worker.stop().await;

    let sent = transport.sent_mail().await;
    assert_eq!(sent[0].subject, "Welcome to Job Board, Ada!");
    assert!(sent[0].html.contains("Ada"));
}
