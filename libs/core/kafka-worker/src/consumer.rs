//! Consumer loop
//!
//! Drains one topic for one consumer group, one record at a time. Every
//! handler invocation runs inside its own failure boundary: an `Err`, a panic
//! or an overrun of the handler timeout is logged and the loop moves on to
//! the next record. Only connect and subscribe failures end a run.
//!
//! A record is acked only after its handler invocation has finished, whatever
//! the outcome. A crash while a handler is in flight leaves the offset
//! uncommitted, so delivery is at-least-once and a handler may see the same
//! record twice.

use crate::config::ConsumerConfig;
use crate::error::BrokerError;
use crate::event::Record;
use crate::manager::BrokerManager;
use crate::metrics::TopicMetrics;
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use strum::{AsRefStr, Display};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Lifecycle of a consumer loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ConsumerState {
    Disconnected,
    Connected,
    Subscribed,
    Running,
    Stopped,
}

/// Error returned by a message handler. Logged, never propagated.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// The payload could not be decoded.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Handling failed.
    #[error("Handler failed: {0}")]
    Failed(String),
}

/// Per-record callback invoked by the consumer loop.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handler name for logs.
    fn name(&self) -> &'static str {
        "handler"
    }

    async fn handle(&self, record: &Record) -> Result<(), HandlerError>;
}

/// How one record ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Handled,
    /// Record had no payload.
    Skipped,
    Failed(String),
    Panicked(String),
    TimedOut,
}

impl RecordOutcome {
    fn status(&self) -> &'static str {
        match self {
            RecordOutcome::Handled => "success",
            RecordOutcome::Skipped => "skipped",
            RecordOutcome::Failed(_) => "failed",
            RecordOutcome::Panicked(_) => "panicked",
            RecordOutcome::TimedOut => "timeout",
        }
    }
}

/// Adapter turning an async closure into a `MessageHandler`.
pub struct FnHandler<F> {
    f: F,
}

/// Wrap `f` as a `MessageHandler`.
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Record) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(Record) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    async fn handle(&self, record: &Record) -> Result<(), HandlerError> {
        (self.f)(record.clone()).await
    }
}

/// Long-running subscription for one topic and consumer group.
pub struct ConsumerLoop {
    manager: BrokerManager,
    config: ConsumerConfig,
    state: watch::Sender<ConsumerState>,
    metrics: TopicMetrics,
}

impl ConsumerLoop {
    pub fn new(manager: BrokerManager, config: ConsumerConfig) -> Self {
        let (state, _) = watch::channel(ConsumerState::Disconnected);
        let metrics = TopicMetrics::new(config.topic.clone());
        Self {
            manager,
            config,
            state,
            metrics,
        }
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    pub fn state(&self) -> ConsumerState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn state_changes(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ConsumerState) {
        debug!(topic = %self.config.topic, state = %state, "Consumer state");
        self.state.send_replace(state);
    }

    /// Connect, subscribe and hand every record to `handler` until `shutdown`
    /// flips to `true`.
    ///
    /// Connect and subscribe errors are returned; nothing inside the loop is.
    pub async fn run<H>(&self, handler: &H, mut shutdown: watch::Receiver<bool>) -> Result<(), BrokerError>
    where
        H: MessageHandler + ?Sized,
    {
        self.set_state(ConsumerState::Disconnected);

        let mut consumer = match self.manager.connect_consumer(&self.config).await {
            Ok(consumer) => consumer,
            Err(e) => {
                error!(
                    topic = %self.config.topic,
                    group_id = %self.config.group_id,
                    error = %e,
                    "Failed to connect consumer"
                );
                self.set_state(ConsumerState::Stopped);
                return Err(e);
            }
        };
        self.set_state(ConsumerState::Connected);

        if let Err(e) = consumer.subscribe(&self.config.topic).await {
            error!(topic = %self.config.topic, error = %e, "Failed to subscribe");
            consumer.close().await;
            self.set_state(ConsumerState::Stopped);
            return Err(e);
        }
        self.set_state(ConsumerState::Subscribed);

        info!(
            topic = %self.config.topic,
            group_id = %self.config.group_id,
            from_beginning = self.config.from_beginning,
            handler = handler.name(),
            "Consumer running"
        );
        self.set_state(ConsumerState::Running);

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            let next = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => break,
                next = consumer.recv() => next,
            };

            match next {
                Ok(record) => {
                    self.handle_record(handler, &record).await;
                    if let Err(e) = consumer.ack(&record).await {
                        warn!(
                            topic = %record.topic,
                            partition = record.partition,
                            offset = record.offset,
                            error = %e,
                            "Failed to store offset, record may be redelivered"
                        );
                    }
                }
                Err(e) => {
                    warn!(
                        topic = %self.config.topic,
                        error = %e,
                        backoff_ms = self.config.error_backoff.as_millis() as u64,
                        "Failed to receive record"
                    );
                    self.metrics.receive_error(e.kind());
                    tokio::select! {
                        biased;
                        _ = wait_for_shutdown(&mut shutdown) => break,
                        _ = tokio::time::sleep(self.config.error_backoff) => {}
                    }
                }
            }
        }

        info!(topic = %self.config.topic, "Consumer shutting down");
        consumer.close().await;
        self.set_state(ConsumerState::Stopped);
        Ok(())
    }

    /// Run `handler` for one record inside the failure boundary.
    pub async fn handle_record<H>(&self, handler: &H, record: &Record) -> RecordOutcome
    where
        H: MessageHandler + ?Sized,
    {
        self.metrics.record_received();
        let started = Instant::now();

        let outcome = if record.payload.is_none() {
            warn!(
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                "Record has no payload, skipping"
            );
            RecordOutcome::Skipped
        } else {
            self.invoke(handler, record).await
        };

        match &outcome {
            RecordOutcome::Handled | RecordOutcome::Skipped => {}
            RecordOutcome::Failed(reason) => warn!(
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                error = %reason,
                "Handler failed, record dropped"
            ),
            RecordOutcome::Panicked(reason) => error!(
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                panic = %reason,
                "Handler panicked, record dropped"
            ),
            RecordOutcome::TimedOut => warn!(
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                "Handler timed out, record dropped"
            ),
        }

        self.metrics
            .record_handled(outcome.status(), started.elapsed());
        outcome
    }

    async fn invoke<H>(&self, handler: &H, record: &Record) -> RecordOutcome
    where
        H: MessageHandler + ?Sized,
    {
        let call = AssertUnwindSafe(handler.handle(record)).catch_unwind();

        let result = match self.config.handler_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => return RecordOutcome::TimedOut,
            },
            None => call.await,
        };

        match result {
            Ok(Ok(())) => RecordOutcome::Handled,
            Ok(Err(e)) => RecordOutcome::Failed(e.to_string()),
            Err(panic) => RecordOutcome::Panicked(panic_message(panic.as_ref())),
        }
    }
}

/// Resolves once the flag is `true`. A dropped sender never resolves.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
