//! In-process broker.
//!
//! Behaves like a small Kafka cluster: topics with partitions, per-group
//! cursors shared by every consumer of the group (competing consumers), and
//! offsets committed only when a record is acked. A member that closes or is
//! dropped with unacked records hands them back to the group. Used by tests
//! and for running the pipeline locally without a cluster.
//!
//! Faults can be injected: refused connects, failing sends and receives, and
//! a create-topic call that loses a race with another process.

use crate::client::{BrokerConnector, ConsumerClient, ProducerClient, TopicAdmin};
use crate::config::ConsumerConfig;
use crate::error::BrokerError;
use crate::event::{Record, RecordMetadata};
use crate::registry::TopicSpec;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Default)]
struct Partitioned {
    partitions: Vec<Vec<Record>>,
    next_partition: usize,
}

#[derive(Default)]
struct State {
    topics: HashMap<String, Partitioned>,
    /// (group, topic) -> next offset to deliver per partition
    cursors: HashMap<(String, String), Vec<usize>>,
    /// (group, topic) -> committed offset per partition
    committed: HashMap<(String, String), Vec<usize>>,

    unreachable: bool,
    failing_connects: u32,
    failing_sends: u32,
    failing_receives: u32,
    race_next_create: bool,

    connect_attempts: usize,
    admin_connections: usize,
    admin_disconnects: usize,
    list_topics_calls: usize,
    create_topic_calls: usize,
    flushes: usize,
    consumers_closed: usize,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    published: Notify,
}

/// In-memory broker. Clones share the same cluster.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Count a connect attempt and apply connect faults.
    fn connect(&self) -> Result<(), BrokerError> {
        let mut state = self.state();
        state.connect_attempts += 1;
        if state.unreachable {
            return Err(BrokerError::Connection("broker unreachable".into()));
        }
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(BrokerError::Connection("connection refused".into()));
        }
        Ok(())
    }

    /// Create a topic directly, bypassing the admin API.
    pub fn seed_topic(&self, spec: &TopicSpec) {
        let mut state = self.state();
        insert_topic(&mut state, spec);
    }

    /// Refuse every connect while `true`.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }

    /// Refuse the next `n` connects of any kind.
    pub fn fail_next_connects(&self, n: u32) {
        self.state().failing_connects = n;
    }

    /// Reject the next `n` produce requests.
    pub fn fail_next_sends(&self, n: u32) {
        self.state().failing_sends = n;
    }

    /// Fail the next `n` polls across all consumers.
    pub fn fail_next_receives(&self, n: u32) {
        self.state().failing_receives = n;
        self.shared.published.notify_waiters();
    }

    /// Make the next create-topic call find the topic created by someone else.
    pub fn race_next_create(&self) {
        self.state().race_next_create = true;
    }

    pub fn topic_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state().topics.keys().cloned().collect();
        names.sort();
        names
    }

    /// Every record of `topic`, partition by partition.
    pub fn records(&self, topic: &str) -> Vec<Record> {
        self.state()
            .topics
            .get(topic)
            .map(|t| t.partitions.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }

    /// Committed offsets of `group` on `topic`, one per partition.
    pub fn committed_offsets(&self, group: &str, topic: &str) -> Option<Vec<usize>> {
        self.state()
            .committed
            .get(&(group.to_string(), topic.to_string()))
            .cloned()
    }

    pub fn connect_attempts(&self) -> usize {
        self.state().connect_attempts
    }

    pub fn admin_connections(&self) -> usize {
        self.state().admin_connections
    }

    pub fn admin_disconnects(&self) -> usize {
        self.state().admin_disconnects
    }

    pub fn list_topics_calls(&self) -> usize {
        self.state().list_topics_calls
    }

    pub fn create_topic_calls(&self) -> usize {
        self.state().create_topic_calls
    }

    pub fn flushes(&self) -> usize {
        self.state().flushes
    }

    pub fn consumers_closed(&self) -> usize {
        self.state().consumers_closed
    }
}

fn insert_topic(state: &mut State, spec: &TopicSpec) {
    let partitions = spec.partitions.max(1) as usize;
    state
        .topics
        .entry(spec.name.clone())
        .or_insert_with(|| Partitioned {
            partitions: vec![Vec::new(); partitions],
            next_partition: 0,
        });
}

fn partition_for_key(key: &[u8], partitions: usize) -> usize {
    let hash = key
        .iter()
        .fold(0u32, |h, b| h.wrapping_mul(31).wrapping_add(u32::from(*b)));
    hash as usize % partitions
}

#[async_trait]
impl BrokerConnector for InMemoryBroker {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn connect_admin(&self) -> Result<Box<dyn TopicAdmin>, BrokerError> {
        self.connect()?;
        self.state().admin_connections += 1;
        Ok(Box::new(MemoryAdmin {
            broker: self.clone(),
        }))
    }

    async fn connect_producer(&self) -> Result<Box<dyn ProducerClient>, BrokerError> {
        self.connect()?;
        Ok(Box::new(MemoryProducer {
            broker: self.clone(),
        }))
    }

    async fn connect_consumer(
        &self,
        config: &ConsumerConfig,
    ) -> Result<Box<dyn ConsumerClient>, BrokerError> {
        self.connect()?;
        Ok(Box::new(MemoryConsumer {
            broker: self.clone(),
            group_id: config.group_id.clone(),
            from_beginning: config.from_beginning,
            topic: None,
            next_partition: 0,
            in_flight: Vec::new(),
        }))
    }
}

struct MemoryAdmin {
    broker: InMemoryBroker,
}

#[async_trait]
impl TopicAdmin for MemoryAdmin {
    async fn list_topics(&self) -> Result<Vec<String>, BrokerError> {
        self.broker.state().list_topics_calls += 1;
        Ok(self.broker.topic_names())
    }

    async fn create_topic(&self, spec: &TopicSpec) -> Result<(), BrokerError> {
        let mut state = self.broker.state();
        state.create_topic_calls += 1;

        if std::mem::take(&mut state.race_next_create) {
            insert_topic(&mut state, spec);
        }
        if state.topics.contains_key(&spec.name) {
            return Err(BrokerError::TopicExists(spec.name.clone()));
        }
        insert_topic(&mut state, spec);
        Ok(())
    }

    async fn disconnect(self: Box<Self>) {
        self.broker.state().admin_disconnects += 1;
    }
}

struct MemoryProducer {
    broker: InMemoryBroker,
}

#[async_trait]
impl ProducerClient for MemoryProducer {
    async fn send(
        &self,
        topic: &str,
        key: Option<&[u8]>,
        payload: &[u8],
    ) -> Result<RecordMetadata, BrokerError> {
        let metadata = {
            let mut state = self.broker.state();
            if state.failing_sends > 0 {
                state.failing_sends -= 1;
                return Err(BrokerError::Send("broker rejected the record".into()));
            }

            let log = state
                .topics
                .get_mut(topic)
                .ok_or_else(|| BrokerError::Send(format!("unknown topic '{topic}'")))?;

            let count = log.partitions.len();
            let partition = match key {
                Some(key) => partition_for_key(key, count),
                None => {
                    let p = log.next_partition % count;
                    log.next_partition = log.next_partition.wrapping_add(1);
                    p
                }
            };

            let records = &mut log.partitions[partition];
            let offset = records.len() as i64;
            records.push(Record {
                topic: topic.to_string(),
                partition: partition as i32,
                offset,
                key: key.map(<[u8]>::to_vec),
                payload: Some(payload.to_vec()),
                timestamp: Some(Utc::now()),
            });

            RecordMetadata {
                partition: partition as i32,
                offset,
            }
        };

        self.broker.shared.published.notify_waiters();
        Ok(metadata)
    }

    async fn flush(&self, _timeout: Duration) -> Result<(), BrokerError> {
        self.broker.state().flushes += 1;
        Ok(())
    }
}

struct MemoryConsumer {
    broker: InMemoryBroker,
    group_id: String,
    from_beginning: bool,
    topic: Option<String>,
    next_partition: usize,
    /// (partition, offset) handed out and not yet acked
    in_flight: Vec<(usize, usize)>,
}

impl MemoryConsumer {
    /// Take the next record for this group, if any, advancing the cursor.
    fn try_next(&mut self) -> Result<Option<Record>, BrokerError> {
        let Some(topic) = &self.topic else {
            return Err(BrokerError::Receive("not subscribed".into()));
        };

        let mut state = self.broker.state();
        if state.failing_receives > 0 {
            state.failing_receives -= 1;
            return Err(BrokerError::Receive("fetch failed".into()));
        }

        let State {
            topics, cursors, ..
        } = &mut *state;
        let Some(log) = topics.get(topic) else {
            return Ok(None);
        };
        let Some(cursor) = cursors.get_mut(&(self.group_id.clone(), topic.clone())) else {
            return Ok(None);
        };

        let count = log.partitions.len();
        for step in 0..count {
            let partition = (self.next_partition + step) % count;
            if let Some(record) = log.partitions[partition].get(cursor[partition]) {
                self.in_flight.push((partition, cursor[partition]));
                cursor[partition] += 1;
                self.next_partition = (partition + 1) % count;
                return Ok(Some(record.clone()));
            }
        }
        Ok(None)
    }

    /// Rewind the group cursor to the oldest unacked record of this member.
    fn release_in_flight(&mut self) {
        let Some(topic) = &self.topic else {
            return;
        };
        if self.in_flight.is_empty() {
            return;
        }

        {
            let mut state = self.broker.state();
            let key = (self.group_id.clone(), topic.clone());
            if let Some(cursor) = state.cursors.get_mut(&key) {
                for (partition, offset) in self.in_flight.drain(..) {
                    cursor[partition] = cursor[partition].min(offset);
                }
            }
        }
        self.broker.shared.published.notify_waiters();
    }
}

impl Drop for MemoryConsumer {
    fn drop(&mut self) {
        self.release_in_flight();
    }
}

#[async_trait]
impl ConsumerClient for MemoryConsumer {
    async fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError> {
        let mut state = self.broker.state();
        let Some(log) = state.topics.get(topic) else {
            return Err(BrokerError::Subscribe(format!("unknown topic '{topic}'")));
        };

        let start: Vec<usize> = if self.from_beginning {
            vec![0; log.partitions.len()]
        } else {
            log.partitions.iter().map(Vec::len).collect()
        };
        // an existing group resumes from its committed offsets
        let key = (self.group_id.clone(), topic.to_string());
        state.committed.entry(key.clone()).or_insert_with(|| start.clone());
        state.cursors.entry(key).or_insert(start);

        self.topic = Some(topic.to_string());
        Ok(())
    }

    async fn recv(&mut self) -> Result<Record, BrokerError> {
        let shared = self.broker.shared.clone();
        loop {
            let notified = shared.published.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(record) = self.try_next()? {
                return Ok(record);
            }
            notified.await;
        }
    }

    async fn ack(&mut self, record: &Record) -> Result<(), BrokerError> {
        let partition = record.partition as usize;
        let offset = record.offset as usize;
        let Some(pos) = self
            .in_flight
            .iter()
            .position(|entry| *entry == (partition, offset))
        else {
            return Ok(());
        };
        self.in_flight.swap_remove(pos);

        let mut state = self.broker.state();
        let key = (self.group_id.clone(), record.topic.clone());
        if let Some(committed) = state.committed.get_mut(&key) {
            committed[partition] = committed[partition].max(offset + 1);
        }
        Ok(())
    }

    async fn close(self: Box<Self>) {
        // unacked records go back to the group when `self` drops
        self.broker.state().consumers_closed += 1;
    }
}
