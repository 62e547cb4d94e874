//! Consume loop: every shard queue drains through one dispatch loop into
//! the record store, with manual acknowledgment.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use cdrflow_middleware::{BrokerConfig, Delivery, QueueTransport, RecordStore, StoreError};
use cdrflow_model::{CallRecord, CdrMessage};

use crate::{Error, Result};

const DISPATCH_BUFFER: usize = 256;
const PROGRESS_EVERY: u64 = 100;

/// Consumer lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Idle,
    Connected,
    Consuming,
    Stopped,
    Failed,
}

/// Counters for everything the loop decided not to escalate. No outcome is
/// silent: each bump pairs with a log line, and the totals surface here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Records parsed, persisted and acknowledged.
    pub processed: u64,
    /// Poison messages: acknowledged and discarded, never retried.
    pub dropped: u64,
    /// Uniqueness-constraint hits from redelivered records.
    pub duplicates: u64,
    /// Store failures that were logged and acknowledged anyway.
    pub store_errors: u64,
}

impl ConsumerStats {
    fn seen(&self) -> u64 {
        self.processed + self.dropped + self.duplicates + self.store_errors
    }
}

/// Drains all shard queues of one deployment into the store.
///
/// One dispatch loop per process; horizontal scale comes from running more
/// consumer processes competing for the same queues, which the broker
/// load-balances.
pub struct CdrConsumer {
    transport: Arc<dyn QueueTransport>,
    store: Arc<dyn RecordStore>,
    queues: Vec<String>,
    state: ConsumerState,
    stats: ConsumerStats,
}

impl CdrConsumer {
    pub fn new(
        transport: Arc<dyn QueueTransport>,
        store: Arc<dyn RecordStore>,
        config: &BrokerConfig,
    ) -> Self {
        Self {
            transport,
            store,
            queues: config.queue_names(),
            state: ConsumerState::Idle,
            stats: ConsumerStats::default(),
        }
    }

    pub fn state(&self) -> ConsumerState {
        self.state
    }

    pub fn stats(&self) -> ConsumerStats {
        self.stats
    }

    /// Subscribe to every shard queue and dispatch until cancelled.
    ///
    /// Each queue gets a forwarding task so one stalled subscription cannot
    /// starve the rest; deliveries funnel into this single loop. Exits
    /// `Stopped` on cancellation and `Failed` on an unrecoverable channel
    /// error; either way the forwarding tasks are torn down before
    /// returning.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<()> {
        let mut subscriptions = Vec::with_capacity(self.queues.len());
        for queue in &self.queues {
            match self.transport.subscribe(queue).await {
                Ok(subscription) => {
                    tracing::info!(queue = %queue, "subscribed");
                    subscriptions.push((queue.clone(), subscription));
                }
                Err(err) => {
                    self.state = ConsumerState::Failed;
                    return Err(err.into());
                }
            }
        }
        self.state = ConsumerState::Connected;

        let (tx, mut rx) = mpsc::channel::<Delivery>(DISPATCH_BUFFER);
        let mut readers = JoinSet::new();
        for (queue, mut subscription) in subscriptions {
            let tx = tx.clone();
            readers.spawn(async move {
                loop {
                    match subscription.next().await {
                        Ok(delivery) => {
                            if tx.send(delivery).await.is_err() {
                                break; // dispatch loop is gone
                            }
                        }
                        Err(err) => {
                            tracing::error!(queue = %queue, error = %err, "subscription ended");
                            break;
                        }
                    }
                }
            });
        }
        drop(tx);

        self.state = ConsumerState::Consuming;
        tracing::info!(queues = self.queues.len(), "consuming");

        let outcome = loop {
            tokio::select! {
                _ = shutdown.cancelled() => break Ok(()),
                delivery = rx.recv() => match delivery {
                    Some(delivery) => {
                        if let Err(err) = self.handle_delivery(delivery).await {
                            break Err(err);
                        }
                    }
                    // Every reader ended while we were not cancelled.
                    None => break Err(Error::SubscriptionsClosed),
                },
            }
        };

        readers.abort_all();
        match &outcome {
            Ok(()) => {
                self.state = ConsumerState::Stopped;
                tracing::info!(stats = ?self.stats, "consumer stopped");
            }
            Err(err) => {
                self.state = ConsumerState::Failed;
                tracing::error!(error = %err, stats = ?self.stats, "consumer failed");
            }
        }
        outcome
    }

    /// Process one delivery: parse, normalize, persist, acknowledge.
    ///
    /// The acknowledgment runs on every outcome. A payload that cannot
    /// parse would fail on every redelivery too, so it is dropped rather
    /// than allowed to livelock the queue. A duplicate key means a prior
    /// delivery already ingested this record. A store outage is logged,
    /// counted and still acknowledged (see DESIGN.md for the tradeoff).
    pub(crate) async fn handle_delivery(&mut self, delivery: Delivery) -> Result<()> {
        match CdrMessage::from_slice(&delivery.payload).and_then(CallRecord::from_wire) {
            Ok(record) => match self.store.insert(&record).await {
                Ok(()) => {
                    self.stats.processed += 1;
                    tracing::debug!(
                        queue = %delivery.queue,
                        src = %record.src_number,
                        dest = %record.dest_number,
                        "record stored"
                    );
                }
                Err(StoreError::Duplicate(key)) => {
                    self.stats.duplicates += 1;
                    tracing::debug!(queue = %delivery.queue, key = %key, "duplicate record, already ingested");
                }
                Err(err) => {
                    self.stats.store_errors += 1;
                    tracing::error!(
                        queue = %delivery.queue,
                        src = %record.src_number,
                        error = %err,
                        "store insert failed, record dropped"
                    );
                }
            },
            Err(err) => {
                self.stats.dropped += 1;
                tracing::warn!(queue = %delivery.queue, error = %err, "unparseable message dropped");
            }
        }

        delivery.ack().await?;

        if self.stats.seen() % PROGRESS_EVERY == 0 {
            tracing::info!(
                processed = self.stats.processed,
                dropped = self.stats.dropped,
                duplicates = self.stats.duplicates,
                store_errors = self.stats.store_errors,
                "consume progress"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;

    use cdrflow_middleware::memory::{InMemoryQueueTransport, InMemoryStore};
    use cdrflow_middleware::QueueSubscription;

    use super::*;

    fn broker_config(shard_count: u32) -> BrokerConfig {
        BrokerConfig {
            url: "nats://localhost:4222".into(),
            queue_prefix: "cdr_queue".into(),
            shard_count,
            max_retries: 3,
            retry_delay: Duration::from_millis(10),
        }
    }

    fn valid_payload() -> Bytes {
        Bytes::from_static(
            br#"{
                "src_number": "09121234567",
                "dest_number": "09129876543",
                "call_duration": 120,
                "call_successful": true,
                "timestamp": "2025-01-02T23:59:57.189920"
            }"#,
        )
    }

    async fn deliver(
        transport: &InMemoryQueueTransport,
        consumer: &mut CdrConsumer,
        queue: &str,
        payload: Bytes,
    ) {
        transport.publish(queue, payload).await.unwrap();
        let mut subscription = transport.subscribe(queue).await.unwrap();
        let delivery = subscription.next().await.unwrap();
        consumer.handle_delivery(delivery).await.unwrap();
    }

    #[tokio::test]
    async fn test_valid_record_stored_and_acked() {
        let transport = Arc::new(InMemoryQueueTransport::new());
        let store = Arc::new(InMemoryStore::new());
        let mut consumer = CdrConsumer::new(
            Arc::clone(&transport) as Arc<dyn QueueTransport>,
            Arc::clone(&store) as Arc<dyn RecordStore>,
            &broker_config(2),
        );

        deliver(&transport, &mut consumer, "cdr_queue_0", valid_payload()).await;

        assert_eq!(store.len(), 1);
        assert_eq!(transport.acked("cdr_queue_0"), 1);
        assert_eq!(consumer.stats().processed, 1);

        // start_time/end_time were absent: both take the timestamp value.
        let record = store.get("09121234567", "09129876543").unwrap();
        assert_eq!(record.start_time, record.timestamp);
        assert_eq!(record.end_time, record.timestamp);
    }

    #[tokio::test]
    async fn test_non_json_acked_and_dropped() {
        let transport = Arc::new(InMemoryQueueTransport::new());
        let store = Arc::new(InMemoryStore::new());
        let mut consumer = CdrConsumer::new(
            Arc::clone(&transport) as Arc<dyn QueueTransport>,
            Arc::clone(&store) as Arc<dyn RecordStore>,
            &broker_config(2),
        );

        deliver(
            &transport,
            &mut consumer,
            "cdr_queue_0",
            Bytes::from_static(b"\x00\x01 not json"),
        )
        .await;

        assert_eq!(store.len(), 0);
        assert_eq!(transport.acked("cdr_queue_0"), 1);
        assert_eq!(consumer.stats().dropped, 1);
    }

    #[tokio::test]
    async fn test_missing_timestamp_acked_and_dropped() {
        let transport = Arc::new(InMemoryQueueTransport::new());
        let store = Arc::new(InMemoryStore::new());
        let mut consumer = CdrConsumer::new(
            Arc::clone(&transport) as Arc<dyn QueueTransport>,
            Arc::clone(&store) as Arc<dyn RecordStore>,
            &broker_config(2),
        );

        deliver(
            &transport,
            &mut consumer,
            "cdr_queue_1",
            Bytes::from_static(
                br#"{"src_number":"09121234567","dest_number":"09129876543","call_successful":true}"#,
            ),
        )
        .await;

        assert_eq!(store.len(), 0);
        assert_eq!(transport.acked("cdr_queue_1"), 1);
        assert_eq!(consumer.stats().dropped, 1);
    }

    #[tokio::test]
    async fn test_duplicate_delivery_acked_once_stored() {
        let transport = Arc::new(InMemoryQueueTransport::new());
        let store = Arc::new(InMemoryStore::new());
        let mut consumer = CdrConsumer::new(
            Arc::clone(&transport) as Arc<dyn QueueTransport>,
            Arc::clone(&store) as Arc<dyn RecordStore>,
            &broker_config(2),
        );

        deliver(&transport, &mut consumer, "cdr_queue_0", valid_payload()).await;
        deliver(&transport, &mut consumer, "cdr_queue_0", valid_payload()).await;

        assert_eq!(store.len(), 1);
        assert_eq!(transport.acked("cdr_queue_0"), 2);
        assert_eq!(consumer.stats().processed, 1);
        assert_eq!(consumer.stats().duplicates, 1);
    }

    struct UnavailableStore;

    #[async_trait]
    impl RecordStore for UnavailableStore {
        async fn insert(&self, _record: &CallRecord) -> std::result::Result<(), StoreError> {
            Err(StoreError::Unavailable("connection reset".into()))
        }
    }

    #[tokio::test]
    async fn test_store_outage_logged_counted_and_acked() {
        let transport = Arc::new(InMemoryQueueTransport::new());
        let mut consumer = CdrConsumer::new(
            Arc::clone(&transport) as Arc<dyn QueueTransport>,
            Arc::new(UnavailableStore) as Arc<dyn RecordStore>,
            &broker_config(2),
        );

        deliver(&transport, &mut consumer, "cdr_queue_0", valid_payload()).await;

        assert_eq!(transport.acked("cdr_queue_0"), 1);
        assert_eq!(consumer.stats().store_errors, 1);
        assert_eq!(consumer.stats().processed, 0);
    }
}
