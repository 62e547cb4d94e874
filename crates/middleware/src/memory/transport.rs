use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};

use crate::error::TransportError;
use crate::transport::{AckHandle, Delivery, QueueSubscription, QueueTransport};

#[derive(Clone)]
struct Queue {
    tx: mpsc::UnboundedSender<(u64, Bytes)>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<(u64, Bytes)>>>,
    published: Arc<AtomicU64>,
    acked: Arc<AtomicU64>,
}

impl Queue {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            published: Arc::new(AtomicU64::new(0)),
            acked: Arc::new(AtomicU64::new(0)),
        }
    }
}

/// In-memory work queues standing in for the broker in tests.
///
/// Each queue delivers a message to exactly one subscriber (competing
/// consumers share the queue) and counts publishes and acknowledgments so
/// tests can assert on routing and ack discipline.
pub struct InMemoryQueueTransport {
    queues: DashMap<String, Queue>,
    sequence: AtomicU64,
}

impl InMemoryQueueTransport {
    pub fn new() -> Self {
        Self {
            queues: DashMap::new(),
            sequence: AtomicU64::new(0),
        }
    }

    fn queue(&self, name: &str) -> Queue {
        self.queues
            .entry(name.to_string())
            .or_insert_with(Queue::new)
            .clone()
    }

    /// Messages published to a queue so far.
    pub fn published(&self, queue: &str) -> u64 {
        self.queues
            .get(queue)
            .map(|q| q.published.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Deliveries acknowledged on a queue so far.
    pub fn acked(&self, queue: &str) -> u64 {
        self.queues
            .get(queue)
            .map(|q| q.acked.load(Ordering::SeqCst))
            .unwrap_or(0)
    }
}

impl Default for InMemoryQueueTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueTransport for InMemoryQueueTransport {
    async fn declare_queue(&self, queue: &str) -> Result<(), TransportError> {
        self.queue(queue);
        Ok(())
    }

    async fn publish(&self, queue: &str, payload: Bytes) -> Result<(), TransportError> {
        let q = self.queue(queue);
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        q.tx.send((seq, payload))
            .map_err(|_| TransportError::PublishFailed("queue closed".to_string()))?;
        q.published.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe(&self, queue: &str) -> Result<Box<dyn QueueSubscription>, TransportError> {
        let q = self.queue(queue);
        Ok(Box::new(InMemorySubscription {
            queue: queue.to_string(),
            rx: q.rx,
            acked: q.acked,
        }))
    }
}

struct InMemorySubscription {
    queue: String,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<(u64, Bytes)>>>,
    acked: Arc<AtomicU64>,
}

#[async_trait]
impl QueueSubscription for InMemorySubscription {
    async fn next(&mut self) -> Result<Delivery, TransportError> {
        let (sequence, payload) = self
            .rx
            .lock()
            .await
            .recv()
            .await
            .ok_or(TransportError::SubscriptionClosed)?;

        Ok(Delivery::new(
            self.queue.clone(),
            payload,
            Some(sequence),
            Box::new(InMemoryAck {
                acked: Arc::clone(&self.acked),
            }),
        ))
    }
}

struct InMemoryAck {
    acked: Arc<AtomicU64>,
}

#[async_trait]
impl AckHandle for InMemoryAck {
    async fn ack(self: Box<Self>) -> Result<(), TransportError> {
        self.acked.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_subscribe_roundtrip() {
        let transport = InMemoryQueueTransport::new();
        let mut sub = transport.subscribe("cdr_queue_0").await.unwrap();

        transport
            .publish("cdr_queue_0", Bytes::from_static(b"hello"))
            .await
            .unwrap();

        let delivery = sub.next().await.unwrap();
        assert_eq!(delivery.queue, "cdr_queue_0");
        assert_eq!(delivery.payload, Bytes::from_static(b"hello"));
        assert_eq!(transport.published("cdr_queue_0"), 1);
    }

    #[tokio::test]
    async fn test_ack_is_counted() {
        let transport = InMemoryQueueTransport::new();
        let mut sub = transport.subscribe("cdr_queue_0").await.unwrap();

        transport
            .publish("cdr_queue_0", Bytes::from_static(b"x"))
            .await
            .unwrap();

        let delivery = sub.next().await.unwrap();
        assert_eq!(transport.acked("cdr_queue_0"), 0);
        delivery.ack().await.unwrap();
        assert_eq!(transport.acked("cdr_queue_0"), 1);
    }

    #[tokio::test]
    async fn test_sequences_increment() {
        let transport = InMemoryQueueTransport::new();
        let mut sub = transport.subscribe("q").await.unwrap();

        transport.publish("q", Bytes::from_static(b"1")).await.unwrap();
        transport.publish("q", Bytes::from_static(b"2")).await.unwrap();

        let first = sub.next().await.unwrap();
        let second = sub.next().await.unwrap();
        assert!(first.sequence.unwrap() < second.sequence.unwrap());
    }

    #[tokio::test]
    async fn test_competing_consumers_split_the_queue() {
        let transport = InMemoryQueueTransport::new();
        let mut first = transport.subscribe("q").await.unwrap();
        let mut second = transport.subscribe("q").await.unwrap();

        transport.publish("q", Bytes::from_static(b"a")).await.unwrap();
        transport.publish("q", Bytes::from_static(b"b")).await.unwrap();

        // Each message goes to exactly one subscriber.
        let one = first.next().await.unwrap();
        let two = second.next().await.unwrap();
        assert_ne!(one.payload, two.payload);
    }

    #[tokio::test]
    async fn test_queues_are_isolated() {
        let transport = InMemoryQueueTransport::new();
        let mut sub = transport.subscribe("q_0").await.unwrap();

        transport.publish("q_1", Bytes::from_static(b"other")).await.unwrap();
        transport.publish("q_0", Bytes::from_static(b"mine")).await.unwrap();

        let delivery = sub.next().await.unwrap();
        assert_eq!(delivery.payload, Bytes::from_static(b"mine"));
        assert_eq!(transport.published("q_1"), 1);
    }
}
