use async_trait::async_trait;
use bytes::Bytes;

use crate::error::TransportError;

/// Broker-side acknowledgment handle for one delivery.
#[async_trait]
pub trait AckHandle: Send + Sync {
    async fn ack(self: Box<Self>) -> Result<(), TransportError>;
}

/// One message delivered from a shard queue.
///
/// Acknowledgment is manual: a delivery must be explicitly acked after
/// processing, and one dropped without ack stays eligible for broker-side
/// redelivery.
pub struct Delivery {
    pub queue: String,
    pub payload: Bytes,
    pub sequence: Option<u64>,
    acker: Box<dyn AckHandle>,
}

impl Delivery {
    pub fn new(
        queue: String,
        payload: Bytes,
        sequence: Option<u64>,
        acker: Box<dyn AckHandle>,
    ) -> Self {
        Self {
            queue,
            payload,
            sequence,
            acker,
        }
    }

    /// Acknowledge after successful processing (or a deliberate drop).
    pub async fn ack(self) -> Result<(), TransportError> {
        self.acker.ack().await
    }
}

/// Subscription handle for one shard queue.
#[async_trait]
pub trait QueueSubscription: Send + Sync {
    /// Next delivery (blocks until one is available).
    async fn next(&mut self) -> Result<Delivery, TransportError>;
}

/// Durable work-queue transport shared by the producer and consumer roles.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Declare a durable queue. Idempotent; declared queues survive a
    /// broker restart.
    async fn declare_queue(&self, queue: &str) -> Result<(), TransportError>;

    /// Publish a payload to a queue with persistent delivery.
    async fn publish(&self, queue: &str, payload: Bytes) -> Result<(), TransportError>;

    /// Subscribe to a queue with manual acknowledgment.
    async fn subscribe(&self, queue: &str) -> Result<Box<dyn QueueSubscription>, TransportError>;
}
