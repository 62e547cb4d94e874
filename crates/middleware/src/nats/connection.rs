use std::time::Duration;

use async_nats::jetstream::{
    self,
    consumer::PullConsumer,
    stream::{Config as StreamConfig, RetentionPolicy, StorageType},
    Context,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::RwLock;

use crate::error::TransportError;
use crate::retry::{run_with_retry, RetryBudget};
use crate::shard::queue_name;
use crate::transport::{AckHandle, Delivery, QueueSubscription, QueueTransport};

/// Name of the durable pull consumer bound to each shard queue. Competing
/// consumer processes bind the same durable and the broker load-balances
/// a queue's messages between them.
const WORKER_CONSUMER: &str = "worker";

/// Broker coordinates plus the sharding and retry settings both roles
/// share. Fixed at process start; producer and consumer deployments must
/// agree on `queue_prefix` and `shard_count` or messages land on queues
/// nobody drains.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub url: String,
    pub queue_prefix: String,
    pub shard_count: u32,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl BrokerConfig {
    /// All shard queue names, `{prefix}_{0}` through `{prefix}_{n-1}`.
    pub fn queue_names(&self) -> Vec<String> {
        (0..self.shard_count)
            .map(|shard| queue_name(&self.queue_prefix, shard))
            .collect()
    }
}

/// Lifecycle of one role's broker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

struct Handle {
    client: async_nats::Client,
    jetstream: Context,
}

struct Inner {
    state: ConnectionState,
    handle: Option<Handle>,
}

/// One physical broker connection per process role.
///
/// Constructed at the composition root and shared by reference
/// (`Arc<BrokerConnection>`); the connection is an expensive stateful
/// resource that must not be duplicated per request. `connect` dials with a
/// bounded fixed-delay retry and declares every shard queue before
/// returning, so producers and consumers can start in any order without
/// racing on queue existence.
pub struct BrokerConnection {
    config: BrokerConfig,
    inner: RwLock<Inner>,
}

impl BrokerConnection {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(Inner {
                state: ConnectionState::Disconnected,
                handle: None,
            }),
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.read().await.state
    }

    /// Establish the connection and declare all shard queues.
    ///
    /// Transient dial failures are retried up to `max_retries` total
    /// attempts with a fixed `retry_delay` between them. Exhaustion leaves
    /// the connection unset, transitions to `Failed` and returns the last
    /// error: a fatal condition for the owning role, surfaced rather than
    /// swallowed. Reconnecting an already-connected instance is a no-op.
    pub async fn connect(&self) -> Result<(), TransportError> {
        {
            let mut inner = self.inner.write().await;
            if inner.handle.is_some() {
                return Ok(());
            }
            inner.state = ConnectionState::Connecting;
        }

        let budget = RetryBudget::fixed(self.config.max_retries, self.config.retry_delay);
        let config = self.config.clone();
        let dialed = run_with_retry(budget, move |attempt| {
            let config = config.clone();
            async move {
                tracing::info!(url = %config.url, attempt, "connecting to broker");
                dial(&config).await
            }
        })
        .await;

        let mut inner = self.inner.write().await;
        match dialed {
            Ok(handle) => {
                inner.state = ConnectionState::Connected;
                inner.handle = Some(handle);
                tracing::info!(
                    url = %self.config.url,
                    queues = self.config.shard_count,
                    prefix = %self.config.queue_prefix,
                    "broker connected, shard queues declared"
                );
                Ok(())
            }
            Err(err) => {
                inner.state = ConnectionState::Failed;
                inner.handle = None;
                tracing::error!(
                    url = %self.config.url,
                    attempts = self.config.max_retries,
                    error = %err,
                    "broker connection failed, giving up"
                );
                Err(err)
            }
        }
    }

    /// Release the connection. Idempotent: closing a never-opened or
    /// already-closed connection is a no-op and performs no I/O.
    pub async fn close(&self) -> Result<(), TransportError> {
        let handle = {
            let mut inner = self.inner.write().await;
            inner.state = ConnectionState::Disconnected;
            inner.handle.take()
        };
        let Some(handle) = handle else {
            return Ok(());
        };
        handle
            .client
            .drain()
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        tracing::info!(url = %self.config.url, "broker connection closed");
        Ok(())
    }

    async fn jetstream(&self) -> Result<Context, TransportError> {
        let inner = self.inner.read().await;
        match &inner.handle {
            Some(handle) => Ok(handle.jetstream.clone()),
            None => Err(TransportError::NotConnected),
        }
    }
}

async fn dial(config: &BrokerConfig) -> Result<Handle, TransportError> {
    let client = async_nats::connect(&config.url)
        .await
        .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
    let jetstream = jetstream::new(client.clone());

    // Every shard queue exists before any publish or consume begins.
    for queue in config.queue_names() {
        declare(&jetstream, &queue).await?;
    }

    Ok(Handle { client, jetstream })
}

async fn declare(jetstream: &Context, queue: &str) -> Result<(), TransportError> {
    let config = StreamConfig {
        name: queue.to_string(),
        subjects: vec![queue.to_string()],
        retention: RetentionPolicy::WorkQueue,
        storage: StorageType::File,
        ..Default::default()
    };

    jetstream
        .get_or_create_stream(config)
        .await
        .map_err(|e| TransportError::QueueDeclareFailed(e.to_string()))?;
    Ok(())
}

#[async_trait]
impl QueueTransport for BrokerConnection {
    async fn declare_queue(&self, queue: &str) -> Result<(), TransportError> {
        let jetstream = self.jetstream().await?;
        declare(&jetstream, queue).await
    }

    async fn publish(&self, queue: &str, payload: Bytes) -> Result<(), TransportError> {
        let jetstream = self.jetstream().await?;
        // Double ack: the publish is confirmed only once the broker reports
        // the message durable.
        jetstream
            .publish(queue.to_string(), payload)
            .await
            .map_err(|e| TransportError::PublishFailed(e.to_string()))?
            .await
            .map_err(|e| TransportError::PublishFailed(e.to_string()))?;
        Ok(())
    }

    async fn subscribe(&self, queue: &str) -> Result<Box<dyn QueueSubscription>, TransportError> {
        let jetstream = self.jetstream().await?;
        let stream = jetstream
            .get_stream(queue)
            .await
            .map_err(|e| TransportError::SubscribeFailed(format!("queue not found: {}", e)))?;

        let consumer: PullConsumer = stream
            .get_or_create_consumer(
                WORKER_CONSUMER,
                jetstream::consumer::pull::Config {
                    durable_name: Some(WORKER_CONSUMER.to_string()),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| TransportError::SubscribeFailed(e.to_string()))?;

        let messages = consumer
            .stream()
            .heartbeat(Duration::from_secs(5))
            .messages()
            .await
            .map_err(|e| TransportError::SubscribeFailed(e.to_string()))?;

        Ok(Box::new(NatsSubscription {
            queue: queue.to_string(),
            messages,
        }))
    }
}

struct NatsSubscription {
    queue: String,
    messages: jetstream::consumer::pull::Stream,
}

#[async_trait]
impl QueueSubscription for NatsSubscription {
    async fn next(&mut self) -> Result<Delivery, TransportError> {
        let message = self
            .messages
            .next()
            .await
            .ok_or(TransportError::SubscriptionClosed)?
            .map_err(|e| TransportError::SubscribeFailed(e.to_string()))?;

        let sequence = message.info().ok().map(|info| info.stream_sequence);
        Ok(Delivery::new(
            self.queue.clone(),
            message.payload.clone(),
            sequence,
            Box::new(NatsAck { message }),
        ))
    }
}

struct NatsAck {
    message: jetstream::message::Message,
}

#[async_trait]
impl AckHandle for NatsAck {
    async fn ack(self: Box<Self>) -> Result<(), TransportError> {
        self.message
            .ack()
            .await
            .map_err(|e| TransportError::AckFailed(e.to_string()))
    }
}
