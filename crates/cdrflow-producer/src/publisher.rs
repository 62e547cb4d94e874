//! Shard-routed durable publisher with exponential-backoff retry.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use cdrflow_middleware::{queue_name, shard_for, BrokerConfig, QueueTransport, RetryBudget};
use cdrflow_model::CdrMessage;

use crate::{Error, Result};

pub struct Producer {
    transport: Arc<dyn QueueTransport>,
    queue_prefix: String,
    shard_count: u32,
    max_retries: u32,
    base_delay: Duration,
}

impl Producer {
    pub fn new(transport: Arc<dyn QueueTransport>, config: &BrokerConfig) -> Self {
        Self {
            transport,
            queue_prefix: config.queue_prefix.clone(),
            shard_count: config.shard_count,
            max_retries: config.max_retries,
            base_delay: config.retry_delay,
        }
    }

    /// Publish one record durably to its shard queue.
    ///
    /// The shard is resolved from `src_number`, so all of a source's
    /// traffic lands on one partition. Serialization failures are permanent
    /// and never retried. A transient broker failure consumes the retry
    /// budget: the delay doubles after every failed attempt, with
    /// `max_retries` attempts in total. Success returns immediately with no
    /// further attempts; exhaustion surfaces [`Error::PublishFailed`] and
    /// leaves any dead-letter handling to the caller.
    pub async fn publish(&self, message: &CdrMessage) -> Result<()> {
        let payload = Bytes::from(serde_json::to_vec(message)?);
        let shard = shard_for(&message.src_number, self.shard_count);
        let queue = queue_name(&self.queue_prefix, shard);

        let mut budget = RetryBudget::exponential(self.max_retries, self.base_delay);
        loop {
            match self.transport.publish(&queue, payload.clone()).await {
                Ok(()) => {
                    tracing::debug!(queue = %queue, src = %message.src_number, "published record");
                    return Ok(());
                }
                Err(err) if err.is_transient() => match budget.next_delay() {
                    Some(delay) => {
                        tracing::warn!(
                            queue = %queue,
                            attempt = budget.attempts(),
                            max_retries = self.max_retries,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "publish failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        return Err(Error::PublishFailed {
                            queue,
                            attempts: budget.attempts(),
                            source: err,
                        });
                    }
                },
                Err(err) => return Err(Error::Transport(err)),
            }
        }
    }
}
