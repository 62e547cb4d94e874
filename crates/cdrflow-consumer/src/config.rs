use cdrflow_middleware::BrokerConfig;

use crate::{Error, Result};

/// Settings for one consumer process, immutable after start.
///
/// `queue_prefix` and `shard_count` must match the producer deployment:
/// a mismatch silently routes messages to queues nobody consumes, so the
/// two roles redeploy in lockstep when the shard count changes.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub broker: BrokerConfig,
    pub database_url: String,
}

impl ConsumerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.broker.shard_count == 0 {
            return Err(Error::Config("shard_count must be at least 1".into()));
        }
        if self.broker.max_retries == 0 {
            return Err(Error::Config("max_retries must be at least 1".into()));
        }
        if self.database_url.is_empty() {
            return Err(Error::Config("database_url must be set".into()));
        }
        Ok(())
    }
}
