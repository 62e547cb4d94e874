use std::time::Duration;

use cdrflow_middleware::BrokerConfig;

use crate::{Error, Result};

/// Settings for one producer process, immutable after start.
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    pub broker: BrokerConfig,
    /// Synthetic records to publish in load mode.
    pub num_messages: u32,
    /// Log a progress line every this many records.
    pub progress_interval: u32,
    /// Pause after each progress line to avoid flooding the broker.
    pub throttle: Duration,
}

impl ProducerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.broker.shard_count == 0 {
            return Err(Error::Config("shard_count must be at least 1".into()));
        }
        if self.broker.max_retries == 0 {
            return Err(Error::Config("max_retries must be at least 1".into()));
        }
        Ok(())
    }
}
