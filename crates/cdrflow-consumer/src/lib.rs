//! cdrflow-consumer: drains CDR shard queues into the record store

pub mod config;
pub mod consumer;
pub mod error;
pub mod store;

pub use consumer::{CdrConsumer, ConsumerState, ConsumerStats};
pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
