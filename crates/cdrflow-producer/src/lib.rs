//! cdrflow-producer: shard-routed durable CDR publisher

pub mod config;
pub mod error;
pub mod generator;
pub mod publisher;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
