//! NATS JetStream implementation of the queue transport.
//!
//! A shard "queue" is a durable work-queue stream whose single subject is
//! the queue name itself; publishes await the JetStream ack so a confirmed
//! message has hit broker storage.

mod connection;

pub use connection::{BrokerConfig, BrokerConnection, ConnectionState};
