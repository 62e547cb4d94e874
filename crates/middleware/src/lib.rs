//! cdrflow-middleware: broker and store abstractions
//!
//! Trait seams for the shard-queue transport and the record store, the
//! shard router, bounded retry schedules, the NATS JetStream broker
//! implementation, and in-memory implementations for testing.

pub mod error;
pub mod memory;
pub mod nats;
pub mod retry;
pub mod shard;
pub mod store;
pub mod transport;

pub use error::{StoreError, TransportError};
pub use nats::{BrokerConfig, BrokerConnection, ConnectionState};
pub use retry::{run_with_retry, RetryBudget};
pub use shard::{queue_name, shard_for};
pub use store::RecordStore;
pub use transport::{AckHandle, Delivery, QueueSubscription, QueueTransport};
