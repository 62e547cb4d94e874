use thiserror::Error;

use cdrflow_middleware::{StoreError, TransportError};

#[derive(Error, Debug)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("all shard subscriptions closed")]
    SubscriptionsClosed,
}
