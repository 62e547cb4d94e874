use thiserror::Error;

use cdrflow_middleware::TransportError;

#[derive(Error, Debug)]
pub enum Error {
    /// Retry budget exhausted on transient broker failures; the record was
    /// never confirmed durable. The caller decides whether to escalate to a
    /// dead-letter path.
    #[error("publish to {queue} failed after {attempts} attempts: {source}")]
    PublishFailed {
        queue: String,
        attempts: u32,
        #[source]
        source: TransportError,
    },

    /// Broker failure that is not worth retrying.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Record could not be serialized; never retried.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}
