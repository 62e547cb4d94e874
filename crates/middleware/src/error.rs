use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("not connected")]
    NotConnected,
    #[error("queue declare failed: {0}")]
    QueueDeclareFailed(String),
    #[error("publish failed: {0}")]
    PublishFailed(String),
    #[error("subscribe failed: {0}")]
    SubscribeFailed(String),
    #[error("ack failed: {0}")]
    AckFailed(String),
    #[error("subscription closed")]
    SubscriptionClosed,
}

impl TransportError {
    /// Connection- and channel-level failures are worth retrying under a
    /// budget; everything else is permanent for the operation that hit it.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::ConnectionFailed(_)
                | TransportError::QueueDeclareFailed(_)
                | TransportError::PublishFailed(_)
        )
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    /// `(src_number, dest_number)` already present. Expected under
    /// at-least-once delivery; not an escalation.
    #[error("duplicate record: {0}")]
    Duplicate(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("insert failed: {0}")]
    InsertFailed(String),
}
