use thiserror::Error;

/// Why a wire payload could not become a canonical record. All of these are
/// permanent for the payload in question: redelivery cannot fix them.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid {field}: {value}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("invalid {field}: {value}")]
    InvalidTimestamp { field: &'static str, value: String },
}
