//! cdrflow-model: shared CDR domain types
//!
//! The wire message and canonical record shared by the producer and consumer
//! roles, plus field validation and timestamp normalization. No I/O.

pub mod error;
pub mod record;
pub mod validate;

pub use error::RecordError;
pub use record::{CallRecord, CdrMessage};
