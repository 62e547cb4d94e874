use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::error::RecordError;
use crate::validate::is_valid_mobile_number;

/// Wire-format CDR message, one per call record.
///
/// `src_number`, `dest_number`, `call_successful` and `timestamp` are
/// required; a payload missing any of them fails deserialization and is
/// treated as malformed by the consumer. `start_time`/`end_time` default to
/// `timestamp` during normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CdrMessage {
    pub src_number: String,
    pub dest_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_duration: Option<u32>,
    pub call_successful: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    pub timestamp: String,
}

impl CdrMessage {
    pub fn from_slice(payload: &[u8]) -> Result<Self, RecordError> {
        Ok(serde_json::from_slice(payload)?)
    }
}

/// Canonical call record: validated numbers and timezone-aware timestamps,
/// ready for the store. `(src_number, dest_number)` is unique at the store.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRecord {
    pub src_number: String,
    pub dest_number: String,
    pub call_duration: Option<u32>,
    pub call_successful: bool,
    pub start_time: DateTime<Local>,
    pub end_time: DateTime<Local>,
    pub timestamp: DateTime<Local>,
}

impl CallRecord {
    /// Validate and normalize a wire message.
    ///
    /// Absent `start_time`/`end_time` take the value of `timestamp`. All
    /// three are attached to the process-local timezone; a naive timestamp
    /// never reaches the store.
    pub fn from_wire(message: CdrMessage) -> Result<Self, RecordError> {
        if !is_valid_mobile_number(&message.src_number) {
            return Err(RecordError::InvalidNumber {
                field: "src_number",
                value: message.src_number,
            });
        }
        if !is_valid_mobile_number(&message.dest_number) {
            return Err(RecordError::InvalidNumber {
                field: "dest_number",
                value: message.dest_number,
            });
        }

        let timestamp = parse_local("timestamp", &message.timestamp)?;
        let start_time = match message.start_time.as_deref() {
            Some(value) => parse_local("start_time", value)?,
            None => timestamp,
        };
        let end_time = match message.end_time.as_deref() {
            Some(value) => parse_local("end_time", value)?,
            None => timestamp,
        };

        Ok(Self {
            src_number: message.src_number,
            dest_number: message.dest_number,
            call_duration: message.call_duration,
            call_successful: message.call_successful,
            start_time,
            end_time,
            timestamp,
        })
    }
}

/// Parse a wire timestamp and attach the local reference timezone.
/// A value carrying its own offset keeps its instant; a naive value is
/// interpreted in the local zone.
fn parse_local(field: &'static str, value: &str) -> Result<DateTime<Local>, RecordError> {
    if let Ok(aware) = DateTime::parse_from_rfc3339(value) {
        return Ok(aware.with_timezone(&Local));
    }

    let naive: NaiveDateTime = value.parse().map_err(|_| RecordError::InvalidTimestamp {
        field,
        value: value.to_string(),
    })?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| RecordError::InvalidTimestamp {
            field,
            value: value.to_string(),
        })
}
