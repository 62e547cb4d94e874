//! Synthetic CDR generation for load seeding. Not part of the delivery
//! guarantees; only scenario tooling.

use chrono::NaiveDateTime;
use rand::Rng;

use cdrflow_model::CdrMessage;

/// Produce one wire-ready synthetic record.
///
/// `timestamp` is the generation instant; `start_time` precedes `end_time`
/// by the call duration. Numbers use the 0912 operator block so every
/// generated record passes consumer-side validation.
pub fn generate() -> CdrMessage {
    let mut rng = rand::rng();
    let duration: u32 = rng.random_range(1..=3600);
    let now = chrono::Local::now().naive_local();
    let start = now - chrono::Duration::seconds(i64::from(duration));

    CdrMessage {
        src_number: random_number(&mut rng),
        dest_number: random_number(&mut rng),
        call_duration: Some(duration),
        call_successful: rng.random_bool(0.8),
        start_time: Some(format_naive(start)),
        end_time: Some(format_naive(now)),
        timestamp: format_naive(now),
    }
}

fn random_number<R: Rng>(rng: &mut R) -> String {
    format!("0912{:07}", rng.random_range(0..10_000_000u32))
}

fn format_naive(value: NaiveDateTime) -> String {
    value.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

#[cfg(test)]
mod tests {
    use cdrflow_model::{validate::is_valid_mobile_number, CallRecord};

    use super::*;

    #[test]
    fn test_generated_record_shape() {
        let record = generate();

        assert!(record.src_number.starts_with("0912"));
        assert!(record.dest_number.starts_with("0912"));
        assert!(is_valid_mobile_number(&record.src_number));
        assert!(is_valid_mobile_number(&record.dest_number));

        let duration = record.call_duration.expect("generator always sets duration");
        assert!((1..=3600).contains(&duration));
    }

    #[test]
    fn test_generated_timestamps_parse() {
        let record = generate();

        for value in [
            record.start_time.as_deref().unwrap(),
            record.end_time.as_deref().unwrap(),
            &record.timestamp,
        ] {
            value.parse::<NaiveDateTime>().expect("ISO datetime");
        }
    }

    #[test]
    fn test_generated_record_normalizes() {
        let record = CallRecord::from_wire(generate()).unwrap();
        assert!(record.start_time <= record.end_time);
        assert_eq!(record.end_time, record.timestamp);
    }
}
