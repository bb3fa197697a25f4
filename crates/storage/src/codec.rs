//! Text codec for temporal values.

use chrono::{DateTime, NaiveDateTime};
use kvorm_core::{Codec, DataType, Value};

/// Storage format of `DateTime` values.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Stores timestamps as UTC text (`2024-05-01 12:00:00`, second precision)
/// and leaves every other value untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct TextCodec;

impl Codec for TextCodec {
    fn encode(&self, value: &Value) -> Value {
        match value {
            Value::DateTime(ms) => DateTime::from_timestamp_millis(*ms)
                .map(|dt| Value::String(dt.naive_utc().format(DATETIME_FORMAT).to_string()))
                .unwrap_or_else(|| value.clone()),
            other => other.clone(),
        }
    }

    fn decode(&self, value: &Value, data_type: DataType) -> Value {
        match (data_type, value) {
            (DataType::DateTime, Value::String(text)) => {
                NaiveDateTime::parse_from_str(text, DATETIME_FORMAT)
                    .map(|dt| Value::DateTime(dt.and_utc().timestamp_millis()))
                    .unwrap_or_else(|_| value.clone())
            }
            _ => value.clone(),
        }
    }
}
