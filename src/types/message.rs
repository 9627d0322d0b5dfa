//! Log record type and JSON record parsing

use crate::{Result, ShipError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Type alias for log fields
pub type LogFields = HashMap<String, String>;

/// Field holding the record timestamp in incoming JSON records
pub const DEFAULT_TIME_KEY: &str = "time";

/// One structured log record accepted by the pipeline.
///
/// Field values are already stringified; see [`Message::from_json`] for the
/// flattening rules applied to non-string JSON values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    timestamp: DateTime<Utc>,
    fields: LogFields,
}

impl Message {
    /// Create a message from a timestamp and fields
    pub fn new(timestamp: DateTime<Utc>, fields: LogFields) -> Self {
        Self { timestamp, fields }
    }

    /// Create a message stamped with the current time
    pub fn now(fields: LogFields) -> Self {
        Self::new(Utc::now(), fields)
    }

    /// Return a copy of this message with one field set
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Return a copy of this message with a different timestamp
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Record timestamp
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// All fields of the record
    pub fn fields(&self) -> &LogFields {
        &self.fields
    }

    /// Look up a single field
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Split into timestamp and fields
    pub fn into_parts(self) -> (DateTime<Utc>, LogFields) {
        (self.timestamp, self.fields)
    }

    /// Parse one JSON object using the default `"time"` timestamp key
    pub fn from_json(data: &[u8]) -> Result<Self> {
        Self::from_json_with_time_key(data, DEFAULT_TIME_KEY)
    }

    /// Parse one JSON object into a message.
    ///
    /// If `time_key` is present it must hold an RFC 3339 string; it becomes the
    /// timestamp and is removed from the fields. Otherwise the record is stamped
    /// with the current time. Remaining values are flattened to text: strings
    /// unescaped, numbers and booleans as written, `null` as `null`, arrays and
    /// objects as compact JSON.
    pub fn from_json_with_time_key(data: &[u8], time_key: &str) -> Result<Self> {
        let object = match serde_json::from_slice::<Value>(data)? {
            Value::Object(object) => object,
            other => {
                return Err(ShipError::InvalidRecord(format!(
                    "expected a JSON object, got {}",
                    json_kind(&other)
                )))
            }
        };

        let mut timestamp = Utc::now();
        let mut fields = HashMap::with_capacity(object.len());

        for (key, value) in object {
            if key == time_key {
                timestamp = parse_timestamp(&key, value)?;
                continue;
            }
            fields.insert(key, flatten_value(value));
        }

        Ok(Self { timestamp, fields })
    }

    /// Format as human-readable string
    pub fn to_human_readable(&self) -> String {
        let timestamp = self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f");
        let mut pairs: Vec<_> = self.fields.iter().collect();
        pairs.sort();
        let fields: Vec<String> = pairs.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        format!("{} {}", timestamp, fields.join(" "))
    }
}

fn parse_timestamp(key: &str, value: Value) -> Result<DateTime<Utc>> {
    match value {
        Value::String(text) => DateTime::parse_from_rfc3339(&text)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| ShipError::InvalidRecord(format!("field {:?}: {}", key, e))),
        other => Err(ShipError::InvalidRecord(format!(
            "field {:?} must be an RFC 3339 string, got {}",
            key,
            json_kind(&other)
        ))),
    }
}

fn flatten_value(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Null => "null".to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        nested @ (Value::Array(_) | Value::Object(_)) => nested.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
