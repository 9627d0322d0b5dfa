//! Binary log-group encoding and LZ4 block compression

use crate::types::{LogFields, Message};
use crate::{Result, ShipError};
use chrono::{TimeZone, Utc};
use prost::Message as _;

/// One key/value pair of a log entry
#[derive(Clone, PartialEq, prost::Message)]
pub struct LogContent {
    /// Field name
    #[prost(string, required, tag = "1")]
    pub key: String,
    /// Field value
    #[prost(string, required, tag = "2")]
    pub value: String,
}

/// One log entry
#[derive(Clone, PartialEq, prost::Message)]
pub struct Log {
    /// Unix timestamp in seconds
    #[prost(uint32, required, tag = "1")]
    pub time: u32,
    /// Unordered fields
    #[prost(message, repeated, tag = "2")]
    pub contents: Vec<LogContent>,
}

/// One request worth of log entries
#[derive(Clone, PartialEq, prost::Message)]
pub struct LogGroup {
    /// Entries in submission order
    #[prost(message, repeated, tag = "1")]
    pub logs: Vec<Log>,
    /// Group topic
    #[prost(string, optional, tag = "3")]
    pub topic: Option<String>,
    /// Group source
    #[prost(string, optional, tag = "4")]
    pub source: Option<String>,
}

/// Serialize a batch into an encoded `LogGroup`
pub fn encode(topic: &str, source: &str, batch: &[Message]) -> Result<Vec<u8>> {
    let logs = batch
        .iter()
        .map(|msg| {
            let time = u32::try_from(msg.timestamp().timestamp()).map_err(|_| {
                ShipError::Encode(format!("timestamp {} out of range", msg.timestamp()))
            })?;
            let contents = msg
                .fields()
                .iter()
                .map(|(key, value)| LogContent {
                    key: key.clone(),
                    value: value.clone(),
                })
                .collect();
            Ok(Log { time, contents })
        })
        .collect::<Result<Vec<_>>>()?;

    let group = LogGroup {
        logs,
        topic: Some(topic.to_string()),
        source: Some(source.to_string()),
    };

    let mut buf = Vec::with_capacity(group.encoded_len());
    group
        .encode(&mut buf)
        .map_err(|e| ShipError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Decode an encoded `LogGroup` back into messages
pub fn decode(raw: &[u8]) -> Result<(LogGroup, Vec<Message>)> {
    let group = LogGroup::decode(raw).map_err(|e| ShipError::Encode(e.to_string()))?;
    let messages = group
        .logs
        .iter()
        .map(|log| {
            let timestamp = Utc
                .timestamp_opt(i64::from(log.time), 0)
                .single()
                .ok_or_else(|| ShipError::Encode(format!("invalid timestamp {}", log.time)))?;
            let fields: LogFields = log
                .contents
                .iter()
                .map(|c| (c.key.clone(), c.value.clone()))
                .collect();
            Ok(Message::new(timestamp, fields))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((group, messages))
}

/// Worst-case compressed size for `input_len` bytes
pub fn compress_bound(input_len: usize) -> usize {
    lz4_flex::block::get_maximum_output_size(input_len)
}

/// LZ4 block-compress the encoded bytes
pub fn compress(raw: &[u8]) -> Result<Vec<u8>> {
    let mut out = vec![0u8; compress_bound(raw.len())];
    let n = lz4_flex::block::compress_into(raw, &mut out)
        .map_err(|e| ShipError::Compress(e.to_string()))?;
    out.truncate(n);
    Ok(out)
}

/// Inverse of [`compress`]; `raw_len` is the `X-Log-Bodyrawsize` value
pub fn decompress(compressed: &[u8], raw_len: usize) -> Result<Vec<u8>> {
    lz4_flex::block::decompress(compressed, raw_len).map_err(|e| ShipError::Compress(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn sample_batch() -> Vec<Message> {
        let long_key = "key1".repeat(10);
        vec![
            Message::new(at(1_577_836_800), LogFields::new()).with_field("key", "value"),
            Message::new(at(1_577_836_801), LogFields::new())
                .with_field(long_key, "value2".repeat(20))
                .with_field("key2".repeat(10), "value2".repeat(20)),
        ]
    }

    #[test]
    fn test_round_trip_preserves_batch() {
        let batch = sample_batch();

        let raw = encode("test-topic", "127.0.0.1", &batch).unwrap();
        let compressed = compress(&raw).unwrap();
        assert!(compressed.len() <= compress_bound(raw.len()));

        let (group, decoded) = decode(&decompress(&compressed, raw.len()).unwrap()).unwrap();
        assert_eq!(group.topic.as_deref(), Some("test-topic"));
        assert_eq!(group.source.as_deref(), Some("127.0.0.1"));
        assert_eq!(decoded, batch);
    }

    #[test]
    fn test_timestamps_truncate_to_seconds() {
        let ts = DateTime::parse_from_rfc3339("2020-01-01T00:00:00.750Z")
            .unwrap()
            .with_timezone(&Utc);
        let batch = vec![Message::new(ts, LogFields::new())];

        let (_, decoded) = decode(&encode("t", "s", &batch).unwrap()).unwrap();
        assert_eq!(decoded[0].timestamp(), at(1_577_836_800));
    }

    #[test]
    fn test_order_is_preserved() {
        let batch: Vec<Message> = (0..50)
            .map(|i| Message::new(at(1_600_000_000), LogFields::new()).with_field("no", i.to_string()))
            .collect();

        let (_, decoded) = decode(&encode("t", "s", &batch).unwrap()).unwrap();
        let order: Vec<&str> = decoded.iter().map(|m| m.get("no").unwrap()).collect();
        let expected: Vec<String> = (0..50).map(|i| i.to_string()).collect();
        assert_eq!(order, expected.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[test]
    fn test_pre_epoch_timestamp_is_encode_error() {
        let batch = vec![Message::new(at(-1), LogFields::new())];
        assert!(matches!(encode("t", "s", &batch), Err(ShipError::Encode(_))));
    }
}
