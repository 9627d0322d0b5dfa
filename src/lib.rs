//! # logship - Batched, Signed Log Shipping
//!
//! logship is an in-process log shipping pipeline. It accepts structured log
//! records (one JSON object per write), buffers them on a bounded queue, batches
//! them, and delivers each batch to a log-ingestion endpoint as an LZ4-compressed
//! protobuf `LogGroup` over an HMAC-SHA1 signed HTTP request.
//!
//! ## Features
//!
//! - **Bounded Backpressure**: the admission queue holds twice the batch size;
//!   writers wait only while it is full
//! - **Three Flush Triggers**: batch-size threshold, periodic interval, shutdown drain
//! - **Graceful Shutdown**: `close()` delivers every accepted record before returning
//! - **Filters and Modifiers**: drop or rewrite records before they are queued
//! - **Never Crashes the Host**: delivery failures go to an error listener, not the caller
//! - **tracing Integration**: `Sink::layer()` ships events from any subscriber stack
//!
//! ## Quick Start
//!
//! ```no_run
//! use logship::config::ShipperConfig;
//! use logship::sink::{LevelFilter, RenameField, Sink};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ShipperConfig::from_file("config/logship.toml")?;
//!
//!     let sink = Sink::builder(config)
//!         .filter(LevelFilter::info())
//!         .modifier(RenameField::message())
//!         .on_error(|err| eprintln!("log delivery failed: {err}"))
//!         .build()?;
//!
//!     sink.write(br#"{"level":"INFO","msg":"user logged in","user_id":42}"#).await?;
//!     sink.close().await;
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod sink;
pub mod transport;
pub mod types;
pub mod worker;

/// Common error types used throughout logship
pub mod error {
    use serde::{Deserialize, Serialize};
    use std::fmt;
    use std::time::Duration;

    /// A rejection returned by the ingestion endpoint (HTTP status >= 400)
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct DeliveryError {
        /// HTTP status code of the response
        #[serde(skip)]
        pub http_status: u16,
        /// Vendor error code, e.g. `ParameterInvalid`
        #[serde(rename = "errorCode", default)]
        pub error_code: String,
        /// Human readable error message
        #[serde(rename = "errorMessage", default)]
        pub error_message: String,
        /// Correlation id from the `X-Log-Requestid` response header
        #[serde(skip)]
        pub request_id: String,
    }

    impl fmt::Display for DeliveryError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match serde_json::to_string(self) {
                Ok(json) => f.write_str(&json),
                Err(e) => write!(f, "{}", e),
            }
        }
    }

    impl std::error::Error for DeliveryError {}

    /// logship error types
    #[derive(Debug)]
    pub enum ShipError {
        /// Submission attempted after shutdown began
        Closed,
        /// Non-blocking submission found the queue full
        QueueFull,
        /// Record bytes were not valid JSON
        Parse(serde_json::Error),
        /// Record was valid JSON but not a usable log record
        InvalidRecord(String),
        /// Batch serialization failed
        Encode(String),
        /// Block compression failed
        Compress(String),
        /// Request signing failed
        Signing(String),
        /// Network level failure
        Transport(reqwest::Error),
        /// The request did not complete within the configured timeout
        Timeout(Duration),
        /// The endpoint rejected the batch
        Delivery(DeliveryError),
        /// The endpoint's error body could not be decoded
        ResponseBody(serde_json::Error),
        /// Configuration error
        Config(String),
        /// I/O operation failed
        Io(std::io::Error),
    }

    impl ShipError {
        /// Whether this is the admission error returned after shutdown began
        pub fn is_closed(&self) -> bool {
            matches!(self, ShipError::Closed)
        }
    }

    impl fmt::Display for ShipError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                ShipError::Closed => write!(f, "write to closed writer"),
                ShipError::QueueFull => write!(f, "queue is full"),
                ShipError::Parse(e) => write!(f, "Parse error: {}", e),
                ShipError::InvalidRecord(e) => write!(f, "Invalid record: {}", e),
                ShipError::Encode(e) => write!(f, "Encoding error: {}", e),
                ShipError::Compress(e) => write!(f, "Compression error: {}", e),
                ShipError::Signing(e) => write!(f, "Signing error: {}", e),
                ShipError::Transport(e) => write!(f, "Transport error: {}", e),
                ShipError::Timeout(d) => write!(f, "Request timed out after {:?}", d),
                ShipError::Delivery(e) => write!(f, "Delivery error ({}): {}", e.http_status, e),
                ShipError::ResponseBody(e) => write!(f, "Undecodable error response: {}", e),
                ShipError::Config(e) => write!(f, "Configuration error: {}", e),
                ShipError::Io(e) => write!(f, "I/O error: {}", e),
            }
        }
    }

    impl std::error::Error for ShipError {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            match self {
                ShipError::Parse(e) | ShipError::ResponseBody(e) => Some(e),
                ShipError::Transport(e) => Some(e),
                ShipError::Delivery(e) => Some(e),
                ShipError::Io(e) => Some(e),
                _ => None,
            }
        }
    }

    impl From<std::io::Error> for ShipError {
        fn from(err: std::io::Error) -> Self {
            ShipError::Io(err)
        }
    }

    impl From<serde_json::Error> for ShipError {
        fn from(err: serde_json::Error) -> Self {
            ShipError::Parse(err)
        }
    }

    impl From<reqwest::Error> for ShipError {
        fn from(err: reqwest::Error) -> Self {
            ShipError::Transport(err)
        }
    }

    impl From<DeliveryError> for ShipError {
        fn from(err: DeliveryError) -> Self {
            ShipError::Delivery(err)
        }
    }

    /// Result type alias for logship operations
    pub type Result<T> = std::result::Result<T, ShipError>;
}

pub use error::{DeliveryError, Result, ShipError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::ShipperConfig;
    pub use crate::sink::{Filter, FilterChain, Modifier, ModifierChain, Sink, SinkLayer};
    pub use crate::transport::{Transport, TransportClient};
    pub use crate::types::{LogFields, Message, Secret};
    pub use crate::worker::{BatchingWorker, ErrorListener, WorkerOptions};
    pub use crate::{DeliveryError, Result, ShipError};
}
