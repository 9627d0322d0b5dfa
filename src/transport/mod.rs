//! Delivery of batches to the ingestion endpoint
//!
//! A batch goes through `encode -> compress -> build_request (sign) -> fire ->
//! validate_response`. Each stage except `fire` is pure and callable on its own.

pub mod client;
pub mod codec;
pub mod signer;

use crate::types::Message;
use crate::Result;
use async_trait::async_trait;

pub use client::{Connection, SignedRequest, TransportClient};

/// Sends one batch per call. Implementations must not retry internally.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `batch`, preserving its order
    async fn send(&self, batch: &[Message]) -> Result<()>;
}
