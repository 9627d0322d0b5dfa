//! Core data types shared by the sink, worker, and transport

pub mod message;
pub mod secret;

pub use message::{LogFields, Message, DEFAULT_TIME_KEY};
pub use secret::Secret;
