//! Configuration management for logship

pub mod settings;

pub use settings::{
    ShipperConfig, DEFAULT_BATCH_SIZE, DEFAULT_FLUSH_INTERVAL_MS, DEFAULT_TIMEOUT_MS, ENV_PREFIX,
};
