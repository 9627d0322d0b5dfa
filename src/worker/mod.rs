//! Asynchronous batching between record admission and delivery

pub mod batching;

pub use batching::{
    BatchingWorker, ErrorListener, WorkerOptions, DEFAULT_BATCH_SIZE, DEFAULT_FLUSH_INTERVAL,
};
