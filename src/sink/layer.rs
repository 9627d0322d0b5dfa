//! `tracing` integration: ship events emitted through a subscriber stack
//!
//! ```no_run
//! # use logship::{config::ShipperConfig, sink::Sink};
//! # use tracing_subscriber::prelude::*;
//! # async fn run(config: ShipperConfig) -> logship::Result<()> {
//! let sink = Sink::new(config)?;
//! tracing_subscriber::registry()
//!     .with(tracing_subscriber::fmt::layer())
//!     .with(sink.layer())
//!     .init();
//!
//! tracing::info!(user_id = 42, "user logged in");
//! sink.close().await;
//! # Ok(())
//! # }
//! ```

use super::Sink;
use crate::types::LogFields;
use crate::types::Message;
use chrono::Utc;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Field holding the event message
pub const MESSAGE_KEY: &str = "msg";
/// Field holding the event target
pub const TARGET_KEY: &str = "target";

/// Targets whose events are never shipped. Delivery itself logs under these,
/// and shipping those events would feed the queue from its own flushes.
const DEFAULT_EXCLUDED_TARGETS: &[&str] = &["logship", "reqwest", "hyper", "h2", "rustls"];

/// Turns each `tracing` event into a record and queues it on a [`Sink`]
/// without waiting. Events that find the queue full are counted and dropped.
#[derive(Clone)]
pub struct SinkLayer {
    sink: Sink,
    excluded_targets: Vec<String>,
    dropped: Arc<AtomicU64>,
}

impl SinkLayer {
    /// Ship events through `sink`
    pub fn new(sink: Sink) -> Self {
        Self {
            sink,
            excluded_targets: DEFAULT_EXCLUDED_TARGETS.iter().map(|t| t.to_string()).collect(),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Also skip events whose target starts with `prefix`
    pub fn exclude_target(mut self, prefix: impl Into<String>) -> Self {
        self.excluded_targets.push(prefix.into());
        self
    }

    /// Events lost to a full or closed queue
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn is_excluded(&self, target: &str) -> bool {
        self.excluded_targets.iter().any(|prefix| {
            target
                .strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
        })
    }
}

impl<S> Layer<S> for SinkLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if self.is_excluded(metadata.target()) {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let mut fields = visitor.fields;
        fields.insert("level".to_string(), metadata.level().to_string());
        fields.insert(TARGET_KEY.to_string(), metadata.target().to_string());

        if self.sink.try_submit(Message::new(Utc::now(), fields)).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Collects event fields as text; the implicit `message` field becomes `msg`
#[derive(Default)]
struct FieldVisitor {
    fields: LogFields,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: String) {
        let key = match field.name() {
            "message" => MESSAGE_KEY,
            name => name,
        };
        self.fields.insert(key.to_string(), value);
    }
}

impl Visit for FieldVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, value.to_string());
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, value.to_string());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, format!("{:?}", value));
    }
}
