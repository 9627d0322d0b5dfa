//! Byte-stream facade: one JSON record per write

use super::{Filter, Modifier, SinkLayer};
use crate::config::ShipperConfig;
use crate::transport::{Connection, Transport, TransportClient};
use crate::types::Message;
use crate::worker::{BatchingWorker, ErrorListener, WorkerOptions};
use crate::{Result, ShipError};
use std::sync::Arc;
use tracing::Span;

/// Parses written records, filters and rewrites them, and queues them for delivery
#[derive(Clone)]
pub struct Sink {
    worker: Arc<BatchingWorker>,
    filter: Option<Arc<dyn Filter>>,
    modifier: Option<Arc<dyn Modifier>>,
    time_key: String,
}

/// Assembles a [`Sink`] and its collaborators
pub struct SinkBuilder {
    config: ShipperConfig,
    http: Option<reqwest::Client>,
    transport: Option<Arc<dyn Transport>>,
    on_error: Option<ErrorListener>,
    filter: Option<Arc<dyn Filter>>,
    modifier: Option<Arc<dyn Modifier>>,
    span: Option<Span>,
}

impl SinkBuilder {
    /// HTTP transport used for delivery
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http = Some(client);
        self
    }

    /// Replace the signed HTTP transport entirely
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Callback for flush-path errors
    pub fn on_error(mut self, listener: impl Fn(&ShipError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(listener));
        self
    }

    /// Drop records the filter rejects
    pub fn filter(mut self, filter: impl Filter + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Rewrite records before they are queued
    pub fn modifier(mut self, modifier: impl Modifier + 'static) -> Self {
        self.modifier = Some(Arc::new(modifier));
        self
    }

    /// Span the worker records its events under
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Validate the configuration and start the worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Result<Sink> {
        let config = self.config.normalized()?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => {
                let connection = Connection {
                    url: config.put_logs_url()?,
                    access_key: config.access_key.clone(),
                    secret: config.access_secret.clone(),
                    topic: config.topic.clone(),
                    source: config.source.clone(),
                    timeout: config.timeout(),
                };
                let http = self.http.unwrap_or_default();
                Arc::new(TransportClient::with_http_client(http, connection)) as Arc<dyn Transport>
            }
        };

        let span = self.span.unwrap_or_else(|| {
            tracing::info_span!("logship.worker", project = %config.project, store = %config.store)
        });

        let worker = Arc::new(BatchingWorker::new(
            transport,
            WorkerOptions {
                batch_size: config.batch_size,
                flush_interval: config.flush_interval(),
                verbose: config.verbose,
                on_error: self.on_error,
                span,
            },
        ));
        worker.start();

        Ok(Sink {
            worker,
            filter: self.filter,
            modifier: self.modifier,
            time_key: config.time_key,
        })
    }
}

impl Sink {
    /// Start building a sink from configuration
    pub fn builder(config: ShipperConfig) -> SinkBuilder {
        SinkBuilder {
            config,
            http: None,
            transport: None,
            on_error: None,
            filter: None,
            modifier: None,
            span: None,
        }
    }

    /// Build a sink with no filter, modifier, or error listener
    pub fn new(config: ShipperConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    /// Write one JSON record. Returns `data.len()` when the record was queued
    /// or filtered out.
    pub async fn write(&self, data: &[u8]) -> Result<usize> {
        if let Some(msg) = self.prepare(data)? {
            self.worker.submit(msg).await?;
        }
        Ok(data.len())
    }

    /// Blocking variant of [`write`](Self::write) for callers outside the runtime.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context.
    pub fn blocking_write(&self, data: &[u8]) -> Result<usize> {
        if let Some(msg) = self.prepare(data)? {
            self.worker.blocking_submit(msg)?;
        }
        Ok(data.len())
    }

    /// Filter, modify and queue an already structured record without waiting.
    ///
    /// Filtered records return `Ok(())`. A full queue returns
    /// [`ShipError::QueueFull`] and the record is not kept.
    pub fn try_submit(&self, msg: Message) -> Result<()> {
        match self.admit(msg) {
            Some(msg) => self.worker.try_submit(msg),
            None => Ok(()),
        }
    }

    /// Layer that ships `tracing` events through this sink
    pub fn layer(&self) -> SinkLayer {
        SinkLayer::new(self.clone())
    }

    /// Stop the worker and deliver everything queued. Idempotent.
    pub async fn close(&self) {
        self.worker.stop().await;
    }

    /// The underlying worker
    pub fn worker(&self) -> &Arc<BatchingWorker> {
        &self.worker
    }

    fn prepare(&self, data: &[u8]) -> Result<Option<Message>> {
        let msg = Message::from_json_with_time_key(data, &self.time_key)?;
        Ok(self.admit(msg))
    }

    fn admit(&self, msg: Message) -> Option<Message> {
        if let Some(filter) = &self.filter {
            if !filter.filter(&msg) {
                return None;
            }
        }

        Some(match &self.modifier {
            Some(modifier) => modifier.modify(msg),
            None => msg,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{LevelFilter, ModifierChain, RemapLevel, RenameField};
    use crate::types::Secret;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        messages: Mutex<Vec<Message>>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, batch: &[Message]) -> Result<()> {
            self.messages.lock().extend_from_slice(batch);
            Ok(())
        }
    }

    fn test_config() -> ShipperConfig {
        ShipperConfig {
            endpoint: "regionid.example.com".to_string(),
            project: "test-project".to_string(),
            store: "test-store".to_string(),
            topic: "test-topic".to_string(),
            access_key: "123".to_string(),
            access_secret: Secret::from("321"),
            batch_size: 10,
            flush_interval_ms: 60_000,
            ..Default::default()
        }
    }

    fn recording_sink() -> (SinkBuilder, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::default());
        (Sink::builder(test_config()).transport(transport.clone()), transport)
    }

    #[tokio::test]
    async fn test_write_and_close() {
        let (builder, transport) = recording_sink();
        let sink = builder.build().unwrap();
        assert!(sink.worker().is_running());

        let record = b"{}\n";
        assert_eq!(sink.write(record).await.unwrap(), record.len());

        sink.close().await;
        sink.close().await;
        assert!(!sink.worker().is_running());
        assert_eq!(transport.messages.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_filtered_records_are_not_submitted() {
        let (builder, transport) = recording_sink();
        let sink = builder.filter(|_: &Message| false).build().unwrap();

        for _ in 0..10 {
            assert_eq!(sink.write(b"{}").await.unwrap(), 2);
        }
        sink.close().await;
        assert!(transport.messages.lock().is_empty());
    }

    #[tokio::test]
    async fn test_level_filter_and_modifiers() {
        let (builder, transport) = recording_sink();
        let sink = builder
            .filter(LevelFilter::info())
            .modifier(ModifierChain::new().with(RemapLevel::syslog()).with(RenameField::message()))
            .build()
            .unwrap();

        sink.write(br#"{"level":"DEBUG","msg":"hidden"}"#).await.unwrap();
        sink.write(br#"{"level":"WARN","msg":"shown","time":"2020-01-01T00:00:00Z"}"#)
            .await
            .unwrap();
        sink.close().await;

        let messages = transport.messages.lock();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].get("level"), Some("4"));
        assert_eq!(messages[0].get("message"), Some("shown"));
        assert_eq!(messages[0].get("msg"), None);
        assert_eq!(messages[0].timestamp().timestamp(), 1_577_836_800);
    }

    #[tokio::test]
    async fn test_modifier_output_is_submitted() {
        let (builder, transport) = recording_sink();
        let replacement = Message::now(Default::default()).with_field("a", "q");
        let expected = replacement.clone();
        let sink = builder
            .modifier(move |_: Message| replacement.clone())
            .build()
            .unwrap();

        sink.write(b"{}").await.unwrap();
        sink.close().await;
        assert_eq!(transport.messages.lock().as_slice(), &[expected]);
    }

    #[tokio::test]
    async fn test_parse_error_is_returned() {
        let (builder, transport) = recording_sink();
        let sink = builder.build().unwrap();

        assert!(matches!(sink.write(b"{broken").await, Err(ShipError::Parse(_))));
        assert!(matches!(sink.write(b"42").await, Err(ShipError::InvalidRecord(_))));
        sink.close().await;
        assert!(transport.messages.lock().is_empty());
    }

    #[tokio::test]
    async fn test_write_after_close_is_closed() {
        let (builder, _transport) = recording_sink();
        let sink = builder.build().unwrap();
        sink.close().await;

        let err = sink.write(b"{}").await.unwrap_err();
        assert!(err.is_closed());
    }

    #[tokio::test]
    async fn test_custom_time_key() {
        let transport = Arc::new(RecordingTransport::default());
        let sink = Sink::builder(ShipperConfig {
            time_key: "timestamp".to_string(),
            ..test_config()
        })
        .transport(transport.clone())
        .build()
        .unwrap();

        sink.write(br#"{"timestamp":"2020-01-01T00:00:00Z","k":"v"}"#)
            .await
            .unwrap();
        sink.close().await;

        let messages = transport.messages.lock();
        assert_eq!(messages[0].timestamp().timestamp(), 1_577_836_800);
        assert_eq!(messages[0].get("timestamp"), None);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let result = Sink::new(ShipperConfig::default());
        assert!(matches!(result, Err(ShipError::Config(_))));
    }
}
