//! Bounded admission queue with a single background flush loop

use crate::transport::Transport;
use crate::types::Message;
use crate::{Result, ShipError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn, Instrument, Span};

/// Callback receiving every flush-path failure (encode, transport, delivery)
pub type ErrorListener = Arc<dyn Fn(&ShipError) + Send + Sync>;

/// Default batch-size threshold
pub const DEFAULT_BATCH_SIZE: usize = 100;
/// Default periodic flush interval
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(3);

/// Worker tuning and injected collaborators
#[derive(Clone)]
pub struct WorkerOptions {
    /// Records per batch; the queue holds twice as many
    pub batch_size: usize,
    /// Periodic flush interval
    pub flush_interval: Duration,
    /// Emit per-record debug events
    pub verbose: bool,
    /// Receives flush-path errors; errors are dropped when absent
    pub on_error: Option<ErrorListener>,
    /// Span all worker events are recorded under
    pub span: Span,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            verbose: false,
            on_error: None,
            span: tracing::info_span!("logship.worker"),
        }
    }
}

/// Lifecycle of a worker. Transitions only move forward.
enum Lifecycle {
    /// Constructed; the queue accepts records but nothing flushes yet
    Created(mpsc::Receiver<Message>),
    /// The flush loop owns the queue and hands it back when it exits
    Running(JoinHandle<mpsc::Receiver<Message>>),
    /// One `stop` call is draining; others wait for it
    Stopping,
    /// Fully drained
    Stopped,
}

/// Moves batches from the queue to the transport. Shared by the background
/// loop and the final drain in `stop`.
#[derive(Clone)]
struct Flusher {
    transport: Arc<dyn Transport>,
    on_error: Option<ErrorListener>,
    batch_size: usize,
    verbose: bool,
    span: Span,
}

impl Flusher {
    /// Send batches until fewer than `at_least` records remain queued
    async fn flush(&self, queue: &mut mpsc::Receiver<Message>, at_least: usize) -> usize {
        let mut flushed = 0;
        loop {
            let batch = self.take_at_least(queue, at_least);
            if batch.is_empty() {
                return flushed;
            }
            flushed += batch.len();

            if let Err(err) = self.transport.send(&batch).await {
                warn!(parent: &self.span, error = %err, records = batch.len(), "Dropping batch after failed delivery");
                if let Some(on_error) = &self.on_error {
                    on_error(&err);
                }
            }

            if self.verbose {
                debug!(parent: &self.span, "Flush {} messages", batch.len());
                for (i, msg) in batch.iter().enumerate() {
                    trace!(parent: &self.span, "Flush[{}]: {}", i, msg.to_human_readable());
                }
            }
        }
    }

    /// Take up to `batch_size` records, but only if at least `at_least` are
    /// queued. Never waits for more arrivals.
    fn take_at_least(&self, queue: &mut mpsc::Receiver<Message>, at_least: usize) -> Vec<Message> {
        let available = queue.len();
        if available == 0 || available < at_least {
            return Vec::new();
        }

        let want = available.min(self.batch_size);
        let mut batch = Vec::with_capacity(want);
        while batch.len() < want {
            match queue.try_recv() {
                Ok(msg) => batch.push(msg),
                Err(_) => break,
            }
        }

        if self.verbose {
            debug!(parent: &self.span, "Pull {} messages", batch.len());
        }
        batch
    }
}

/// Buffers records and delivers them in batches from one background task.
///
/// Flushes are triggered by the queue reaching `batch_size`, by the periodic
/// interval (any non-empty queue), and by [`stop`](Self::stop), which drains
/// everything accepted before it returns.
pub struct BatchingWorker {
    queue: mpsc::Sender<Message>,
    flusher: Flusher,
    flush_interval: Duration,
    flush_requested: Arc<Notify>,
    shutdown: CancellationToken,
    lifecycle: Arc<Mutex<Lifecycle>>,
    stopped: Arc<watch::Sender<bool>>,
}

impl BatchingWorker {
    /// Create a worker delivering through `transport`. Call [`start`](Self::start) to begin flushing.
    pub fn new(transport: Arc<dyn Transport>, options: WorkerOptions) -> Self {
        let batch_size = options.batch_size.max(1);
        let (queue, receiver) = mpsc::channel(2 * batch_size);
        let (stopped, _) = watch::channel(false);

        Self {
            queue,
            flusher: Flusher {
                transport,
                on_error: options.on_error,
                batch_size,
                verbose: options.verbose,
                span: options.span,
            },
            flush_interval: if options.flush_interval.is_zero() {
                DEFAULT_FLUSH_INTERVAL
            } else {
                options.flush_interval
            },
            flush_requested: Arc::new(Notify::new()),
            shutdown: CancellationToken::new(),
            lifecycle: Arc::new(Mutex::new(Lifecycle::Created(receiver))),
            stopped: Arc::new(stopped),
        }
    }

    /// Spawn the flush loop. Calling it again, or after `stop`, has no effect.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut state = self.lifecycle.lock();
        let queue = match std::mem::replace(&mut *state, Lifecycle::Stopped) {
            Lifecycle::Created(queue) => queue,
            other => {
                *state = other;
                return;
            }
        };

        let flush_loop = run(
            queue,
            self.flusher.clone(),
            Arc::clone(&self.flush_requested),
            self.shutdown.clone(),
            self.flush_interval,
        );
        *state = Lifecycle::Running(tokio::spawn(flush_loop.instrument(self.flusher.span.clone())));

        info!(
            parent: &self.flusher.span,
            batch_size = self.flusher.batch_size,
            interval_ms = self.flush_interval.as_millis() as u64,
            "Batching worker started"
        );
    }

    /// Queue one record, waiting while the queue is full.
    ///
    /// Returns [`ShipError::Closed`] once shutdown has begun.
    pub async fn submit(&self, msg: Message) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(ShipError::Closed);
        }
        let description = self.describe(&msg);
        self.queue.send(msg).await.map_err(|_| ShipError::Closed)?;
        self.after_submit(description);
        Ok(())
    }

    /// Queue one record without waiting.
    ///
    /// Returns [`ShipError::QueueFull`] when the queue has no room and
    /// [`ShipError::Closed`] once shutdown has begun.
    pub fn try_submit(&self, msg: Message) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(ShipError::Closed);
        }
        let description = self.describe(&msg);
        self.queue.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ShipError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => ShipError::Closed,
        })?;
        self.after_submit(description);
        Ok(())
    }

    /// Blocking variant of [`submit`](Self::submit) for callers outside the runtime.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context.
    pub fn blocking_submit(&self, msg: Message) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(ShipError::Closed);
        }
        let description = self.describe(&msg);
        self.queue.blocking_send(msg).map_err(|_| ShipError::Closed)?;
        self.after_submit(description);
        Ok(())
    }

    /// Stop flushing, wait for the loop to exit, then deliver everything still queued.
    ///
    /// Safe to call repeatedly and concurrently; every call returns only after
    /// the drain has finished. The drain runs on its own task, so abandoning a
    /// call does not lose queued records.
    pub async fn stop(&self) {
        let mut stopped = self.stopped.subscribe();
        self.begin_stop();
        let _ = stopped.wait_for(|done| *done).await;
    }

    fn begin_stop(&self) {
        let previous = {
            let mut state = self.lifecycle.lock();
            if matches!(*state, Lifecycle::Stopping | Lifecycle::Stopped) {
                return;
            }
            std::mem::replace(&mut *state, Lifecycle::Stopping)
        };

        self.shutdown.cancel();

        let drain = teardown(
            previous,
            self.flusher.clone(),
            Arc::clone(&self.lifecycle),
            Arc::clone(&self.stopped),
        );
        tokio::spawn(drain.instrument(self.flusher.span.clone()));
    }

    /// Whether the flush loop is running
    pub fn is_running(&self) -> bool {
        matches!(*self.lifecycle.lock(), Lifecycle::Running(_))
    }

    /// Whether shutdown has begun
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Number of records currently queued
    pub fn queued(&self) -> usize {
        self.queue.max_capacity() - self.queue.capacity()
    }

    /// Queue capacity (twice the batch size)
    pub fn capacity(&self) -> usize {
        self.queue.max_capacity()
    }

    fn describe(&self, msg: &Message) -> Option<String> {
        self.flusher.verbose.then(|| msg.to_human_readable())
    }

    fn after_submit(&self, description: Option<String>) {
        if let Some(description) = description {
            debug!(parent: &self.flusher.span, "Submit: {}", description);
        }
        if self.queued() >= self.flusher.batch_size {
            self.flush_requested.notify_one();
        }
    }
}

impl Drop for BatchingWorker {
    fn drop(&mut self) {
        if !self.shutdown.is_cancelled() {
            if matches!(*self.lifecycle.lock(), Lifecycle::Running(_)) {
                warn!(parent: &self.flusher.span, queued = self.queued(), "Batching worker dropped without stop; queued records are discarded");
            }
            self.shutdown.cancel();
        }
    }
}

/// Recover the queue from the flush loop, close it, and deliver what remains
async fn teardown(
    previous: Lifecycle,
    flusher: Flusher,
    lifecycle: Arc<Mutex<Lifecycle>>,
    stopped: Arc<watch::Sender<bool>>,
) {
    let queue = match previous {
        Lifecycle::Created(queue) => Some(queue),
        Lifecycle::Running(task) => match task.await {
            Ok(queue) => Some(queue),
            Err(e) => {
                error!(parent: &flusher.span, "Flush loop failed: {}", e);
                None
            }
        },
        Lifecycle::Stopping | Lifecycle::Stopped => None,
    };

    if let Some(mut queue) = queue {
        queue.close();
        info!(parent: &flusher.span, "Remain: {}", queue.len());
        let drained = flusher.flush(&mut queue, 1).await;
        debug!(parent: &flusher.span, drained, "Final drain complete");
    }

    *lifecycle.lock() = Lifecycle::Stopped;
    stopped.send_replace(true);
    info!(parent: &flusher.span, "Batching worker stopped");
}

async fn run(
    mut queue: mpsc::Receiver<Message>,
    flusher: Flusher,
    flush_requested: Arc<Notify>,
    shutdown: CancellationToken,
    period: Duration,
) -> mpsc::Receiver<Message> {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = flush_requested.notified() => {
                flusher.flush(&mut queue, flusher.batch_size).await;
            }
            _ = ticker.tick() => {
                flusher.flush(&mut queue, 1).await;
            }
        }
    }

    queue
}
