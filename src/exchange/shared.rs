//! Plumbing shared by every adapter: the lifecycle-gated state cell, the
//! background task registry and the stream handler that feeds the cell.

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ExchangeError, ExchangeResult};
use crate::exchange::stream::{self, StreamConnection, StreamHandler};
use crate::exchange::{AdapterEvent, AdapterStatus, Venue};

const EVENT_CAPACITY: usize = 1024;

/// Venue state that can be reconciled from push-stream frames.
pub trait StreamState: Send + Sync + 'static {
    /// Apply one text frame, returning the venue symbols it touched.
    /// Frames that carry no market data (acks, pongs) return an empty list.
    fn apply_message(&mut self, text: &str) -> ExchangeResult<Vec<String>>;
}

struct Inner<S> {
    status: AdapterStatus,
    destroyed: bool,
    /// The stream dropped while `init()` was still connecting.
    lost_during_startup: bool,
    state: S,
}

/// One adapter's exclusively owned state plus its lifecycle phase.
///
/// Rows are only readable once `init()` has completed, and every write after
/// `destroy()` is discarded.
pub struct AdapterCell<S> {
    inner: RwLock<Inner<S>>,
}

impl<S: Default> Default for AdapterCell<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Default> AdapterCell<S> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                status: AdapterStatus::Uninitialized,
                destroyed: false,
                lost_during_startup: false,
                state: S::default(),
            }),
        }
    }

    pub fn status(&self) -> AdapterStatus {
        self.inner.read().status
    }

    /// Move `Uninitialized -> Connecting`. Returns false in any other phase.
    pub fn begin_connecting(&self) -> bool {
        let mut inner = self.inner.write();
        if inner.destroyed || inner.status != AdapterStatus::Uninitialized {
            return false;
        }
        inner.status = AdapterStatus::Connecting;
        inner.lost_during_startup = false;
        true
    }

    /// Move `Connecting -> Streaming`. Returns false, leaving the status
    /// untouched, when the stream already dropped during startup.
    pub fn mark_streaming(&self) -> bool {
        let mut inner = self.inner.write();
        if inner.lost_during_startup {
            return false;
        }
        if !inner.destroyed && inner.status == AdapterStatus::Connecting {
            inner.status = AdapterStatus::Streaming;
        }
        true
    }

    /// The push stream dropped. While streaming, rows stay readable but go
    /// stale; while connecting, the pending `init()` is doomed.
    pub fn mark_stream_lost(&self) {
        let mut inner = self.inner.write();
        if inner.destroyed {
            return;
        }
        match inner.status {
            AdapterStatus::Streaming => inner.status = AdapterStatus::Closed,
            AdapterStatus::Connecting => inner.lost_during_startup = true,
            _ => {}
        }
    }

    /// Discard a half-built baseline after a failed `init()`.
    pub fn reset(&self) {
        let mut inner = self.inner.write();
        if !inner.destroyed {
            inner.status = AdapterStatus::Uninitialized;
            inner.lost_during_startup = false;
            inner.state = S::default();
        }
    }

    /// Drop all state and refuse further writes.
    pub fn destroy(&self) {
        let mut inner = self.inner.write();
        inner.destroyed = true;
        inner.status = AdapterStatus::Closed;
        inner.state = S::default();
    }

    /// Mutate state. Returns `None` once destroyed.
    pub fn write<R>(&self, f: impl FnOnce(&mut S) -> R) -> Option<R> {
        let mut inner = self.inner.write();
        if inner.destroyed {
            return None;
        }
        Some(f(&mut inner.state))
    }

    /// Read state regardless of phase.
    pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.inner.read().state)
    }

    /// Read rows, or nothing while `init()` is still in flight.
    pub fn read_rows<T>(&self, f: impl FnOnce(&S) -> Vec<T>) -> Vec<T> {
        let inner = self.inner.read();
        match inner.status {
            AdapterStatus::Streaming | AdapterStatus::Closed if !inner.destroyed => f(&inner.state),
            _ => Vec::new(),
        }
    }
}

/// Background resources of one adapter: stream, timers and event channel.
pub struct Lifecycle {
    venue: Venue,
    stream: tokio::sync::Mutex<Option<StreamConnection>>,
    timers: Mutex<Vec<JoinHandle<()>>>,
    events: broadcast::Sender<AdapterEvent>,
}

impl Lifecycle {
    pub fn new(venue: Venue) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            venue,
            stream: tokio::sync::Mutex::new(None),
            timers: Mutex::new(Vec::new()),
            events,
        }
    }

    pub fn events(&self) -> broadcast::Sender<AdapterEvent> {
        self.events.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AdapterEvent> {
        self.events.subscribe()
    }

    /// Take ownership of `conn` so a later `shutdown()` closes it. Attach
    /// before sending anything, or a failed send leaks the reader.
    pub async fn attach_stream(&self, conn: StreamConnection) {
        if let Some(previous) = self.stream.lock().await.replace(conn) {
            previous.close().await;
        }
    }

    /// Send one JSON frame on the attached stream.
    pub async fn send_json<T: Serialize + ?Sized>(&self, message: &T) -> ExchangeResult<()> {
        match self.stream.lock().await.as_ref() {
            Some(conn) => conn.send_json(message).await,
            None => Err(ExchangeError::stream(self.venue, "no stream attached")),
        }
    }

    /// Send `{"op": "subscribe"}` frames on the attached stream.
    pub async fn subscribe_in_batches<T: Serialize>(
        &self,
        args: &[T],
        batch: usize,
    ) -> ExchangeResult<usize> {
        match self.stream.lock().await.as_ref() {
            Some(conn) => stream::subscribe_in_batches(conn, args, batch).await,
            None => Err(ExchangeError::stream(self.venue, "no stream attached")),
        }
    }

    pub fn add_timer(&self, handle: JoinHandle<()>) {
        self.timers.lock().push(handle);
    }

    /// Abort timers and close the stream.
    pub async fn shutdown(&self) {
        for timer in self.timers.lock().drain(..) {
            timer.abort();
        }
        if let Some(conn) = self.stream.lock().await.take() {
            debug!(venue = %self.venue, "Closing attached stream");
            conn.close().await;
        }
    }
}

/// Publish an event; having no subscribers is fine.
pub fn notify(events: &broadcast::Sender<AdapterEvent>, event: AdapterEvent) {
    let _ = events.send(event);
}

/// Drive `connect` through the `Uninitialized -> Connecting -> Streaming`
/// transitions, rolling back to `Uninitialized` on failure. A stream that
/// closes before `connect` returns fails the whole `init()`.
pub async fn initialize<S, Fut>(
    venue: Venue,
    cell: &AdapterCell<S>,
    lifecycle: &Lifecycle,
    connect: Fut,
) -> ExchangeResult<()>
where
    S: Default,
    Fut: Future<Output = ExchangeResult<()>>,
{
    if !cell.begin_connecting() {
        warn!(%venue, status = ?cell.status(), "init() called twice, ignoring");
        return Ok(());
    }

    let failure = match connect.await {
        Ok(()) if cell.mark_streaming() => {
            info!(%venue, "Adapter initialized");
            return Ok(());
        }
        Ok(()) => ExchangeError::stream(venue, "stream closed during startup"),
        Err(e) => e,
    };

    lifecycle.shutdown().await;
    cell.reset();
    Err(ExchangeError::init(venue, failure))
}

/// Destroy state first so nothing a stopping task writes survives.
pub async fn teardown<S: Default>(venue: Venue, cell: &AdapterCell<S>, lifecycle: &Lifecycle) {
    cell.destroy();
    lifecycle.shutdown().await;
    info!(%venue, "Adapter destroyed");
}

/// Feeds stream frames into an [`AdapterCell`].
pub struct CellHandler<S> {
    venue: Venue,
    cell: Arc<AdapterCell<S>>,
    events: broadcast::Sender<AdapterEvent>,
}

impl<S> CellHandler<S> {
    pub fn new(venue: Venue, cell: Arc<AdapterCell<S>>, events: broadcast::Sender<AdapterEvent>) -> Self {
        Self { venue, cell, events }
    }
}

impl<S: StreamState + Default> StreamHandler for CellHandler<S> {
    fn on_text(&mut self, text: &str) -> ExchangeResult<()> {
        match self.cell.write(|state| state.apply_message(text)) {
            // Destroyed: late frame, nothing to update
            None => Ok(()),
            Some(Ok(symbols)) => {
                for symbol in symbols {
                    notify(
                        &self.events,
                        AdapterEvent::Updated {
                            venue: self.venue,
                            symbol,
                        },
                    );
                }
                Ok(())
            }
            Some(Err(e)) => Err(e),
        }
    }

    fn on_closed(&mut self, reason: &str) {
        self.cell.mark_stream_lost();
        notify(
            &self.events,
            AdapterEvent::StreamClosed {
                venue: self.venue,
                reason: reason.to_string(),
            },
        );
    }
}
