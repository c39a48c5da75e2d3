//! Push-stream connection shared by all streaming adapters.
//!
//! A connection owns one WebSocket. Incoming text frames are handed, in
//! arrival order, to a single [`StreamHandler`] running on a dedicated reader
//! task, so per-symbol ordering is whatever order the venue delivered.

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::error::{ExchangeError, ExchangeResult};
use crate::exchange::Venue;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Receives decoded frames for one adapter.
pub trait StreamHandler: Send + 'static {
    /// Apply one text frame. Errors for which
    /// [`ExchangeError::is_fatal_to_stream`] holds terminate the connection;
    /// anything else is logged and skipped.
    fn on_text(&mut self, text: &str) -> ExchangeResult<()>;

    /// Called once when the reader stops, for whatever reason.
    fn on_closed(&mut self, reason: &str);
}

/// Application-level ping some venues require to keep the socket alive.
#[derive(Debug, Clone)]
pub struct Keepalive {
    pub every: Duration,
    pub payload: String,
}

impl Keepalive {
    pub fn new(every: Duration, payload: impl Into<String>) -> Self {
        Self {
            every,
            payload: payload.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ReaderPhase {
    /// Handshake done, nothing received yet
    Open,
    Receiving,
    Closed(String),
}

/// Resolves once a connection has delivered its first text frame.
pub struct FirstFrame {
    venue: Venue,
    phase: watch::Receiver<ReaderPhase>,
}

impl FirstFrame {
    /// Wait for the first frame (an ack or data) for at most `within`.
    /// Fails if the reader stops first, including on a fatal first frame.
    pub async fn wait(mut self, within: Duration) -> ExchangeResult<()> {
        let venue = self.venue;
        let outcome = tokio::time::timeout(within, async {
            match self.phase.wait_for(|phase| *phase != ReaderPhase::Open).await {
                Ok(phase) => match &*phase {
                    ReaderPhase::Closed(reason) => Err(reason.clone()),
                    _ => Ok(()),
                },
                Err(_) => Err("reader stopped".to_string()),
            }
        })
        .await;

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(ExchangeError::stream(
                venue,
                format!("closed during startup: {}", reason),
            )),
            Err(_) => Err(ExchangeError::stream(
                venue,
                format!("no frame within {}s of subscribing", within.as_secs_f64()),
            )),
        }
    }
}

/// An open push-stream connection.
pub struct StreamConnection {
    venue: Venue,
    sink: Arc<Mutex<WsSink>>,
    reader: JoinHandle<()>,
    keepalive: Option<JoinHandle<()>>,
    phase: watch::Receiver<ReaderPhase>,
}

impl StreamConnection {
    /// Connect to `url` and start feeding frames to `handler`.
    ///
    /// Resolves once the WebSocket handshake has completed.
    pub async fn open<H: StreamHandler>(
        venue: Venue,
        url: &str,
        keepalive: Option<Keepalive>,
        mut handler: H,
    ) -> ExchangeResult<Self> {
        info!(%venue, %url, "Connecting to WebSocket");

        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| ExchangeError::stream(venue, format!("connect {}: {}", url, e)))?;

        let (write, mut read) = ws_stream.split();
        let sink = Arc::new(Mutex::new(write));

        let (phase_tx, phase) = watch::channel(ReaderPhase::Open);
        let reader_sink = sink.clone();
        let reader = tokio::spawn(async move {
            let reason = loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = handler.on_text(text.as_str()) {
                            if e.is_fatal_to_stream() {
                                error!(%venue, error = %e, "Protocol violation, closing stream");
                                let _ = reader_sink.lock().await.send(Message::Close(None)).await;
                                break e.to_string();
                            }
                            warn!(%venue, error = %e, "Dropped stream message");
                        }
                        phase_tx.send_if_modified(|phase| {
                            let first = *phase == ReaderPhase::Open;
                            if first {
                                *phase = ReaderPhase::Receiving;
                            }
                            first
                        });
                    }
                    Some(Ok(Message::Ping(_))) => {
                        // Pong is handled automatically by tungstenite
                        debug!(%venue, "Received ping");
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break match frame {
                            Some(f) => format!("closed by server: {} {}", f.code, f.reason),
                            None => "closed by server".to_string(),
                        };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break format!("read error: {}", e),
                    None => break "stream ended".to_string(),
                }
            };
            warn!(%venue, %reason, "WebSocket reader stopped");
            handler.on_closed(&reason);
            phase_tx.send_replace(ReaderPhase::Closed(reason));
        });

        let keepalive = keepalive.map(|k| spawn_keepalive(venue, sink.clone(), k));

        Ok(Self {
            venue,
            sink,
            reader,
            keepalive,
            phase,
        })
    }

    pub fn first_frame(&self) -> FirstFrame {
        FirstFrame {
            venue: self.venue,
            phase: self.phase.clone(),
        }
    }

    /// Send one JSON frame.
    pub async fn send_json<T: Serialize + ?Sized>(&self, message: &T) -> ExchangeResult<()> {
        let payload = serde_json::to_string(message)
            .map_err(|e| ExchangeError::stream(self.venue, format!("encode: {}", e)))?;
        debug!(venue = %self.venue, %payload, "Sending stream frame");
        self.sink
            .lock()
            .await
            .send(Message::Text(payload.into()))
            .await
            .map_err(|e| ExchangeError::stream(self.venue, format!("send: {}", e)))
    }

    /// Send a close frame and stop the reader and keepalive tasks. Once this
    /// returns the handler sees no further frames or `on_closed` calls.
    pub async fn close(self) {
        if let Some(k) = &self.keepalive {
            k.abort();
        }
        if let Err(e) = self.sink.lock().await.send(Message::Close(None)).await {
            debug!(venue = %self.venue, error = %e, "Close frame not sent");
        }
        self.reader.abort();
        let _ = self.reader.await;
        info!(venue = %self.venue, "WebSocket closed");
    }
}

fn spawn_keepalive(venue: Venue, sink: Arc<Mutex<WsSink>>, keepalive: Keepalive) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(keepalive.every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let sent = sink
                .lock()
                .await
                .send(Message::Text(keepalive.payload.clone().into()))
                .await;
            if let Err(e) = sent {
                debug!(%venue, error = %e, "Keepalive failed, stopping");
                return;
            }
        }
    })
}

/// Send `args` as `{"op": "subscribe", "args": [...]}` frames of at most `batch` entries.
pub async fn subscribe_in_batches<T: Serialize>(
    conn: &StreamConnection,
    args: &[T],
    batch: usize,
) -> ExchangeResult<usize> {
    let mut frames = 0;
    for chunk in args.chunks(batch.max(1)) {
        conn.send_json(&serde_json::json!({
            "op": "subscribe",
            "args": chunk,
        }))
        .await?;
        frames += 1;
    }
    Ok(frames)
}

#[cfg(test)]
pub(crate) mod test_server {
    //! Minimal local WebSocket server for adapter tests.

    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::Message;

    pub struct TestServer {
        pub url: String,
        /// Text frames received from the client.
        pub received: mpsc::UnboundedReceiver<String>,
        /// Frames to push to the client.
        pub push: mpsc::UnboundedSender<String>,
    }

    /// Accept one client, forward its frames to `received`, and push whatever
    /// arrives on `push`. Dropping `push` closes the connection.
    pub async fn spawn() -> TestServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (received_tx, received) = mpsc::unbounded_channel();
        let (push, mut push_rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let (mut write, mut read) = ws.split();
            loop {
                tokio::select! {
                    incoming = read.next() => match incoming {
                        Some(Ok(Message::Text(text))) => {
                            let _ = received_tx.send(text.as_str().to_string());
                        }
                        Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                        _ => {}
                    },
                    outgoing = push_rx.recv() => match outgoing {
                        Some(text) => {
                            if write.send(Message::Text(text.into())).await.is_err() {
                                return;
                            }
                        }
                        None => {
                            let _ = write.send(Message::Close(None)).await;
                            return;
                        }
                    },
                }
            }
        });

        TestServer {
            url: format!("ws://{}", addr),
            received,
            push,
        }
    }
}
