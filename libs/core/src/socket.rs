use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::error::ChatError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Bot reply frame: `{"response": "<reply>"}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEnvelope {
    pub response: String,
}

impl InboundEnvelope {
    /// Returns `None` for anything that is not an object with a string `response`.
    pub fn parse(frame: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(frame).ok()?;
        let response = value.as_object()?.get("response")?.as_str()?;
        Some(Self {
            response: response.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Reply(String),
    Closed,
    Error(String),
}

/// One persistent WebSocket connection to a chat endpoint.
///
/// Inbound frames are decoded by a reader task and queued for a single
/// consumer; frames without a `response` field never reach the queue.
pub struct SocketSession {
    correlation_id: Uuid,
    write: Mutex<SplitSink<WsStream, Message>>,
    events: Mutex<mpsc::UnboundedReceiver<SocketEvent>>,
    closed: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl SocketSession {
    pub async fn connect(url: &Url, correlation_id: Uuid) -> Result<Self, ChatError> {
        let (stream, response) = connect_async(url.as_str()).await.map_err(|err| {
            warn!(%correlation_id, error = %err, "chat socket connect failed");
            ChatError::Socket(err.to_string())
        })?;
        info!(
            %correlation_id,
            status = response.status().as_u16(),
            "chat socket connected"
        );

        let (write, read) = stream.split();
        let (tx, rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let reader = tokio::spawn(read_loop(read, tx, Arc::clone(&closed), correlation_id));

        Ok(Self {
            correlation_id,
            write: Mutex::new(write),
            events: Mutex::new(rx),
            closed,
            reader,
        })
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn send(&self, text: &str) -> Result<(), ChatError> {
        let mut write = self.write.lock().await;
        write.send(Message::Text(text.into())).await.map_err(|err| {
            self.closed.store(true, Ordering::SeqCst);
            ChatError::Socket(err.to_string())
        })
    }

    /// Waits for the next decoded event. `None` once the reader has stopped
    /// and every queued event was consumed.
    pub async fn next_event(&self) -> Option<SocketEvent> {
        self.events.lock().await.recv().await
    }

    /// Drops events queued before the caller's next send, e.g. a reply that
    /// arrived after an earlier call timed out.
    pub async fn discard_pending(&self) -> usize {
        let mut events = self.events.lock().await;
        let mut dropped = 0;
        while events.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }

    pub async fn disconnect(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            self.reader.abort();
            return;
        }
        let mut write = self.write.lock().await;
        if let Err(err) = write.close().await {
            debug!(correlation_id = %self.correlation_id, error = %err, "chat socket close failed");
        }
        self.reader.abort();
        info!(correlation_id = %self.correlation_id, "chat socket disconnected");
    }
}

impl Drop for SocketSession {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(
    mut read: SplitStream<WsStream>,
    tx: mpsc::UnboundedSender<SocketEvent>,
    closed: Arc<AtomicBool>,
    correlation_id: Uuid,
) {
    while let Some(frame) = read.next().await {
        match frame {
            Ok(Message::Text(text)) => match InboundEnvelope::parse(text.as_str()) {
                Some(envelope) => {
                    if tx.send(SocketEvent::Reply(envelope.response)).is_err() {
                        return;
                    }
                }
                None => {
                    debug!(%correlation_id, len = text.len(), "ignoring frame without response field");
                }
            },
            Ok(Message::Close(frame)) => {
                debug!(
                    %correlation_id,
                    code = ?frame.as_ref().map(|f| f.code),
                    "chat socket closed by server"
                );
                break;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(%correlation_id, error = %err, "chat socket read error");
                closed.store(true, Ordering::SeqCst);
                let _ = tx.send(SocketEvent::Error(err.to_string()));
                return;
            }
        }
    }
    closed.store(true, Ordering::SeqCst);
    let _ = tx.send(SocketEvent::Closed);
}
