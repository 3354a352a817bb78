use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use metrics::{counter, histogram};
use tokio::sync::Mutex;
use tracing::{Instrument, debug, info, warn};
use uuid::Uuid;

use crate::completions::{CompletionApi, ReqwestCompletionApi};
use crate::config::{ChatEndpointConfig, TransportKind};
use crate::error::ChatError;
use crate::service::ChatService;
use crate::socket::{SocketEvent, SocketSession};
use crate::telemetry::span_for;

/// Sends one chat message over the transport named by the endpoint scheme.
///
/// WebSocket endpoints share one lazily opened connection per dispatcher.
/// Round trips on that connection are serialised: replies carry no
/// correlation id, so only one call may wait on the socket at a time.
pub struct ChatDispatcher {
    config: ChatEndpointConfig,
    completions: Arc<dyn CompletionApi>,
    socket: Mutex<Option<Arc<SocketSession>>>,
    turn: Mutex<()>,
}

impl ChatDispatcher {
    pub fn new(config: ChatEndpointConfig) -> Result<Self, ChatError> {
        let completions = Arc::new(ReqwestCompletionApi::from_config(&config)?);
        Ok(Self::with_completion_api(config, completions))
    }

    pub fn with_completion_api(
        config: ChatEndpointConfig,
        completions: Arc<dyn CompletionApi>,
    ) -> Self {
        Self {
            config,
            completions,
            socket: Mutex::new(None),
            turn: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &ChatEndpointConfig {
        &self.config
    }

    /// Always resolves with text that can be shown as the bot reply.
    pub async fn send_message(&self, text: &str) -> String {
        match self.try_send_message(text).await {
            Ok(reply) => reply,
            Err(err) => err.fallback_text(),
        }
    }

    pub async fn try_send_message(&self, text: &str) -> Result<String, ChatError> {
        let transport = match self.config.transport_kind() {
            Ok(transport) => transport,
            Err(err) => {
                warn!(endpoint = self.config.endpoint(), error = %err, "chat endpoint rejected");
                counter!("chat_errors_total", "kind" => err.kind(), "transport" => "unknown")
                    .increment(1);
                return Err(err);
            }
        };
        counter!("chat_requests_total", "transport" => transport.as_str()).increment(1);

        let result = async {
            match transport {
                TransportKind::Http => self.send_http(text).await,
                TransportKind::WebSocket => self.send_socket(text).await,
            }
        }
        .instrument(span_for("send_message", transport))
        .await;

        if let Err(err) = &result {
            counter!(
                "chat_errors_total",
                "kind" => err.kind(),
                "transport" => transport.as_str()
            )
            .increment(1);
        }
        result
    }

    /// Correlation id of the cached socket, if one is open.
    pub async fn socket_correlation_id(&self) -> Option<Uuid> {
        self.socket
            .lock()
            .await
            .as_ref()
            .filter(|session| !session.is_closed())
            .map(|session| session.correlation_id())
    }

    /// Closes the cached socket; the next WebSocket call opens a new one.
    pub async fn disconnect(&self) {
        let session = self.socket.lock().await.take();
        if let Some(session) = session {
            session.disconnect().await;
        }
    }

    async fn send_http(&self, text: &str) -> Result<String, ChatError> {
        let Some(api_key) = self.config.api_key() else {
            info!("no chat api key configured; skipping request");
            return Err(ChatError::MissingApiKey);
        };
        self.completions.complete(api_key, text).await
    }

    /// The reply timeout runs from call entry and covers waiting for the
    /// turn, opening the socket and the reply itself.
    async fn send_socket(&self, text: &str) -> Result<String, ChatError> {
        let timeout = self.config.reply_timeout();
        let started = Instant::now();
        let result = match tokio::time::timeout(timeout, self.socket_round_trip(text)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs_f64(), "chat socket reply timed out");
                Err(ChatError::Timeout(timeout))
            }
        };

        histogram!(
            "chat_roundtrip_seconds",
            "transport" => "websocket",
            "status" => if result.is_ok() { "ok" } else { "error" }
        )
        .record(started.elapsed().as_secs_f64());
        result
    }

    async fn socket_round_trip(&self, text: &str) -> Result<String, ChatError> {
        let _turn = self.turn.lock().await;
        let session = self.ensure_socket().await?;

        let stale = session.discard_pending().await;
        if stale > 0 {
            debug!(stale, "discarded socket events from an earlier call");
        }

        if let Err(err) = session.send(text).await {
            warn!(error = %err, "chat socket send failed");
            self.forget_socket(&session).await;
            return Err(err);
        }

        let result = first_reply(&session).await;
        if session.is_closed() {
            self.forget_socket(&session).await;
        }
        result
    }

    async fn ensure_socket(&self) -> Result<Arc<SocketSession>, ChatError> {
        let mut slot = self.socket.lock().await;
        if let Some(session) = slot.as_ref() {
            if !session.is_closed() {
                return Ok(Arc::clone(session));
            }
        }

        let correlation_id = Uuid::new_v4();
        let url = self.config.socket_url(&correlation_id.to_string())?;
        info!(
            endpoint = self.config.endpoint(),
            %correlation_id,
            "opening chat socket"
        );
        let session = Arc::new(SocketSession::connect(&url, correlation_id).await?);
        counter!("chat_socket_connects_total").increment(1);
        *slot = Some(Arc::clone(&session));
        Ok(session)
    }

    async fn forget_socket(&self, session: &Arc<SocketSession>) {
        let mut slot = self.socket.lock().await;
        if slot
            .as_ref()
            .is_some_and(|cached| Arc::ptr_eq(cached, session))
        {
            slot.take();
            debug!(correlation_id = %session.correlation_id(), "dropped closed chat socket");
        }
    }
}

async fn first_reply(session: &SocketSession) -> Result<String, ChatError> {
    match session.next_event().await {
        Some(SocketEvent::Reply(reply)) => Ok(reply),
        Some(SocketEvent::Error(detail)) => Err(ChatError::Socket(detail)),
        Some(SocketEvent::Closed) | None => Err(ChatError::Closed),
    }
}

#[async_trait]
impl ChatService for ChatDispatcher {
    async fn send_message(&self, text: &str) -> String {
        ChatDispatcher::send_message(self, text).await
    }
}
