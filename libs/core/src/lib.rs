//! Transport core for the Greentic chat bubble.
//!
//! A [`ChatDispatcher`] turns one user message into one displayable bot reply,
//! using either a chat-completions HTTP endpoint or a WebSocket endpoint
//! depending on the configured URL scheme.
#![forbid(unsafe_code)]

pub mod completions;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod service;
pub mod socket;
pub mod telemetry;

pub use completions::{CompletionApi, MockCompletionApi, ReqwestCompletionApi};
pub use config::{ChatEndpointConfig, DEFAULT_REPLY_TIMEOUT, TransportKind};
pub use dispatcher::ChatDispatcher;
pub use error::ChatError;
pub use service::{ChatService, MockChatService, SharedChatService};
pub use socket::{InboundEnvelope, SocketEvent, SocketSession};

/// Returns the semantic version advertised by this crate.
///
/// ```
/// assert_eq!(gsm_chat_core::version(), env!("CARGO_PKG_VERSION"));
/// ```
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
