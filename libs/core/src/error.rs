use std::time::Duration;

use http::StatusCode;
use thiserror::Error;

pub const MISSING_KEY_TEXT: &str = "Please configure your API key to start chatting.";
pub const EMPTY_REPLY_TEXT: &str = "No response received.";
pub const GENERIC_FAILURE_TEXT: &str = "Sorry, something went wrong. Please try again.";
pub const TIMEOUT_TEXT: &str = "The assistant took too long to respond. Please try again.";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat api key not configured")]
    MissingApiKey,
    #[error("chat configuration error: {0}")]
    Config(anyhow::Error),
    #[error("chat transport error")]
    Transport(#[source] reqwest::Error),
    #[error("chat remote error (status {status})")]
    Remote { status: StatusCode, message: String },
    #[error("chat response decode error")]
    Decode(anyhow::Error),
    #[error("chat response carried no content")]
    EmptyReply,
    #[error("chat socket error: {0}")]
    Socket(String),
    #[error("chat socket closed")]
    Closed,
    #[error("no chat reply within {0:?}")]
    Timeout(Duration),
}

impl ChatError {
    /// Text shown in the chat window in place of a bot reply.
    pub fn fallback_text(&self) -> String {
        match self {
            ChatError::MissingApiKey => MISSING_KEY_TEXT.to_string(),
            ChatError::EmptyReply => EMPTY_REPLY_TEXT.to_string(),
            ChatError::Remote { status, .. } => format!(
                "Error: received status {} from the chat service.",
                status.as_u16()
            ),
            ChatError::Socket(detail) => format!("Connection error: {detail}"),
            ChatError::Closed => "Connection error: the chat connection was closed.".to_string(),
            ChatError::Timeout(_) => TIMEOUT_TEXT.to_string(),
            ChatError::Config(_) | ChatError::Transport(_) | ChatError::Decode(_) => {
                GENERIC_FAILURE_TEXT.to_string()
            }
        }
    }

    /// Label used for the `kind` metric dimension.
    pub fn kind(&self) -> &'static str {
        match self {
            ChatError::MissingApiKey => "missing_key",
            ChatError::Config(_) => "config",
            ChatError::Transport(_) => "transport",
            ChatError::Remote { .. } => "remote",
            ChatError::Decode(_) => "decode",
            ChatError::EmptyReply => "empty_reply",
            ChatError::Socket(_) => "socket",
            ChatError::Closed => "closed",
            ChatError::Timeout(_) => "timeout",
        }
    }
}
