use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

/// What the chat window consumes: one message in, one displayable reply out.
#[async_trait]
pub trait ChatService: Send + Sync {
    async fn send_message(&self, text: &str) -> String;
}

pub type SharedChatService = Arc<dyn ChatService>;

/// Scripted replies for exercising chat front ends without a backend.
pub struct MockChatService {
    pub sent: Mutex<Vec<String>>,
    replies: Mutex<VecDeque<String>>,
    fallback: String,
}

impl MockChatService {
    pub fn new(replies: Vec<String>, fallback: impl Into<String>) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            replies: Mutex::new(replies.into()),
            fallback: fallback.into(),
        }
    }

    /// Replies with the message text itself.
    pub fn echo() -> Self {
        Self::new(Vec::new(), String::new())
    }
}

impl Default for MockChatService {
    fn default() -> Self {
        Self::echo()
    }
}

#[async_trait]
impl ChatService for MockChatService {
    async fn send_message(&self, text: &str) -> String {
        self.sent.lock().await.push(text.to_string());
        match self.replies.lock().await.pop_front() {
            Some(reply) => reply,
            None if self.fallback.is_empty() => text.to_string(),
            None => self.fallback.clone(),
        }
    }
}
