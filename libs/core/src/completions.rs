use std::time::Instant;

use async_trait::async_trait;
use http::StatusCode;
use metrics::histogram;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ChatEndpointConfig;
use crate::error::ChatError;

const REFERER_HEADER: &str = "HTTP-Referer";
const TITLE_HEADER: &str = "X-Title";
const MAX_ERROR_BODY_CHARS: usize = 512;

/// One request/response exchange with a chat-completions endpoint.
#[async_trait]
pub trait CompletionApi: Send + Sync {
    async fn complete(&self, api_key: &str, text: &str) -> Result<String, ChatError>;
}

pub struct ReqwestCompletionApi {
    client: Client,
    endpoint: Url,
    referer: String,
    title: String,
}

impl ReqwestCompletionApi {
    pub fn new(client: Client, config: &ChatEndpointConfig) -> Result<Self, ChatError> {
        let endpoint =
            Url::parse(config.endpoint()).map_err(|err| ChatError::Config(err.into()))?;
        Ok(Self {
            client,
            endpoint,
            referer: config.referer().to_string(),
            title: config.title().to_string(),
        })
    }

    pub fn from_config(config: &ChatEndpointConfig) -> Result<Self, ChatError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|err| ChatError::Config(err.into()))?;
        Self::new(client, config)
    }
}

#[async_trait]
impl CompletionApi for ReqwestCompletionApi {
    async fn complete(&self, api_key: &str, text: &str) -> Result<String, ChatError> {
        let started = Instant::now();
        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(api_key)
            .header(REFERER_HEADER, &self.referer)
            .header(TITLE_HEADER, &self.title)
            .json(&CompletionRequest::user(text))
            .send()
            .await
            .map_err(|err| {
                warn!(error = %err, "chat completion request failed");
                ChatError::Transport(err)
            })?;

        let status = response.status();
        histogram!(
            "chat_roundtrip_seconds",
            "transport" => "http",
            "status" => status.as_str().to_string()
        )
        .record(started.elapsed().as_secs_f64());

        if status != StatusCode::OK {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable>".into());
            warn!(status = status.as_u16(), "chat completion returned non-200 status");
            return Err(ChatError::Remote {
                status,
                message: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let body = response
            .json::<CompletionResponse>()
            .await
            .map_err(|err| ChatError::Decode(err.into()))?;
        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            choices = body.choices.len(),
            "chat completion received"
        );
        body.into_content().ok_or(ChatError::EmptyReply)
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CompletionRequest<'a> {
    messages: [RequestMessage<'a>; 1],
}

impl<'a> CompletionRequest<'a> {
    pub(crate) fn user(text: &'a str) -> Self {
        Self {
            messages: [RequestMessage {
                role: "user",
                content: text,
            }],
        }
    }
}

#[derive(Debug, Serialize)]
struct RequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

impl CompletionResponse {
    pub(crate) fn into_content(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
    }
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Records the keys and texts it was called with and answers with a canned reply.
pub struct MockCompletionApi {
    pub calls: tokio::sync::Mutex<Vec<(String, String)>>,
    pub reply: Result<String, StatusCode>,
}

impl MockCompletionApi {
    pub fn replying(reply: impl Into<String>) -> Self {
        Self {
            calls: tokio::sync::Mutex::new(Vec::new()),
            reply: Ok(reply.into()),
        }
    }

    pub fn failing(status: StatusCode) -> Self {
        Self {
            calls: tokio::sync::Mutex::new(Vec::new()),
            reply: Err(status),
        }
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }
}

#[async_trait]
impl CompletionApi for MockCompletionApi {
    async fn complete(&self, api_key: &str, text: &str) -> Result<String, ChatError> {
        self.calls
            .lock()
            .await
            .push((api_key.to_string(), text.to_string()));
        match &self.reply {
            Ok(reply) => Ok(reply.clone()),
            Err(status) => Err(ChatError::Remote {
                status: *status,
                message: String::new(),
            }),
        }
    }
}
