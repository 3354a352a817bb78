use std::time::Duration;

use url::Url;

use crate::error::ChatError;

/// Deadline for a WebSocket round trip.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(40);
pub const DEFAULT_REFERER: &str = "https://greentic.ai";
pub const DEFAULT_TITLE: &str = "Greentic Chat";

pub const ENV_ENDPOINT_URL: &str = "CHAT_ENDPOINT_URL";
pub const ENV_API_KEY: &str = "CHAT_API_KEY";
pub const ENV_REPLY_TIMEOUT_SECS: &str = "CHAT_REPLY_TIMEOUT_SECS";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "CHAT_REQUEST_TIMEOUT_SECS";
pub const ENV_HTTP_REFERER: &str = "CHAT_HTTP_REFERER";
pub const ENV_APP_TITLE: &str = "CHAT_APP_TITLE";

/// Transport picked from the endpoint scheme.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransportKind {
    Http,
    WebSocket,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Http => "http",
            TransportKind::WebSocket => "websocket",
        }
    }
}

/// Immutable description of one chat endpoint.
///
/// The scheme is not interpreted here; [`ChatEndpointConfig::transport_kind`]
/// is evaluated every time a message is sent.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChatEndpointConfig {
    endpoint: String,
    api_key: Option<String>,
    reply_timeout: Duration,
    request_timeout: Option<Duration>,
    referer: String,
    title: String,
}

impl ChatEndpointConfig {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, ChatError> {
        let endpoint = endpoint.into().trim().to_string();
        if endpoint.is_empty() {
            return Err(ChatError::Config(anyhow::anyhow!(
                "chat endpoint url must not be empty"
            )));
        }
        Ok(Self {
            endpoint,
            api_key: None,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            request_timeout: None,
            referer: DEFAULT_REFERER.to_string(),
            title: DEFAULT_TITLE.to_string(),
        })
    }

    /// Loads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ChatError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads the configuration through `lookup`; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ChatError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let endpoint = get(ENV_ENDPOINT_URL).ok_or_else(|| {
            ChatError::Config(anyhow::anyhow!("{ENV_ENDPOINT_URL} is not set"))
        })?;
        let mut config = Self::new(endpoint)?.with_api_key(get(ENV_API_KEY));

        if let Some(secs) = get(ENV_REPLY_TIMEOUT_SECS) {
            config = config.with_reply_timeout(parse_secs(ENV_REPLY_TIMEOUT_SECS, &secs)?);
        }
        if let Some(secs) = get(ENV_REQUEST_TIMEOUT_SECS) {
            config =
                config.with_request_timeout(Some(parse_secs(ENV_REQUEST_TIMEOUT_SECS, &secs)?));
        }
        if let Some(referer) = get(ENV_HTTP_REFERER) {
            config = config.with_referer(referer);
        }
        if let Some(title) = get(ENV_APP_TITLE) {
            config = config.with_title(title);
        }
        Ok(config)
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|key| !key.is_empty());
        self
    }

    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = referer.into();
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn reply_timeout(&self) -> Duration {
        self.reply_timeout
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    pub fn referer(&self) -> &str {
        &self.referer
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn transport_kind(&self) -> Result<TransportKind, ChatError> {
        let url = Url::parse(&self.endpoint).map_err(|err| ChatError::Config(err.into()))?;
        match url.scheme() {
            "ws" | "wss" => Ok(TransportKind::WebSocket),
            "http" | "https" => Ok(TransportKind::Http),
            other => Err(ChatError::Config(anyhow::anyhow!(
                "unsupported chat endpoint scheme `{other}`"
            ))),
        }
    }

    /// Builds `<endpoint>/<api_key>/<correlation_id>/`.
    ///
    /// The key segment is left out when no credential is configured.
    pub fn socket_url(&self, correlation_id: &str) -> Result<Url, ChatError> {
        let base = self.endpoint.trim_end_matches('/');
        let raw = match self.api_key() {
            Some(key) => format!("{base}/{key}/{correlation_id}/"),
            None => format!("{base}/{correlation_id}/"),
        };
        Url::parse(&raw).map_err(|err| ChatError::Config(err.into()))
    }
}

fn parse_secs(key: &str, value: &str) -> Result<Duration, ChatError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|err| ChatError::Config(anyhow::anyhow!("{key} must be whole seconds: {err}")))
}
