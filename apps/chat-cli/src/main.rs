//! Terminal stand-in for the chat bubble.
//!
//! ```text
//! gsm-chat --endpoint wss://bot.example/chat --api-key K "hello"
//! CHAT_ENDPOINT_URL=https://api.example/chat CHAT_API_KEY=K gsm-chat < questions.txt
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use gsm_chat_core::config::{ENV_API_KEY, ENV_ENDPOINT_URL, ENV_REPLY_TIMEOUT_SECS};
use gsm_chat_core::{ChatDispatcher, ChatEndpointConfig, ChatService, SharedChatService};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "gsm-chat",
    version,
    about = "Send messages to a Greentic chat endpoint"
)]
struct Cli {
    /// Chat endpoint (http, https, ws or wss); falls back to CHAT_ENDPOINT_URL.
    #[arg(long, value_name = "URL")]
    endpoint: Option<String>,
    /// Bearer credential; falls back to CHAT_API_KEY.
    #[arg(long, value_name = "KEY")]
    api_key: Option<String>,
    /// Seconds to wait for a WebSocket reply; falls back to CHAT_REPLY_TIMEOUT_SECS.
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,
    /// Message to send. Without one, every stdin line is sent as a message.
    message: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    gsm_chat_core::telemetry::install("gsm-chat")?;

    let config = resolve_config(&cli, |key| std::env::var(key).ok())?;
    info!(endpoint = config.endpoint(), "gsm-chat starting");
    let dispatcher =
        Arc::new(ChatDispatcher::new(config).context("failed to build chat dispatcher")?);
    let service: SharedChatService = dispatcher.clone();

    if cli.message.is_empty() {
        run_interactive(service).await?;
    } else {
        println!("{}", service.send_message(&cli.message.join(" ")).await);
    }

    dispatcher.disconnect().await;
    Ok(())
}

/// Flags win over the environment.
fn resolve_config<F>(cli: &Cli, env: F) -> Result<ChatEndpointConfig>
where
    F: Fn(&str) -> Option<String>,
{
    ChatEndpointConfig::from_lookup(|key| match key {
        ENV_ENDPOINT_URL => cli.endpoint.clone().or_else(|| env(key)),
        ENV_API_KEY => cli.api_key.clone().or_else(|| env(key)),
        ENV_REPLY_TIMEOUT_SECS => cli
            .timeout
            .map(|secs| secs.to_string())
            .or_else(|| env(key)),
        _ => env(key),
    })
    .context("invalid chat configuration")
}

async fn run_interactive(service: SharedChatService) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        let reply = service.send_message(text).await;
        stdout.write_all(format!("{reply}\n").as_bytes()).await?;
        stdout.flush().await?;
    }
    Ok(())
}
