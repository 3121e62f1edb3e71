use std::sync::Arc;

use anyhow::{bail, Context, Result};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bot::YesNoBot;
use crate::config::Config;
use crate::platform::IncomingMessage;

/// One frame on the traQ bot WebSocket.
#[derive(Debug, Deserialize)]
struct EventFrame {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(rename = "reqId", default)]
    req_id: Option<String>,
    #[serde(default)]
    body: Value,
}

#[derive(Debug, Deserialize)]
struct MessageCreatedPayload {
    message: MessagePayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagePayload {
    id: String,
    user: UserPayload,
    channel_id: String,
    #[serde(default)]
    plain_text: String,
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    #[serde(default)]
    name: String,
    #[serde(default)]
    bot: bool,
}

#[derive(Debug)]
pub enum BotEvent {
    MessageCreated(IncomingMessage),
    /// Error reported by the traQ server
    Error(String),
    /// Any event type the bot does not subscribe to
    Other(String),
}

/// Decode a text frame from the bot WebSocket.
pub fn parse_event(text: &str) -> Result<BotEvent> {
    let frame: EventFrame = serde_json::from_str(text).context("Invalid traQ event frame")?;

    match frame.event_type.as_str() {
        "MESSAGE_CREATED" => {
            let payload: MessageCreatedPayload = serde_json::from_value(frame.body)
                .with_context(|| {
                    format!(
                        "Invalid MESSAGE_CREATED payload (reqId {})",
                        frame.req_id.as_deref().unwrap_or("none")
                    )
                })?;
            let message = payload.message;
            Ok(BotEvent::MessageCreated(IncomingMessage {
                message_id: message.id,
                channel_id: message.channel_id,
                user_name: message.user.name,
                user_is_bot: message.user.bot,
                plain_text: message.plain_text,
            }))
        }
        "ERROR" => {
            let message = match frame.body {
                Value::String(s) => s,
                other => other.to_string(),
            };
            Ok(BotEvent::Error(message))
        }
        _ => Ok(BotEvent::Other(frame.event_type)),
    }
}

/// Run the traQ bot listener until `cancel` fires or reconnects are exhausted.
pub async fn run(config: Arc<Config>, bot: Arc<YesNoBot>, cancel: CancellationToken) -> Result<()> {
    let policy = &config.reconnect;
    let mut attempt: u32 = 0;

    info!("Starting traQ bot listener...");

    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                info!("traQ bot listener stopped");
                return Ok(());
            }
            result = connect_and_pump(&config, &bot, &cancel) => result,
        };

        let delay = match result {
            Ok(()) => {
                info!("traQ WebSocket session ended, reconnecting");
                attempt = 0;
                policy.backoff(0)
            }
            Err(e) => {
                warn!(
                    attempt,
                    max_retries = policy.max_retries,
                    error = %format!("{:#}", e),
                    "traQ WebSocket failed"
                );
                if attempt >= policy.max_retries {
                    bail!("traQ WebSocket retries exhausted: {:#}", e);
                }
                let delay = policy.backoff(attempt);
                attempt += 1;
                delay
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                info!("traQ bot listener stopped");
                return Ok(());
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Single session: connect, then handle frames until the server closes.
async fn connect_and_pump(config: &Config, bot: &YesNoBot, cancel: &CancellationToken) -> Result<()> {
    let mut request = config
        .traq
        .ws_url
        .as_str()
        .into_client_request()
        .context("Invalid traQ WebSocket URL")?;
    let auth = HeaderValue::from_str(&format!("Bearer {}", config.traq.access_token))
        .context("Access token is not a valid header value")?;
    request.headers_mut().insert(AUTHORIZATION, auth);

    let (mut ws_stream, _response) = connect_async(request)
        .await
        .context("Failed to connect to traQ WebSocket")?;

    info!("Connected to traQ WebSocket: {}", config.traq.ws_url);

    // Pongs are queued by tungstenite and flushed on the next read.
    while let Some(msg) = ws_stream.next().await {
        match msg.context("traQ WebSocket read failed")? {
            Message::Text(text) => match parse_event(text.as_str()) {
                Ok(BotEvent::MessageCreated(incoming)) => {
                    bot.handle_message(&incoming, cancel).await;
                }
                Ok(BotEvent::Error(message)) => {
                    error!("traQ bot error: {}", message);
                }
                Ok(BotEvent::Other(event_type)) => {
                    debug!("Ignoring traQ event: {}", event_type);
                }
                Err(e) => {
                    warn!("Skipping traQ frame: {:#}", e);
                }
            },
            Message::Close(frame) => {
                debug!("traQ closed the WebSocket: {:?}", frame);
                return Ok(());
            }
            _ => {}
        }
    }

    Ok(())
}
