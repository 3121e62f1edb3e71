use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{ChannelSource, Config};
use crate::error::{InStage, PipelineError, Stage, StageError};
use crate::platform::IncomingMessage;
use crate::relay;
use crate::traq::TraqClient;
use crate::yesno::YesNoClient;

/// Result of one successful pipeline invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub channel_id: String,
    pub file_id: String,
    pub content: String,
}

/// Fetches a verdict GIF and replies with it.
pub struct YesNoBot {
    config: Arc<Config>,
    yesno: YesNoClient,
    traq: TraqClient,
}

impl YesNoBot {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.pipeline.request_timeout())
            .connect_timeout(config.pipeline.connect_timeout())
            .build()
            .context("Failed to build HTTP client")?;

        let yesno = YesNoClient::new(
            client.clone(),
            config.yesno.api_url.clone(),
            config.pipeline.on_parse_error,
        );
        let traq = TraqClient::new(client, &config.traq);

        Ok(Self {
            config,
            yesno,
            traq,
        })
    }

    /// Channel to reply in for this message, per `pipeline.channel_source`.
    pub fn resolve_channel<'a>(&'a self, incoming: &'a IncomingMessage) -> Option<&'a str> {
        match self.config.pipeline.channel_source {
            ChannelSource::Fixed => self.config.fixed_channel_id(),
            ChannelSource::FromEvent => {
                Some(incoming.channel_id.as_str()).filter(|id| !id.is_empty())
            }
        }
    }

    /// Entry point for MESSAGE_CREATED. Failures are logged here and go no further.
    pub async fn handle_message(&self, incoming: &IncomingMessage, cancel: &CancellationToken) {
        info!(
            "Message from {} in {}: {}",
            incoming.user_name, incoming.channel_id, incoming.plain_text
        );

        if self.config.pipeline.ignore_bot_messages && incoming.user_is_bot {
            debug!("Ignoring message {} from bot {}", incoming.message_id, incoming.user_name);
            return;
        }

        let Some(channel_id) = self.resolve_channel(incoming) else {
            warn!("No target channel for message {}", incoming.message_id);
            return;
        };

        match self.run_pipeline(channel_id, cancel).await {
            Ok(reply) => info!(
                "Replied in {} with file {}: {:?}",
                reply.channel_id, reply.file_id, reply.content
            ),
            Err(e) => error!(
                stage = %e.stage,
                message_id = %incoming.message_id,
                error = %e.source,
                "yesno pipeline aborted"
            ),
        }
    }

    /// fetch verdict -> fetch image -> relay -> upload -> reply, stopping at the first failure.
    pub async fn run_pipeline(
        &self,
        channel_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Reply, StageError> {
        let verdict = cancellable(cancel, self.yesno.fetch_verdict())
            .await
            .in_stage(Stage::FetchVerdict)?;
        debug!("Verdict: {} ({})", verdict.answer, verdict.image);

        let image = cancellable(cancel, self.yesno.fetch_image(&verdict.image))
            .await
            .in_stage(Stage::FetchImage)?;

        let handling = self.config.pipeline.image_handling;
        let payload = cancellable(cancel, async move {
            tokio::task::spawn_blocking(move || relay::relay(image, handling))
                .await
                .map_err(|e| PipelineError::Codec(e.to_string()))?
        })
        .await
        .in_stage(Stage::Relay)?;

        let file_id = cancellable(
            cancel,
            self.traq
                .upload_file(channel_id, &self.config.pipeline.upload_filename, &payload),
        )
        .await
        .in_stage(Stage::UploadFile)?;
        drop(payload);

        let content = reply_text(&verdict.answer, &self.config.traq.file_url_base, &file_id);
        cancellable(cancel, self.traq.post_message(channel_id, &content))
            .await
            .in_stage(Stage::PostReply)?;

        Ok(Reply {
            channel_id: channel_id.to_string(),
            file_id,
            content,
        })
    }
}

/// Race a stage against the cancellation token.
async fn cancellable<T, F>(cancel: &CancellationToken, stage: F) -> Result<T, PipelineError>
where
    F: Future<Output = Result<T, PipelineError>>,
{
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    tokio::select! {
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        result = stage => result,
    }
}

/// Upper-case the first letter of a single word.
pub fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `"<Verdict>やんね！\n\n<file_url_base>/<file_id>"`
pub fn reply_text(answer: &str, file_url_base: &str, file_id: &str) -> String {
    format!(
        "{}やんね！\n\n{}/{}",
        capitalize(answer),
        file_url_base.trim_end_matches('/'),
        file_id
    )
}
