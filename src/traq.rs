use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TraqConfig;
use crate::error::PipelineError;

pub const GIF_CONTENT_TYPE: &str = "image/gif";

#[derive(Debug, Serialize)]
struct PostMessageRequest<'a> {
    content: &'a str,
}

/// The part of traQ's FileInfo we need.
#[derive(Debug, Deserialize)]
struct FileInfo {
    id: String,
}

/// traQ REST API client for the two calls the bot makes.
pub struct TraqClient {
    client: reqwest::Client,
    api_base_url: String,
    access_token: String,
}

impl TraqClient {
    pub fn new(client: reqwest::Client, config: &TraqConfig) -> Self {
        Self {
            client,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
        }
    }

    /// Upload a GIF to `channel_id` and return the new file's id.
    pub async fn upload_file(
        &self,
        channel_id: &str,
        filename: &str,
        data: &[u8],
    ) -> Result<String, PipelineError> {
        // Built directly rather than through a generated traQ client, which
        // would send the file as application/octet-stream.
        let part = Part::bytes(data.to_vec())
            .file_name(filename.to_string())
            .mime_str(GIF_CONTENT_TYPE)
            .map_err(|e| PipelineError::Codec(format!("invalid part content type: {}", e)))?;
        let form = Form::new().part("file", part);
        let url = format!("{}/files", self.api_base_url);

        debug!("Uploading {} bytes to {} (channel {})", data.len(), url, channel_id);

        let response = self
            .client
            .post(&url)
            .query(&[("channelId", channel_id)])
            .bearer_auth(&self.access_token)
            .multipart(form)
            .send()
            .await
            .map_err(PipelineError::upstream)?;

        let status = response.status();
        if status.as_u16() >= 300 {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::UploadRejected { status, body });
        }

        let file: FileInfo = response
            .json()
            .await
            .map_err(|e| PipelineError::MalformedPayload(format!("file upload response: {}", e)))?;
        Ok(file.id)
    }

    /// Post `content` as a message in `channel_id`.
    pub async fn post_message(&self, channel_id: &str, content: &str) -> Result<(), PipelineError> {
        let url = format!("{}/channels/{}/messages", self.api_base_url, channel_id);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&PostMessageRequest { content })
            .send()
            .await
            .map_err(PipelineError::upstream)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::UpstreamUnavailable(format!(
                "post message failed ({}): {}",
                status, body
            )));
        }
        Ok(())
    }
}
