use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ParseErrorPolicy;
use crate::error::PipelineError;

/// Body of `GET https://yesno.wtf/api`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct VerdictResponse {
    #[serde(alias = "Answer")]
    pub answer: String,
    #[serde(alias = "Image")]
    pub image: String,
}

impl VerdictResponse {
    /// Best-effort extraction of whichever string fields a broken body still has.
    fn salvage(body: &[u8]) -> Self {
        let value: Value = serde_json::from_slice(body).unwrap_or(Value::Null);
        let field = |names: [&str; 2]| {
            names
                .iter()
                .find_map(|name| value.get(*name).and_then(Value::as_str))
                .unwrap_or_default()
                .to_string()
        };
        Self {
            answer: field(["answer", "Answer"]),
            image: field(["image", "Image"]),
        }
    }
}

/// Client for the yesno.wtf API and the GIFs it links to.
pub struct YesNoClient {
    client: reqwest::Client,
    api_url: String,
    on_parse_error: ParseErrorPolicy,
}

impl YesNoClient {
    pub fn new(client: reqwest::Client, api_url: String, on_parse_error: ParseErrorPolicy) -> Self {
        Self {
            client,
            api_url,
            on_parse_error,
        }
    }

    pub async fn fetch_verdict(&self) -> Result<VerdictResponse, PipelineError> {
        let body = get_body(&self.client, &self.api_url).await?;
        parse_verdict(&body, self.on_parse_error)
    }

    pub async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, PipelineError> {
        let body = get_body(&self.client, url).await?;
        debug!("Downloaded {} bytes from {}", body.len(), url);
        Ok(body)
    }
}

/// Parse a verdict body, applying `policy` when it does not fit the expected shape.
pub fn parse_verdict(
    body: &[u8],
    policy: ParseErrorPolicy,
) -> Result<VerdictResponse, PipelineError> {
    match serde_json::from_slice::<VerdictResponse>(body) {
        Ok(verdict) => Ok(verdict),
        Err(e) => match policy {
            ParseErrorPolicy::Abort => Err(PipelineError::MalformedPayload(e.to_string())),
            ParseErrorPolicy::ContinueWithZeroValue => {
                warn!(error = %e, "Failed to parse yesno response, continuing with partial result");
                Ok(VerdictResponse::salvage(body))
            }
        },
    }
}

/// GET `url` and return the body; anything but 200 OK counts as unavailable.
async fn get_body(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, PipelineError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(PipelineError::upstream)?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return Err(PipelineError::UpstreamUnavailable(format!(
            "invalid status from {}: {}",
            url, status
        )));
    }

    let body = response.bytes().await.map_err(PipelineError::upstream)?;
    Ok(body.to_vec())
}
