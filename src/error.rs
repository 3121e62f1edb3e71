use std::fmt;

use thiserror::Error;

/// Everything that can abort one pipeline invocation.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("codec error: {0}")]
    Codec(String),
    #[error("upload rejected: {status} {body}")]
    UploadRejected {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("cancelled")]
    Cancelled,
}

impl PipelineError {
    pub fn upstream(err: impl fmt::Display) -> Self {
        Self::UpstreamUnavailable(err.to_string())
    }
}

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    FetchVerdict,
    FetchImage,
    Relay,
    UploadFile,
    PostReply,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::FetchVerdict => write!(f, "fetch_verdict"),
            Stage::FetchImage => write!(f, "fetch_image"),
            Stage::Relay => write!(f, "relay"),
            Stage::UploadFile => write!(f, "upload_file"),
            Stage::PostReply => write!(f, "post_reply"),
        }
    }
}

/// A pipeline failure tagged with the stage that produced it.
#[derive(Debug, Error)]
#[error("{stage}: {source}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub source: PipelineError,
}

/// Attach a stage to a pipeline result.
pub trait InStage<T> {
    fn in_stage(self, stage: Stage) -> Result<T, StageError>;
}

impl<T> InStage<T> for Result<T, PipelineError> {
    fn in_stage(self, stage: Stage) -> Result<T, StageError> {
        self.map_err(|source| StageError { stage, source })
    }
}
