use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const ACCESS_TOKEN_ENV: &str = "TRAQ_BOT_ACCESS_TOKEN";
pub const CHANNEL_ID_ENV: &str = "TRAQ_BOT_CHANNEL_ID";

/// Where the reply is posted.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChannelSource {
    /// The channel the triggering message was posted in
    #[default]
    FromEvent,
    /// `pipeline.channel_id`, regardless of the event
    Fixed,
}

/// What happens to the downloaded GIF before it is uploaded.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ImageHandling {
    Passthrough,
    #[default]
    Reencode,
}

/// Policy for a yesno.wtf body that does not parse.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ParseErrorPolicy {
    #[default]
    ContinueWithZeroValue,
    Abort,
}

impl std::fmt::Display for ChannelSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelSource::FromEvent => write!(f, "from_event"),
            ChannelSource::Fixed => write!(f, "fixed"),
        }
    }
}

impl std::fmt::Display for ImageHandling {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageHandling::Passthrough => write!(f, "passthrough"),
            ImageHandling::Reencode => write!(f, "reencode"),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub traq: TraqConfig,
    #[serde(default)]
    pub yesno: YesNoConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TraqConfig {
    #[serde(default)]
    pub access_token: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// Prefix for file links in replies
    #[serde(default = "default_file_url_base")]
    pub file_url_base: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct YesNoConfig {
    #[serde(default = "default_yesno_api_url")]
    pub api_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default)]
    pub channel_source: ChannelSource,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub image_handling: ImageHandling,
    #[serde(default)]
    pub on_parse_error: ParseErrorPolicy,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_upload_filename")]
    pub upload_filename: String,
    /// Drop MESSAGE_CREATED events whose author is a bot
    #[serde(default)]
    pub ignore_bot_messages: bool,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_api_base_url() -> String {
    "https://q.trap.jp/api/v3".to_string()
}

fn default_ws_url() -> String {
    "wss://q.trap.jp/api/v3/bots/ws".to_string()
}

fn default_file_url_base() -> String {
    "https://q.trap.jp/files".to_string()
}

fn default_yesno_api_url() -> String {
    "https://yesno.wtf/api".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_upload_filename() -> String {
    "yesno.gif".to_string()
}

fn default_max_retries() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    250
}

fn default_max_delay_ms() -> u64 {
    5_000
}

impl Default for TraqConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            api_base_url: default_api_base_url(),
            ws_url: default_ws_url(),
            file_url_base: default_file_url_base(),
        }
    }
}

impl Default for YesNoConfig {
    fn default() -> Self {
        Self {
            api_url: default_yesno_api_url(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channel_source: ChannelSource::default(),
            channel_id: None,
            image_handling: ImageHandling::default(),
            on_parse_error: ParseErrorPolicy::default(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            upload_filename: default_upload_filename(),
            ignore_bot_messages: false,
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl ReconnectConfig {
    /// Capped exponential delay before reconnect attempt `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self
            .base_delay_ms
            .saturating_mul(multiplier)
            .min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

impl PipelineConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Config {
    /// Load from `path` if it exists, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let content = if path.exists() {
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?
        } else {
            String::new()
        };

        let mut config = Self::parse(&content)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Overlay values taken from `lookup` (normally the process environment).
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup(ACCESS_TOKEN_ENV).filter(|v| !v.is_empty()) {
            self.traq.access_token = token;
        }
        if let Some(channel) = lookup(CHANNEL_ID_ENV).filter(|v| !v.is_empty()) {
            self.pipeline.channel_id = Some(channel);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.traq.access_token.is_empty() {
            bail!(
                "traQ bot access token is not set (config traq.access_token or {})",
                ACCESS_TOKEN_ENV
            );
        }
        if self.pipeline.channel_source == ChannelSource::Fixed
            && self.fixed_channel_id().is_none()
        {
            bail!(
                "pipeline.channel_source = \"fixed\" needs pipeline.channel_id or {}",
                CHANNEL_ID_ENV
            );
        }
        Ok(())
    }

    /// Configured target channel, if any.
    pub fn fixed_channel_id(&self) -> Option<&str> {
        self.pipeline
            .channel_id
            .as_deref()
            .filter(|id| !id.is_empty())
    }
}
