pub mod traq;

/// A message-created notification from traQ
#[derive(Debug, Clone, Default)]
pub struct IncomingMessage {
    pub message_id: String,
    /// Channel the message was posted in
    pub channel_id: String,
    /// traQ ID of the author
    pub user_name: String,
    /// Whether the author is a bot account
    pub user_is_bot: bool,
    /// The message text with embeds flattened
    pub plain_text: String,
}
