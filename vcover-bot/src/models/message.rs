//! Inbound chat messages

use serde::{Deserialize, Serialize};

/// One inbound chat event as delivered by the chat adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Conversation the message was posted in (group or private chat)
    pub session_id: String,
    pub sender_id: String,
    /// Raw message text
    #[serde(rename = "message")]
    pub text: String,
}

impl InboundMessage {
    pub fn new(
        session_id: impl Into<String>,
        sender_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            sender_id: sender_id.into(),
            text: text.into(),
        }
    }
}
