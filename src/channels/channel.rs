//! Transport-neutral event and message types plus the outbound channel trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// What kind of inbound event arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A plain-text message (tapped choice options arrive here too).
    Message { text: String },
    /// The user added the bot as a friend.
    Follow,
    /// Anything else: stickers, images, unfollow, postbacks...
    Other,
}

/// One inbound event from the transport.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub user_id: String,
    /// Single-use token that lets the channel answer this event directly.
    pub reply_token: Option<String>,
    pub kind: EventKind,
}

impl InboundEvent {
    pub fn text(user_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            reply_token: None,
            kind: EventKind::Message { text: text.into() },
        }
    }

    pub fn follow(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            reply_token: None,
            kind: EventKind::Follow,
        }
    }

    pub fn with_reply_token(mut self, token: impl Into<String>) -> Self {
        self.reply_token = Some(token.into());
        self
    }
}

/// A tappable option of a single-select prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub label: String,
    pub value: u32,
}

/// A question rendered with tappable options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoicePrompt {
    pub question: String,
    pub options: Vec<ChoiceOption>,
}

/// Outbound message content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Text(String),
    Choice(ChoicePrompt),
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// The human-readable text of the message.
    pub fn body(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::Choice(prompt) => &prompt.question,
        }
    }
}

/// An outbound instruction produced for one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Answer bound to the inciting event.
    Reply(Content),
    /// Fire-and-forget message addressed by user id.
    Push(Content),
}

impl Outbound {
    pub fn content(&self) -> &Content {
        match self {
            Self::Reply(c) | Self::Push(c) => c,
        }
    }
}

/// Delivery side of a chat transport.
#[async_trait]
pub trait OutboundChannel: Send + Sync {
    /// Channel name for logging.
    fn name(&self) -> &str;

    /// Answer an event using its reply token.
    async fn reply(&self, reply_token: &str, messages: &[Content]) -> Result<(), ChannelError>;

    /// Send messages to a user outside of any reply slot.
    async fn push(&self, user_id: &str, messages: &[Content]) -> Result<(), ChannelError>;
}
