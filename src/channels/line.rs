//! LINE channel — webhook parsing, signature verification and the
//! Messaging API client.

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use sha2::Sha256;
use tracing::{debug, warn};

use crate::channels::{Content, EventKind, InboundEvent, OutboundChannel};
use crate::config::LineConfig;
use crate::error::ChannelError;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the webhook body signature.
pub const SIGNATURE_HEADER: &str = "x-line-signature";

/// Messages accepted per reply/push request.
const MAX_MESSAGES_PER_REQUEST: usize = 5;

/// Quick-reply limits of the Messaging API.
const MAX_QUICK_REPLY_ITEMS: usize = 13;
const MAX_ACTION_LABEL_CHARS: usize = 20;

const MAX_TEXT_CHARS: usize = 5000;

// ── Webhook payload ─────────────────────────────────────────────────────

/// Body of a webhook request.
#[derive(Debug, Deserialize)]
pub struct WebhookBody {
    #[serde(default)]
    pub events: Vec<WebhookEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub reply_token: Option<String>,
    #[serde(default)]
    pub source: Option<EventSource>,
    #[serde(default)]
    pub message: Option<EventMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSource {
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EventMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl WebhookEvent {
    /// Convert to a transport-neutral event. Events without a user id
    /// cannot be tied to a session and yield `None`.
    pub fn into_inbound(self) -> Option<InboundEvent> {
        let user_id = self.source.and_then(|s| s.user_id)?;
        let kind = match (self.event_type.as_str(), self.message) {
            ("message", Some(EventMessage { message_type, text: Some(text) }))
                if message_type == "text" =>
            {
                EventKind::Message { text }
            }
            ("follow", _) => EventKind::Follow,
            _ => EventKind::Other,
        };
        Some(InboundEvent {
            user_id,
            reply_token: self.reply_token,
            kind,
        })
    }
}

/// Parse a raw webhook body into inbound events, in delivery order.
pub fn parse_events(body: &[u8]) -> Result<Vec<InboundEvent>, ChannelError> {
    let body: WebhookBody = serde_json::from_slice(body)
        .map_err(|e| ChannelError::InvalidMessage(format!("webhook body: {e}")))?;
    let total = body.events.len();
    let events: Vec<InboundEvent> = body
        .events
        .into_iter()
        .filter_map(WebhookEvent::into_inbound)
        .collect();
    if events.len() < total {
        debug!(dropped = total - events.len(), "Dropped events without a user id");
    }
    Ok(events)
}

// ── Signature ───────────────────────────────────────────────────────────

/// Compute the base64 HMAC-SHA256 signature of `body`.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);
    BASE64.encode(mac.finalize().into_bytes())
}

/// Check `signature` against `body` in constant time.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = BASE64.decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

// ── Outbound ────────────────────────────────────────────────────────────

/// Render one message as a Messaging API message object.
pub fn render_message(content: &Content) -> Value {
    match content {
        Content::Text(text) => json!({
            "type": "text",
            "text": truncate(text, MAX_TEXT_CHARS),
        }),
        Content::Choice(prompt) => {
            if prompt.options.len() > MAX_QUICK_REPLY_ITEMS {
                warn!(
                    options = prompt.options.len(),
                    "Choice prompt exceeds quick-reply limit; extra options dropped"
                );
            }
            let items: Vec<Value> = prompt
                .options
                .iter()
                .take(MAX_QUICK_REPLY_ITEMS)
                .map(|option| {
                    json!({
                        "type": "action",
                        "action": {
                            "type": "message",
                            "label": truncate(&option.label, MAX_ACTION_LABEL_CHARS),
                            "text": option.value.to_string(),
                        }
                    })
                })
                .collect();
            json!({
                "type": "text",
                "text": truncate(&prompt.question, MAX_TEXT_CHARS),
                "quickReply": { "items": items },
            })
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// LINE Messaging API client.
pub struct LineClient {
    client: reqwest::Client,
    access_token: SecretString,
    api_base: String,
}

impl LineClient {
    pub fn new(config: &LineConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            access_token: config.channel_access_token.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/v2/bot/message/{path}", self.api_base)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<(), ChannelError> {
        let resp = self
            .client
            .post(self.api_url(path))
            .bearer_auth(self.access_token.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let detail = resp.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ChannelError::AuthFailed {
                name: "line".into(),
                reason: detail,
            });
        }
        Err(ChannelError::SendFailed {
            name: "line".into(),
            reason: format!("{path} returned {status}: {detail}"),
        })
    }
}

#[async_trait]
impl OutboundChannel for LineClient {
    fn name(&self) -> &str {
        "line"
    }

    async fn reply(&self, reply_token: &str, messages: &[Content]) -> Result<(), ChannelError> {
        if messages.is_empty() {
            return Ok(());
        }
        // A reply token is single-use, so everything has to fit one request.
        if messages.len() > MAX_MESSAGES_PER_REQUEST {
            return Err(ChannelError::InvalidMessage(format!(
                "{} messages in one reply (max {MAX_MESSAGES_PER_REQUEST})",
                messages.len()
            )));
        }
        let body = json!({
            "replyToken": reply_token,
            "messages": messages.iter().map(render_message).collect::<Vec<_>>(),
        });
        self.post("reply", &body).await
    }

    async fn push(&self, user_id: &str, messages: &[Content]) -> Result<(), ChannelError> {
        for chunk in messages.chunks(MAX_MESSAGES_PER_REQUEST) {
            let body = json!({
                "to": user_id,
                "messages": chunk.iter().map(render_message).collect::<Vec<_>>(),
            });
            self.post("push", &body).await?;
        }
        Ok(())
    }
}
