//! Bridges rig-core completion models to our `LlmProvider` trait.

use async_trait::async_trait;
use rig::agent::AgentBuilder;
use rig::completion::{Chat, CompletionModel, Message};

use crate::error::LlmError;

use super::provider::{ChatMessage, CompletionRequest, CompletionResponse, LlmProvider, Role};

/// Wraps any rig `CompletionModel`.
///
/// System messages are joined into the agent preamble, the last user message
/// becomes the prompt and everything in between is replayed as chat history.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
    provider: &'static str,
}

impl<M> RigAdapter<M>
where
    M: CompletionModel + 'static,
{
    pub fn new(model: M, model_name: &str, provider: &'static str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
            provider,
        }
    }
}

/// Split a message list into (preamble, history, prompt).
fn split_messages(
    messages: Vec<ChatMessage>,
    provider: &str,
) -> Result<(String, Vec<Message>, String), LlmError> {
    let mut preamble = Vec::new();
    let mut turns: Vec<ChatMessage> = Vec::new();
    for msg in messages {
        match msg.role {
            Role::System => preamble.push(msg.content),
            Role::User | Role::Assistant => turns.push(msg),
        }
    }

    let prompt = match turns.pop() {
        Some(last) if last.role == Role::User => last.content,
        _ => {
            return Err(LlmError::InvalidResponse {
                provider: provider.to_string(),
                reason: "request must end with a user message".to_string(),
            });
        }
    };

    let history = turns
        .into_iter()
        .map(|m| match m.role {
            Role::Assistant => Message::assistant(m.content),
            _ => Message::user(m.content),
        })
        .collect();

    Ok((preamble.join("\n\n"), history, prompt))
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let (preamble, history, prompt) = split_messages(request.messages, self.provider)?;

        let mut builder = AgentBuilder::new(self.model.clone()).preamble(&preamble);
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(f64::from(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(u64::from(max_tokens));
        }
        let agent = builder.build();

        let content = agent
            .chat(Message::user(prompt), history)
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: self.provider.to_string(),
                reason: e.to_string(),
            })?;

        Ok(CompletionResponse { content })
    }
}
