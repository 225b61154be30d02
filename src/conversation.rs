//! Caller-side turn handling on top of the relay: request assembly from
//! stored history, reply aggregation and persistence through a [`ChatStore`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::relay::{RelayClient, callbacks};
use crate::types::{ChatMessage, ChatRequest, Role};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer clearly and concisely.";
pub const DEFAULT_TITLE: &str = "New chat";
const TITLE_CHARS: usize = 50;

/// A persisted message. Attachments are stored as URLs only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub attachment_urls: Vec<String>,
    /// Unix seconds.
    pub created_at: i64,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>, attachment_urls: Vec<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            attachment_urls,
            created_at: OffsetDateTime::now_utc().unix_timestamp(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            attachment_urls: Vec::new(),
            created_at: OffsetDateTime::now_utc().unix_timestamp(),
        }
    }

    fn to_wire(&self) -> ChatMessage {
        if self.attachment_urls.is_empty() {
            return ChatMessage::new(self.role, self.content.clone());
        }
        ChatMessage::new(
            self.role,
            format!(
                "{}\n\n[Attachments: {}]",
                self.content,
                self.attachment_urls.join(", ")
            ),
        )
    }
}

/// Persistence collaborator for chats and their messages.
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn append_message(
        &self,
        chat_id: &str,
        message: &ConversationMessage,
    ) -> anyhow::Result<()>;

    async fn update_title(&self, chat_id: &str, title: &str) -> anyhow::Result<()>;
}

#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error("failed to save chat: {0}")]
    Store(#[from] anyhow::Error),
}

impl ConversationError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ConversationError::Relay(err) => err.is_retryable(),
            ConversationError::Store(_) => true,
        }
    }
}

/// A failed turn, with whatever reply text arrived before the failure.
#[derive(Debug, thiserror::Error)]
#[error("{source}")]
pub struct TurnError {
    #[source]
    pub source: ConversationError,
    pub partial: String,
}

impl TurnError {
    fn new(source: impl Into<ConversationError>, partial: String) -> Self {
        Self {
            source: source.into(),
            partial,
        }
    }
}

/// Builds the outbound request: system prompt first, then history oldest first.
pub fn build_request(
    history: &[ConversationMessage],
    system_prompt: Option<&str>,
    config: &RelayConfig,
) -> Result<ChatRequest, RelayError> {
    if history.is_empty() {
        return Err(RelayError::InvalidArgument("conversation is empty".to_string()));
    }
    let messages = system_prompt
        .filter(|prompt| !prompt.trim().is_empty())
        .map(ChatMessage::system)
        .into_iter()
        .chain(history.iter().map(ConversationMessage::to_wire))
        .collect();
    Ok(ChatRequest::new(messages)?
        .with_model(config.model.clone())
        .with_max_tokens(config.max_tokens))
}

pub fn derive_title(first_message: &str) -> String {
    let text = first_message.trim();
    if text.is_empty() {
        return DEFAULT_TITLE.to_string();
    }
    text.chars().take(TITLE_CHARS).collect::<String>().trim_end().to_string()
}

pub struct Conversation<'a> {
    client: &'a RelayClient,
    store: &'a dyn ChatStore,
    system_prompt: Option<String>,
}

impl<'a> Conversation<'a> {
    pub fn new(client: &'a RelayClient, store: &'a dyn ChatStore) -> Self {
        Self {
            client,
            store,
            system_prompt: Some(DEFAULT_SYSTEM_PROMPT.to_string()),
        }
    }

    pub fn with_system_prompt(mut self, prompt: Option<String>) -> Self {
        self.system_prompt = prompt;
        self
    }

    /// Sends one user turn and returns the full assistant reply.
    ///
    /// A blank message without attachments is rejected before anything is
    /// saved. The user message is saved before the relay starts and the reply
    /// after it succeeds. The chat title is set from the first user message.
    pub async fn send_turn<F>(
        &self,
        chat_id: &str,
        history: &[ConversationMessage],
        text: &str,
        attachment_urls: Vec<String>,
        mut on_chunk: F,
    ) -> Result<String, TurnError>
    where
        F: FnMut(&str) + Send,
    {
        if text.trim().is_empty() && attachment_urls.is_empty() {
            return Err(TurnError::new(
                RelayError::InvalidArgument("message is empty".to_string()),
                String::new(),
            ));
        }
        let user = ConversationMessage::user(text, attachment_urls);
        self.store
            .append_message(chat_id, &user)
            .await
            .map_err(|err| TurnError::new(err, String::new()))?;

        let mut turn = history.to_vec();
        turn.push(user);
        let request = build_request(&turn, self.system_prompt.as_deref(), self.client.config())
            .map_err(|err| TurnError::new(err, String::new()))?;

        let mut reply = String::new();
        let result = {
            let mut sink = callbacks(
                |piece: &str| {
                    reply.push_str(piece);
                    on_chunk(piece);
                },
                || {},
            );
            self.client.send(request, &mut sink).await
        };
        if let Err(err) = result {
            warn!(chat = chat_id, error = %err, received = reply.len(), "turn failed");
            return Err(TurnError::new(err, reply));
        }
        if reply.is_empty() {
            return Err(TurnError::new(RelayError::EmptyResponse, reply));
        }

        let assistant = ConversationMessage::assistant(reply.as_str());
        if let Err(err) = self.store.append_message(chat_id, &assistant).await {
            return Err(TurnError::new(err, reply));
        }
        if !history.iter().any(|message| message.role == Role::User) {
            let title = derive_title(text);
            debug!(chat = chat_id, title = %title, "titling chat");
            if let Err(err) = self.store.update_title(chat_id, &title).await {
                return Err(TurnError::new(err, reply));
            }
        }
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_has_prompt_and_attachments() {
        let history = vec![
            ConversationMessage::user("look", vec!["https://a/1.png".into(), "https://a/2.png".into()]),
            ConversationMessage::assistant("nice"),
        ];
        let request = build_request(&history, Some("be brief"), &RelayConfig::default()).unwrap();
        let messages = request.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0], ChatMessage::system("be brief"));
        assert_eq!(
            messages[1].content,
            "look\n\n[Attachments: https://a/1.png, https://a/2.png]"
        );
        assert_eq!(messages[2], ChatMessage::assistant("nice"));
        assert_eq!(request.model(), "deepseek-chat");
    }

    #[test]
    fn empty_history_is_invalid() {
        assert!(matches!(
            build_request(&[], Some("prompt"), &RelayConfig::default()),
            Err(RelayError::InvalidArgument(_))
        ));
    }

    #[test]
    fn titles() {
        assert_eq!(derive_title("   "), "New chat");
        assert_eq!(derive_title(" Plan a trip "), "Plan a trip");
        let long = "é".repeat(80);
        assert_eq!(derive_title(&long).chars().count(), 50);
    }
}
