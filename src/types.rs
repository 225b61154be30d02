use serde::{Deserialize, Serialize};

use crate::error::RelayError;

pub const DEFAULT_MODEL: &str = "deepseek-chat";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// One outbound completion request, oldest message first.
///
/// Built from a snapshot of the conversation at send time. There are no
/// setters once constructed; the relay session takes it by value.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatRequest {
    messages: Vec<ChatMessage>,
    stream: bool,
    model: String,
    max_tokens: u32,
}

impl ChatRequest {
    /// Fails with `InvalidArgument` when `messages` is empty.
    pub fn new(messages: Vec<ChatMessage>) -> Result<Self, RelayError> {
        if messages.is_empty() {
            return Err(RelayError::InvalidArgument(
                "messages array is required".to_string(),
            ));
        }
        Ok(Self {
            messages,
            stream: true,
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Always `true`: the relay only asks for streamed responses and decodes
    /// a whole-body JSON answer as a fallback.
    pub fn stream(&self) -> bool {
        self.stream
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}

/// What a relay session yields, in wire order.
///
/// Zero or more `Chunk`s are followed by exactly one `Done` or `Error`;
/// nothing is yielded after that.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    Chunk { text: String },
    Done,
    Error(RelayError),
}

impl StreamEvent {
    pub fn chunk(text: impl Into<String>) -> Self {
        Self::Chunk { text: text.into() }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error(_))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Chunk { text } => Some(text),
            _ => None,
        }
    }
}
