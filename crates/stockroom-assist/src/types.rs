//! Wire types for the OpenAI-compatible chat completions API, and the
//! domain-facing inputs and outputs of the assistant.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Conversation
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One turn of a conversation, as clients send their history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage { role: ChatRole::User, content: content.into() }
    }
}

// =============================================================================
// Request / Response
// =============================================================================

#[derive(Debug, Serialize)]
pub(crate) struct CompletionRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<WireMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A message whose content is either plain text or a list of parts.
#[derive(Debug, Serialize)]
pub(crate) struct WireMessage {
    pub role: ChatRole,
    pub content: Value,
}

impl From<ChatMessage> for WireMessage {
    fn from(message: ChatMessage) -> Self {
        WireMessage {
            role: message.role,
            content: Value::String(message.content),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/// `{"error": {"message": "..."}}`
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub message: String,
}

// =============================================================================
// Domain inputs / outputs
// =============================================================================

/// Attributes read off a product photo. Every field is a guess and may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductHints {
    pub name: Option<String>,
    pub code: Option<String>,
    pub price_cents: Option<i64>,
    pub category: Option<String>,
    pub description: Option<String>,
}

impl ProductHints {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.code.is_none()
            && self.price_cents.is_none()
            && self.category.is_none()
            && self.description.is_none()
    }
}

/// One product line of the inventory snapshot sent for restock analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockLine {
    pub name: String,
    pub code: String,
    pub quantity: i64,
    pub price_cents: i64,
    /// Units sold over the snapshot window.
    pub units_sold: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventorySnapshot {
    pub window_days: u32,
    pub products: Vec<StockLine>,
}
