pub mod chat;

use serde::{ Deserialize, Serialize };
use thiserror::Error;

/// Returned as a successful result when the provider produced nothing usable,
/// e.g. every candidate was withheld by safety filtering.
pub const SENTINEL_TEXT: &str =
    "[NO_SIGNAL]: The model returned no content for this request. It may have been withheld by safety filtering. Try rephrasing.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    /// Only the literal `user` stays a user turn; anything else is the model speaking.
    pub fn from_wire(role: &str) -> Self {
        if role == "user" { Role::User } else { Role::Model }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
}

/// Binary payload already decoded from its transport encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub mime_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text(String),
    Inline(Attachment),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self { role, parts: vec![Part::Text(text.into())] }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    #[default]
    Text,
    Json,
}

/// Everything one `generateContent` call needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub model: String,
    pub system_instruction: Option<String>,
    pub contents: Vec<Content>,
    pub response_format: ResponseFormat,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider API key is not configured. Set API_KEY or GEMINI_API_KEY.")]
    MissingCredential,
    #[error("{0}")]
    Transport(#[from] reqwest::Error),
    #[error("{message}")]
    Api {
        status: u16,
        message: String,
    },
    #[error("Unreadable provider response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub chat_model: String,
    pub analysis_model: String,
}
