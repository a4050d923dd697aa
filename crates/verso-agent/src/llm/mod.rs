//! Text-generation port.
//!
//! The controller only needs "turn this conversation into text". That
//! contract is the [`GenerationPort`] trait; [`GroqClient`] implements it
//! over an OpenAI-compatible HTTP API and tests inject deterministic
//! stubs.

pub mod groq;

use std::fmt;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::AgentResult;

pub use groq::GroqClient;

static THINK_BLOCK: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").ok());
static BLANK_RUN: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\n\s*\n").ok());

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A request to generate one reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
}

impl GenerationRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: 0.0,
        }
    }

    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResponse {
    /// Generated text with reasoning blocks removed.
    pub text: String,

    /// Model that produced the text, when the service reports it.
    pub model: Option<String>,
}

/// An external text-generation service.
///
/// Implementations perform their own retries; callers apply the overall
/// deadline.
#[async_trait]
pub trait GenerationPort: fmt::Debug + Send + Sync {
    /// Provider name for logs and errors.
    fn provider(&self) -> &str;

    async fn generate(&self, request: GenerationRequest) -> AgentResult<GenerationResponse>;
}

/// Remove `<think>…</think>` reasoning blocks and collapse the blank lines
/// they leave behind.
pub fn strip_thinking(text: &str) -> String {
    let mut cleaned = match THINK_BLOCK.as_ref() {
        Some(re) => re.replace_all(text, "").into_owned(),
        None => text.to_string(),
    };
    if let Some(re) = BLANK_RUN.as_ref() {
        cleaned = re.replace_all(&cleaned, "\n\n").into_owned();
    }
    cleaned.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_thinking_removes_blocks() {
        let raw = "<think>\nthe user wants songs\n</think>\n\nHere are   some picks!";
        assert_eq!(strip_thinking(raw), "Here are   some picks!");
    }

    #[test]
    fn test_strip_thinking_is_non_greedy() {
        let raw = "<think>a</think>One\n\n\n\nTwo<think>b</think>";
        assert_eq!(strip_thinking(raw), "One\n\nTwo");
    }

    #[test]
    fn test_strip_thinking_without_blocks() {
        assert_eq!(strip_thinking("  plain  "), "plain");
    }

    #[test]
    fn test_roles_serialize_lowercase() {
        let json = serde_json::to_string(&ChatMessage::system("hi")).unwrap();
        assert_eq!(json, r#"{"role":"system","content":"hi"}"#);
    }
}
