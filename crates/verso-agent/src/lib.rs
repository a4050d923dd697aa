//! Conversational recommendations for verso.
//!
//! Reads a user message, decides whether it needs a lyric search, calls the
//! query service at most once, and phrases the result. An optional
//! generation port (an OpenAI-compatible chat endpoint) only rewords
//! replies; every song it mentions comes from the tool result.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod compose;
pub mod config;
pub mod controller;
pub mod error;
pub mod intent;
pub mod llm;

pub use config::Config;
pub use controller::{
    ControllerState, Controller, ConversationState, Reply, Session, ToolCallRecord, Turn,
};
pub use error::{AgentError, AgentResult};
pub use intent::{Action, ClarifyReason, DescriptorLexicon, IntentClassifier, ToolRequest};
pub use llm::{GenerationPort, GenerationRequest, GenerationResponse, GroqClient};
