//! Error types for the conversational layer.

use std::time::Duration;

use thiserror::Error;
use verso_search::SearchError;

use crate::controller::ControllerState;

/// Errors that can occur while handling a conversation turn.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The recommendation tool call failed.
    #[error("tool call failed: {0}")]
    ToolCall(#[from] SearchError),

    /// The text-generation service did not answer in time.
    #[error("{provider} did not respond within {timeout:?}")]
    UpstreamTimeout { provider: String, timeout: Duration },

    /// The text-generation service returned an error status.
    #[error("{provider} returned HTTP {status}: {message}")]
    Upstream {
        provider: String,
        status: u16,
        message: String,
    },

    /// A response from the text-generation service could not be parsed.
    #[error("parse error from {provider}: {message}")]
    Parse { provider: String, message: String },

    /// An error propagated from `reqwest`.
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    /// No API key is configured for the text-generation service.
    #[error("no API key configured for {provider}")]
    MissingApiKey { provider: String },

    /// The descriptor lexicon could not be loaded.
    #[error("lexicon error: {0}")]
    Lexicon(String),

    /// The controller was asked to make a transition its state machine
    /// does not allow.
    #[error("invalid transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: ControllerState,
        to: ControllerState,
    },
}

impl AgentError {
    /// Returns `true` when the error is transient and the operation may
    /// succeed if retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Upstream { status, .. } => *status == 429 || *status >= 500,
            Self::Request(e) => e.is_timeout() || e.is_connect(),
            Self::UpstreamTimeout { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` when the error came from the text-generation port
    /// rather than from the recommendation engine.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::UpstreamTimeout { .. }
                | Self::Upstream { .. }
                | Self::Parse { .. }
                | Self::Request(_)
                | Self::MissingApiKey { .. }
        )
    }
}

/// Convenience alias for agent results.
pub type AgentResult<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_and_server_errors_are_transient() {
        for status in [429, 500, 503] {
            let err = AgentError::Upstream {
                provider: "groq".to_string(),
                status,
                message: String::new(),
            };
            assert!(err.is_transient(), "status {status}");
        }
        let err = AgentError::Upstream {
            provider: "groq".to_string(),
            status: 401,
            message: "bad key".to_string(),
        };
        assert!(!err.is_transient());
        assert!(err.is_upstream());
    }

    #[test]
    fn test_tool_call_errors_are_not_upstream() {
        let err = AgentError::from(SearchError::EngineUnavailable("offline".to_string()));
        assert!(!err.is_upstream());
        assert!(!err.is_transient());
    }
}
