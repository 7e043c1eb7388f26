// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

use runa_mcp_client::McpError;
use runa_model::ModelError;

use crate::guardrail::GuardrailResult;
use crate::session::SessionError;

/// Network/backing-store failures from the model, a remote tool server,
/// or the session store.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Model(ModelError),
    #[error(transparent)]
    Mcp(McpError),
    #[error(transparent)]
    Session(SessionError),
}

/// The failure surface of a run. Callers pattern-match on the kind; the
/// embedded fields carry the offending guardrail result, tool name, or
/// underlying cause.
#[derive(Debug, Error)]
pub enum RunError {
    /// Caller misuse: unknown model name, unknown handoff target, duplicate
    /// tool names, a raising enablement predicate, list-tools before connect.
    #[error("user error: {0}")]
    User(String),

    /// The model produced something the loop cannot use: bad JSON tool
    /// arguments, invalid final output against a strict schema, a call to a
    /// nonexistent tool.
    #[error("model behavior error: {0}")]
    ModelBehavior(String),

    /// A tool invoker failed fatally (distinct from a tool-reported failure
    /// result, which is fed back to the model instead).
    #[error("tool '{tool}' failed: {source}")]
    Tool {
        tool: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("max turns ({0}) exceeded")]
    MaxTurnsExceeded(u32),

    #[error("input guardrail '{}' tripwire triggered", .0.guardrail_name)]
    InputGuardrailTriggered(GuardrailResult),

    #[error("output guardrail '{}' tripwire triggered", .0.guardrail_name)]
    OutputGuardrailTriggered(GuardrailResult),

    #[error("run cancelled")]
    Cancelled,

    #[error("transport error: {0}")]
    Transport(#[source] TransportError),
}

impl From<ModelError> for RunError {
    fn from(e: ModelError) -> Self {
        match e {
            // Misconfiguration, not a wire fault.
            ModelError::MissingApiKey { .. } | ModelError::UnknownModel(_) => {
                RunError::User(e.to_string())
            }
            ModelError::IncompleteStream => RunError::ModelBehavior(e.to_string()),
            other => RunError::Transport(TransportError::Model(other)),
        }
    }
}

impl From<McpError> for RunError {
    fn from(e: McpError) -> Self {
        match e {
            McpError::NotConnected(_) => RunError::User(e.to_string()),
            other => RunError::Transport(TransportError::Mcp(other)),
        }
    }
}

impl From<SessionError> for RunError {
    fn from(e: SessionError) -> Self {
        RunError::Transport(TransportError::Session(e))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_api_key_maps_to_user_error() {
        let e: RunError = ModelError::MissingApiKey { env: "OPENAI_API_KEY" }.into();
        assert!(matches!(e, RunError::User(_)));
    }

    #[test]
    fn rate_limit_maps_to_transport() {
        let e: RunError = ModelError::RateLimited("slow down".into()).into();
        assert!(matches!(e, RunError::Transport(TransportError::Model(_))));
    }

    #[test]
    fn mcp_not_connected_maps_to_user_error() {
        let e: RunError = McpError::NotConnected("srv".into()).into();
        assert!(matches!(e, RunError::User(msg) if msg.contains("srv")));
    }

    #[test]
    fn max_turns_displays_the_limit() {
        assert_eq!(RunError::MaxTurnsExceeded(10).to_string(), "max turns (10) exceeded");
    }
}
