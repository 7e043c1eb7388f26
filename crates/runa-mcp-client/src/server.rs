// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum McpError {
    /// List/call before `connect` — caller misuse, not a transport fault.
    #[error("server '{0}' is not connected; call connect() first")]
    NotConnected(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("server '{server}' has no tool named '{tool}'")]
    UnknownTool { server: String, tool: String },

    #[error("server '{server}' has no prompt named '{prompt}'")]
    UnknownPrompt { server: String, prompt: String },
}

/// A tool as advertised by a remote server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct McpToolDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema of the tool's argument object.
    pub input_schema: Value,
}

/// One content block in a tool result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum McpContent {
    Text { text: String },
    Image { data: String, mime_type: String },
    Resource { uri: String },
}

/// The result of a remote tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct McpToolResult {
    pub content: Vec<McpContent>,
    /// Machine-readable result, populated by servers that support it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
    #[serde(default)]
    pub is_error: bool,
}

impl McpToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![McpContent::Text { text: text.into() }],
            structured_content: None,
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![McpContent::Text { text: text.into() }],
            structured_content: None,
            is_error: true,
        }
    }

    /// Concatenation of all text blocks.
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                McpContent::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct McpPromptDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct McpPromptResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub text: String,
}

/// The capability contract of a remote tool server.
///
/// Implementations own the wire protocol (stdio, SSE, streaming HTTP —
/// out of scope here). The engine talks to a server only through an
/// [`crate::McpServerHandle`], which adds connection gating, caching and
/// filtering on top of this trait.
#[async_trait]
pub trait McpServer: Send + Sync {
    fn name(&self) -> &str;

    async fn connect(&self) -> Result<(), McpError>;

    /// Release the connection. Must be idempotent.
    async fn cleanup(&self) -> Result<(), McpError>;

    /// List the tools this server offers. `agent_name` lets servers tailor
    /// the list per agent; most implementations ignore it.
    async fn list_tools(&self, agent_name: Option<&str>) -> Result<Vec<McpToolDef>, McpError>;

    async fn call_tool(&self, name: &str, args: Option<Value>) -> Result<McpToolResult, McpError>;

    async fn list_prompts(&self) -> Result<Vec<McpPromptDef>, McpError>;

    async fn get_prompt(
        &self,
        name: &str,
        args: Option<Value>,
    ) -> Result<McpPromptResult, McpError>;

    /// When true, adapters prefer `structured_content` over the text blocks
    /// when converting a tool result for the model.
    fn use_structured_content(&self) -> bool {
        false
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_content_joins_text_blocks() {
        let res = McpToolResult {
            content: vec![
                McpContent::Text { text: "a".into() },
                McpContent::Image { data: "AA==".into(), mime_type: "image/png".into() },
                McpContent::Text { text: "b".into() },
            ],
            structured_content: None,
            is_error: false,
        };
        assert_eq!(res.text_content(), "a\nb");
    }

    #[test]
    fn error_constructor_sets_flag() {
        assert!(McpToolResult::error("broken").is_error);
        assert!(!McpToolResult::text("fine").is_error);
    }

    #[test]
    fn tool_def_round_trips() {
        let def = McpToolDef {
            name: "fetch".into(),
            description: Some("fetch a url".into()),
            input_schema: serde_json::json!({ "type": "object" }),
        };
        let json = serde_json::to_string(&def).unwrap();
        let back: McpToolDef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, def);
    }
}
