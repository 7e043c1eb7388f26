// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;

use runa_model::{HostedToolKind, ToolDefinition};

use crate::ToolContext;

/// Failures raised by a tool invoker.
///
/// `Failure` and `BadArguments` are non-fatal: the runner converts them
/// into a tool-output item carrying the error text so the model can react.
/// `Fatal` aborts the run.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{0}")]
    Failure(String),

    #[error("bad tool arguments: {0}")]
    BadArguments(String),

    #[error("fatal tool error: {0}")]
    Fatal(#[from] anyhow::Error),
}

impl ToolError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ToolError::Fatal(_))
    }
}

/// The async invoker at the heart of a function tool: receives the run
/// context and the raw JSON argument string, returns the serialized result.
pub type ToolInvoker =
    Arc<dyn Fn(ToolContext, String) -> BoxFuture<'static, Result<Value, ToolError>> + Send + Sync>;

/// Enablement policy for a function tool. Disabled tools are filtered out
/// before the model ever sees them.
#[derive(Clone)]
pub enum ToolEnabled {
    Always,
    Never,
    /// Decided per turn from the run snapshot.
    Dynamic(Arc<dyn Fn(&ToolContext) -> bool + Send + Sync>),
}

impl fmt::Debug for ToolEnabled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => write!(f, "Always"),
            Self::Never => write!(f, "Never"),
            Self::Dynamic(_) => write!(f, "Dynamic(..)"),
        }
    }
}

/// A locally-executed tool with a JSON-schema argument contract.
#[derive(Clone)]
pub struct FunctionTool {
    pub name: String,
    pub description: String,
    /// JSON Schema of the argument object.
    pub params_schema: Value,
    /// When set, the backend enforces the schema on the wire.
    pub strict_json_schema: bool,
    pub enabled: ToolEnabled,
    invoker: ToolInvoker,
}

impl fmt::Debug for FunctionTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.name)
            .field("strict_json_schema", &self.strict_json_schema)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl FunctionTool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        params_schema: Value,
        invoker: ToolInvoker,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params_schema,
            strict_json_schema: true,
            enabled: ToolEnabled::Always,
            invoker,
        }
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict_json_schema = strict;
        self
    }

    pub fn with_enabled(mut self, enabled: ToolEnabled) -> Self {
        self.enabled = enabled;
        self
    }

    pub async fn invoke(&self, ctx: ToolContext, args_json: String) -> Result<Value, ToolError> {
        (self.invoker)(ctx, args_json).await
    }
}

/// An opaque descriptor for a tool executed by the model backend itself
/// (web search, code interpreter, image generation, hosted MCP). The loop
/// records its call items; it never invokes local code.
#[derive(Debug, Clone)]
pub struct HostedTool {
    pub kind: HostedToolKind,
    pub config: Value,
}

impl HostedTool {
    pub fn new(kind: HostedToolKind) -> Self {
        Self { kind, config: Value::Null }
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }
}

/// The tool surface an agent carries: a tagged variant rather than a
/// trait-object hierarchy, so dispatch sites can match on kind.
#[derive(Debug, Clone)]
pub enum Tool {
    Function(FunctionTool),
    Hosted(HostedTool),
}

impl Tool {
    pub fn name(&self) -> &str {
        match self {
            Tool::Function(t) => &t.name,
            Tool::Hosted(t) => t.kind.as_str(),
        }
    }

    /// Whether this tool should be offered to the model for the given turn.
    pub fn is_enabled(&self, ctx: &ToolContext) -> bool {
        match self {
            Tool::Function(t) => match &t.enabled {
                ToolEnabled::Always => true,
                ToolEnabled::Never => false,
                ToolEnabled::Dynamic(pred) => pred(ctx),
            },
            Tool::Hosted(_) => true,
        }
    }

    /// Convert to the wire descriptor sent with a model request.
    pub fn to_definition(&self) -> ToolDefinition {
        match self {
            Tool::Function(t) => ToolDefinition::Function {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.params_schema.clone(),
                strict: t.strict_json_schema,
            },
            Tool::Hosted(t) => ToolDefinition::Hosted {
                kind: t.kind,
                config: t.config.clone(),
            },
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
