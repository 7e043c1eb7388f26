// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;

use crate::{ModelError, ModelSettings, ResponseItem, ToolDefinition, Usage};

/// Structured-output descriptor forwarded with a request.
///
/// When `strict` is set the backend enforces the schema; otherwise the
/// schema is advisory and validation happens locally in the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputSchemaDef {
    pub name: String,
    pub strict: bool,
    pub schema: Value,
}

/// Everything a model needs to produce one response.
#[derive(Debug, Clone, Default)]
pub struct ModelRequest {
    /// Resolved system instructions, if the agent has any.
    pub system_instructions: Option<String>,
    /// Flattened conversation: session prefix, caller items, and the items
    /// generated so far in this run, in order.
    pub input: Vec<ResponseItem>,
    pub tools: Vec<ToolDefinition>,
    pub settings: ModelSettings,
    pub output_schema: Option<OutputSchemaDef>,
    /// Continuation id for backends that keep conversation state server-side.
    pub previous_response_id: Option<String>,
    pub tracing_enabled: bool,
}

/// One complete model response.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModelResponse {
    pub output: Vec<ResponseItem>,
    pub usage: Usage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,
}

/// A raw event from a streaming model call.
///
/// A well-behaved stream yields any number of deltas and item events and
/// terminates with exactly one `Completed` carrying the full response; a
/// stream that ends without it is an error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Created {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        response_id: Option<String>,
    },
    OutputTextDelta {
        delta: String,
    },
    OutputItemDone {
        item: ResponseItem,
    },
    Completed {
        response: ModelResponse,
    },
}

pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, ModelError>> + Send>>;

/// The contract between the runner and a concrete model backend.
#[async_trait]
pub trait Model: Send + Sync + std::fmt::Debug {
    /// Model identifier as reported to users.
    fn name(&self) -> &str;

    /// Produce one complete response.
    async fn get_response(&self, req: ModelRequest) -> Result<ModelResponse, ModelError>;

    /// Produce a stream of events for one response.
    ///
    /// The stream must end with [`StreamEvent::Completed`] or an error.
    async fn stream_response(&self, req: ModelRequest) -> Result<ResponseStream, ModelError>;
}

/// Resolves a model name to a [`Model`] instance.
///
/// `None` asks for the provider's default model.
pub trait ModelProvider: Send + Sync {
    fn get_model(&self, name: Option<&str>) -> Result<Arc<dyn Model>, ModelError>;
}
