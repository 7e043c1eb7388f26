// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod error;
mod mock;
mod provider;
mod registry;
mod settings;
mod types;
mod usage;

pub use error::ModelError;
pub use mock::{MockModel, ScriptedModel};
pub use provider::{Model, ModelProvider, ModelRequest, ModelResponse, OutputSchemaDef, ResponseStream, StreamEvent};
pub use registry::{
    default_model_provider, resolve_api_key, resolve_base_url, set_default_model_provider,
    ModelRegistry, OPENAI_API_KEY_ENV, OPENAI_BASE_URL_ENV,
};
pub use settings::{ModelSettings, ReasoningEffort, ToolChoice, Verbosity};
pub use types::{
    ContentPart, HostedToolKind, McpToolInfo, ResponseItem, Role, ToolDefinition,
};
pub use usage::{Usage, UsageRef};
