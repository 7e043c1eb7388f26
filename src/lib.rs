// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! runa — an embeddable agent orchestration runtime.
//!
//! An [`Agent`] bundles instructions, a model, tools, guardrails, handoff
//! targets and an optional structured-output contract. The [`Runner`]
//! drives it through the turn loop: call the model, execute tool calls
//! concurrently, follow handoffs, race guardrails, and return a
//! [`RunResult`] — or stream [`RunEvent`]s as they happen.
//!
//! ```no_run
//! use std::sync::Arc;
//! use runa::{run, Agent};
//!
//! # async fn example() -> Result<(), runa::RunError> {
//! let agent = Arc::new(
//!     Agent::new("assistant")
//!         .instructions("Reply very concisely.")
//!         .model("gpt-4.1"),
//! );
//! let result = run(agent, "What city is the Golden Gate Bridge in?").await?;
//! println!("{}", result.final_output_text());
//! # Ok(())
//! # }
//! ```
mod demo;

pub use demo::run_demo_loop;

pub use runa_core::{
    agent_graph, run, run_streamed, text_message_outputs, typed_output, Agent, AgentGraph,
    EventQueue,
    GuardrailFunctionOutput, GuardrailResult, Handoff, HandoffInputData, HandoffInputFilter,
    HandoffTarget, InMemorySession, InputGuardrail, Instructions, JsonSchemaOutput, ModelRef,
    NoopRunHooks, OutputGuardrail, OutputSchema, PlainText, QueueTimedOut, RunConfig, RunContext,
    RunError, RunEvent, RunHooks, RunInput, RunItem, RunResult, RunStream, Runner, Session,
    SessionError, SqliteSession, ToolCallSummary, ToolUseBehavior, ToolsToFinalOutput,
    TransportError, DEFAULT_MAX_TURNS, RESPONSE_WRAPPER_KEY,
};
pub use runa_mcp_client::{
    mcp_function_tools, McpContent, McpError, McpPromptDef, McpPromptResult, McpServer,
    McpServerHandle, McpToolDef, McpToolResult, ToolFilter, ToolFilterContext,
};
pub use runa_model::{
    default_model_provider, set_default_model_provider, ContentPart, HostedToolKind, MockModel,
    Model, ModelError, ModelProvider, ModelRegistry, ModelRequest, ModelResponse, ModelSettings,
    OutputSchemaDef, ReasoningEffort, ResponseItem, ResponseStream, Role, ScriptedModel,
    StreamEvent, ToolChoice, ToolDefinition, Usage, UsageRef, Verbosity,
};
pub use runa_tools::{
    function_tool, typed_function_tool, FunctionTool, HostedTool, Tool, ToolContext, ToolEnabled,
    ToolError, ToolRegistry,
};
