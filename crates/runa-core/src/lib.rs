// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod agent;
mod agent_tool;
mod context;
mod error;
mod events;
mod graph;
mod guardrail;
mod handoff;
mod hooks;
mod items;
mod output;
mod queue;
mod result;
mod runner;
mod session;
mod streaming;
#[cfg(test)]
mod tests;

pub use agent::{
    Agent, CustomToolUseFn, Instructions, ModelRef, ToolCallSummary, ToolUseBehavior,
    ToolsToFinalOutput,
};
pub use agent_tool::OutputExtractor;
pub use context::RunContext;
pub use error::{RunError, TransportError};
pub use events::RunEvent;
pub use graph::{agent_graph, AgentGraph};
pub use guardrail::{
    GuardrailFunctionOutput, GuardrailResult, InputGuardrail, OutputGuardrail,
};
pub use handoff::{Handoff, HandoffInputData, HandoffInputFilter, HandoffTarget};
pub use hooks::{NoopRunHooks, RunHooks};
pub use items::{text_message_outputs, RunItem};
pub use output::{typed_output, JsonSchemaOutput, OutputSchema, PlainText, RESPONSE_WRAPPER_KEY};
pub use queue::{EventQueue, QueueTimedOut};
pub use result::RunResult;
pub use runner::{run, RunConfig, RunInput, Runner, DEFAULT_MAX_TURNS};
pub use session::{InMemorySession, Session, SessionError, SqliteSession};
pub use streaming::{run_streamed, RunStream};
