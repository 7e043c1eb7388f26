// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use runa_mcp_client::McpServerHandle;
use runa_model::{Model, ModelSettings};
use runa_tools::Tool;

use crate::{Handoff, InputGuardrail, OutputGuardrail, OutputSchema, RunContext, RunError};

/// System instructions: a fixed string, or a callback resolved once per
/// turn for the active agent. The callback must not mutate the agent.
#[derive(Clone)]
pub enum Instructions {
    Static(String),
    Dynamic(
        Arc<
            dyn Fn(RunContext, Arc<Agent>) -> BoxFuture<'static, Result<String, RunError>>
                + Send
                + Sync,
        >,
    ),
}

impl fmt::Debug for Instructions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(s) => f.debug_tuple("Static").field(s).finish(),
            Self::Dynamic(_) => write!(f, "Dynamic(..)"),
        }
    }
}

/// How an agent names its model.
#[derive(Clone, Default)]
pub enum ModelRef {
    /// Use the run's provider with its default model.
    #[default]
    Default,
    /// A name resolved through the run's model provider.
    Named(String),
    /// An instantiated model, bypassing provider resolution.
    Instance(Arc<dyn Model>),
}

impl fmt::Debug for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "Default"),
            Self::Named(n) => f.debug_tuple("Named").field(n).finish(),
            Self::Instance(m) => f.debug_tuple("Instance").field(&m.name()).finish(),
        }
    }
}

/// Summary of one executed tool call, handed to custom tool-use behaviors.
#[derive(Debug, Clone)]
pub struct ToolCallSummary {
    pub tool_name: String,
    pub call_id: String,
    pub output: Value,
}

/// What a custom tool-use behavior decided.
#[derive(Debug, Clone, Default)]
pub struct ToolsToFinalOutput {
    pub is_final: bool,
    pub final_output: Option<Value>,
}

/// The callback shape of [`ToolUseBehavior::Custom`].
pub type CustomToolUseFn = Arc<
    dyn Fn(RunContext, Vec<ToolCallSummary>) -> BoxFuture<'static, Result<ToolsToFinalOutput, RunError>>
        + Send
        + Sync,
>;

/// What happens after a turn's tool calls have executed.
#[derive(Clone, Default)]
pub enum ToolUseBehavior {
    /// Feed the outputs back and run the model again.
    #[default]
    RunLlmAgain,
    /// The first tool output is the final output.
    StopOnFirstTool,
    /// If any executed tool's name is in the set, its output is final.
    StopAtToolNames(HashSet<String>),
    Custom(CustomToolUseFn),
}

impl fmt::Debug for ToolUseBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunLlmAgain => write!(f, "RunLlmAgain"),
            Self::StopOnFirstTool => write!(f, "StopOnFirstTool"),
            Self::StopAtToolNames(names) => f.debug_tuple("StopAtToolNames").field(names).finish(),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl ToolUseBehavior {
    /// Stop when any of `names` executes, using its output as final.
    pub fn stop_at(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::StopAtToolNames(names.into_iter().map(Into::into).collect())
    }

    /// A custom decision callback over the turn's tool results.
    pub fn custom<F, Fut>(f: F) -> Self
    where
        F: Fn(RunContext, Vec<ToolCallSummary>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<ToolsToFinalOutput, RunError>> + Send + 'static,
    {
        let f = Arc::new(f);
        Self::Custom(Arc::new(move |ctx, results| {
            let f = Arc::clone(&f);
            Box::pin(async move { f(ctx, results).await })
        }))
    }

    pub(crate) async fn apply(
        &self,
        ctx: RunContext,
        results: &[ToolCallSummary],
    ) -> Result<ToolsToFinalOutput, RunError> {
        match self {
            Self::RunLlmAgain => Ok(ToolsToFinalOutput::default()),
            Self::StopOnFirstTool => Ok(ToolsToFinalOutput {
                is_final: true,
                final_output: results.first().map(|r| r.output.clone()),
            }),
            Self::StopAtToolNames(names) => {
                let hit = results.iter().find(|r| names.contains(&r.tool_name));
                Ok(ToolsToFinalOutput {
                    is_final: hit.is_some(),
                    final_output: hit.map(|r| r.output.clone()),
                })
            }
            Self::Custom(f) => f(ctx, results.to_vec()).await,
        }
    }
}

/// A named configuration bundle: instructions, model, tools, guardrails,
/// handoff targets, and an optional structured-output contract.
///
/// Agents are immutable once built and shared as `Arc<Agent>`; a run never
/// mutates its agents.
#[derive(Debug, Clone, Default)]
pub struct Agent {
    pub name: String,
    pub instructions: Option<Instructions>,
    /// Shown to sibling agents when this agent is a handoff target.
    pub handoff_description: Option<String>,
    pub model: ModelRef,
    pub model_settings: ModelSettings,
    pub tools: Vec<Tool>,
    pub handoffs: Vec<Handoff>,
    pub input_guardrails: Vec<InputGuardrail>,
    pub output_guardrails: Vec<OutputGuardrail>,
    pub output_schema: Option<Arc<dyn OutputSchema>>,
    pub mcp_servers: Vec<Arc<McpServerHandle>>,
    pub tool_use_behavior: ToolUseBehavior,
    /// Clear a pinned tool choice after tools run, so a `required` choice
    /// cannot loop forever.
    pub reset_tool_choice: bool,
}

impl Agent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reset_tool_choice: true,
            ..Default::default()
        }
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(Instructions::Static(instructions.into()));
        self
    }

    /// Instructions resolved per turn from the run snapshot.
    pub fn instructions_fn<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(RunContext, Arc<Agent>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<String, RunError>> + Send + 'static,
    {
        let f = Arc::new(f);
        self.instructions = Some(Instructions::Dynamic(Arc::new(move |ctx, agent| {
            let f = Arc::clone(&f);
            Box::pin(async move { f(ctx, agent).await })
        })));
        self
    }

    pub fn handoff_description(mut self, description: impl Into<String>) -> Self {
        self.handoff_description = Some(description.into());
        self
    }

    pub fn model(mut self, name: impl Into<String>) -> Self {
        self.model = ModelRef::Named(name.into());
        self
    }

    pub fn model_instance(mut self, model: Arc<dyn Model>) -> Self {
        self.model = ModelRef::Instance(model);
        self
    }

    pub fn model_settings(mut self, settings: ModelSettings) -> Self {
        self.model_settings = settings;
        self
    }

    pub fn tool(mut self, tool: Tool) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn tools(mut self, tools: impl IntoIterator<Item = Tool>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn handoff(mut self, handoff: impl Into<Handoff>) -> Self {
        self.handoffs.push(handoff.into());
        self
    }

    pub fn handoffs(mut self, handoffs: impl IntoIterator<Item = Handoff>) -> Self {
        self.handoffs.extend(handoffs);
        self
    }

    pub fn input_guardrail(mut self, guardrail: InputGuardrail) -> Self {
        self.input_guardrails.push(guardrail);
        self
    }

    pub fn output_guardrail(mut self, guardrail: OutputGuardrail) -> Self {
        self.output_guardrails.push(guardrail);
        self
    }

    pub fn output_schema(mut self, schema: Arc<dyn OutputSchema>) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn mcp_server(mut self, server: Arc<McpServerHandle>) -> Self {
        self.mcp_servers.push(server);
        self
    }

    pub fn tool_use_behavior(mut self, behavior: ToolUseBehavior) -> Self {
        self.tool_use_behavior = behavior;
        self
    }

    pub fn reset_tool_choice(mut self, reset: bool) -> Self {
        self.reset_tool_choice = reset;
        self
    }

    /// Resolve this agent's instructions for the current turn.
    pub(crate) async fn resolve_instructions(
        self: &Arc<Self>,
        ctx: &RunContext,
    ) -> Result<Option<String>, RunError> {
        match &self.instructions {
            None => Ok(None),
            Some(Instructions::Static(s)) => Ok(Some(s.clone())),
            Some(Instructions::Dynamic(f)) => {
                Ok(Some(f(ctx.clone(), Arc::clone(self)).await?))
            }
        }
    }
}

impl fmt::Debug for dyn OutputSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OutputSchema({})", self.name())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
