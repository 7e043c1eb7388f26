// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{json, Value};

use runa_model::{ResponseItem, ToolDefinition};

use crate::{Agent, RunContext, RunError, RunItem};

/// The conversation state a handoff input filter may rewrite before the
/// target agent takes over — for example, to hide prior tool traffic from
/// the new agent.
#[derive(Debug, Clone)]
pub struct HandoffInputData {
    /// The immutable original input of the run.
    pub input_history: Vec<ResponseItem>,
    /// Items generated in turns before the handoff turn.
    pub pre_handoff_items: Vec<RunItem>,
    /// Items generated in the handoff turn itself.
    pub new_items: Vec<RunItem>,
}

pub type HandoffInputFilter = Arc<dyn Fn(HandoffInputData) -> HandoffInputData + Send + Sync>;

/// Where a handoff leads: a direct reference, or a name resolved through
/// the run's agent registry (unknown names are a user error at invocation
/// time). Named targets are what make cyclic agent graphs constructible.
#[derive(Clone)]
pub enum HandoffTarget {
    Agent(Arc<Agent>),
    Named(String),
}

impl fmt::Debug for HandoffTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Agent(a) => f.debug_tuple("Agent").field(&a.name).finish(),
            Self::Named(n) => f.debug_tuple("Named").field(n).finish(),
        }
    }
}

impl HandoffTarget {
    /// The target's display name, resolvable without the registry.
    pub fn name(&self) -> &str {
        match self {
            Self::Agent(a) => &a.name,
            Self::Named(n) => n,
        }
    }
}

type OnInvokeHandoff = Arc<
    dyn Fn(RunContext, String, Arc<Agent>) -> BoxFuture<'static, Result<Arc<Agent>, RunError>>
        + Send
        + Sync,
>;

/// A delegation edge: appears to the model as a synthetic tool; invoking
/// it switches the current agent.
#[derive(Clone)]
pub struct Handoff {
    pub tool_name: String,
    pub tool_description: String,
    /// Argument schema enforced strictly when present; handoffs without
    /// one accept an empty object.
    pub input_json_schema: Option<Value>,
    pub target: HandoffTarget,
    pub input_filter: Option<HandoffInputFilter>,
    /// Hook invoked with the parsed arguments; may substitute the resolved
    /// target. Defaults to a pass-through.
    on_invoke: Option<OnInvokeHandoff>,
}

impl fmt::Debug for Handoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handoff")
            .field("tool_name", &self.tool_name)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl Handoff {
    pub fn new(agent: Arc<Agent>) -> Self {
        let tool_name = default_tool_name(&agent.name);
        let tool_description = default_tool_description(&agent);
        Self {
            tool_name,
            tool_description,
            input_json_schema: None,
            target: HandoffTarget::Agent(agent),
            input_filter: None,
            on_invoke: None,
        }
    }

    /// A handoff to an agent registered by name in the run config.
    pub fn to_named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            tool_name: default_tool_name(&name),
            tool_description: format!("Handoff to the {name} agent."),
            input_json_schema: None,
            target: HandoffTarget::Named(name),
            input_filter: None,
            on_invoke: None,
        }
    }

    pub fn with_tool_name(mut self, name: impl Into<String>) -> Self {
        self.tool_name = name.into();
        self
    }

    pub fn with_tool_description(mut self, description: impl Into<String>) -> Self {
        self.tool_description = description.into();
        self
    }

    pub fn with_input_json_schema(mut self, schema: Value) -> Self {
        self.input_json_schema = Some(schema);
        self
    }

    pub fn with_input_filter(mut self, filter: HandoffInputFilter) -> Self {
        self.input_filter = Some(filter);
        self
    }

    pub fn with_on_invoke<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(RunContext, String, Arc<Agent>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Arc<Agent>, RunError>> + Send + 'static,
    {
        let f = Arc::new(f);
        self.on_invoke = Some(Arc::new(move |ctx, args, target| {
            let f = Arc::clone(&f);
            Box::pin(async move { f(ctx, args, target).await })
        }));
        self
    }

    /// Run the invocation hook, defaulting to the resolved target.
    pub(crate) async fn invoke(
        &self,
        ctx: RunContext,
        args_json: String,
        resolved: Arc<Agent>,
    ) -> Result<Arc<Agent>, RunError> {
        match &self.on_invoke {
            Some(hook) => hook(ctx, args_json, resolved).await,
            None => Ok(resolved),
        }
    }

    /// The synthetic tool descriptor shown to the model.
    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition::Function {
            name: self.tool_name.clone(),
            description: self.tool_description.clone(),
            parameters: self.input_json_schema.clone().unwrap_or_else(|| {
                json!({
                    "type": "object",
                    "properties": {},
                    "additionalProperties": false
                })
            }),
            strict: true,
        }
    }
}

impl From<Arc<Agent>> for Handoff {
    fn from(agent: Arc<Agent>) -> Self {
        Handoff::new(agent)
    }
}

impl From<Agent> for Handoff {
    fn from(agent: Agent) -> Self {
        Handoff::new(Arc::new(agent))
    }
}

/// `handoff_to_<agent_name>`, with whitespace flattened so the result is a
/// valid tool identifier.
pub(crate) fn default_tool_name(agent_name: &str) -> String {
    let safe: String = agent_name
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    format!("handoff_to_{safe}")
}

fn default_tool_description(agent: &Agent) -> String {
    match &agent.handoff_description {
        Some(desc) => format!("Handoff to the {} agent. {desc}", agent.name),
        None => format!("Handoff to the {} agent.", agent.name),
    }
}

/// The payload of a handoff-output item.
pub(crate) fn default_handoff_output(target_name: &str) -> String {
    json!({ "assistant": target_name }).to_string()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
