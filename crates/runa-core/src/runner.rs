// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info_span, warn, Instrument, Span};

use runa_mcp_client::mcp_function_tools;
use runa_model::{
    default_model_provider, Model, ModelProvider, ModelRequest, ModelResponse, ModelSettings,
    OutputSchemaDef, ResponseItem, StreamEvent, ToolChoice,
};
use runa_tools::{FunctionTool, Tool, ToolError, ToolRegistry};

use crate::guardrail::{run_input_guardrails, run_output_guardrails};
use crate::handoff::{default_handoff_output, Handoff, HandoffInputData, HandoffTarget};
use crate::{
    Agent, EventQueue, GuardrailResult, InputGuardrail, ModelRef, NoopRunHooks, OutputGuardrail,
    RunContext, RunError, RunEvent, RunHooks, RunItem, RunResult, Session, ToolCallSummary,
};

pub const DEFAULT_MAX_TURNS: u32 = 10;

/// Caller input: a plain string becomes a single user message.
#[derive(Debug, Clone)]
pub enum RunInput {
    Text(String),
    Items(Vec<ResponseItem>),
}

impl RunInput {
    pub fn into_items(self) -> Vec<ResponseItem> {
        match self {
            RunInput::Text(text) => vec![ResponseItem::user_message(text)],
            RunInput::Items(items) => items,
        }
    }
}

impl From<&str> for RunInput {
    fn from(s: &str) -> Self {
        RunInput::Text(s.to_string())
    }
}

impl From<String> for RunInput {
    fn from(s: String) -> Self {
        RunInput::Text(s)
    }
}

impl From<Vec<ResponseItem>> for RunInput {
    fn from(items: Vec<ResponseItem>) -> Self {
        RunInput::Items(items)
    }
}

/// Run-level configuration, overriding agent-level settings where both
/// exist.
#[derive(Clone, Default)]
pub struct RunConfig {
    /// Model-call ceiling per run; 0 falls back to [`DEFAULT_MAX_TURNS`].
    pub max_turns: u32,
    pub tracing_disabled: bool,
    pub trace_metadata: HashMap<String, String>,
    pub group_id: Option<String>,
    pub workflow_name: Option<String>,
    pub session: Option<Arc<dyn Session>>,
    /// How much session history to prepend; `None` means all of it.
    pub session_history_limit: Option<usize>,
    pub model_provider: Option<Arc<dyn ModelProvider>>,
    /// Merged over the agent's settings, field by field.
    pub model_settings: Option<ModelSettings>,
    pub previous_response_id: Option<String>,
    pub hooks: Option<Arc<dyn RunHooks>>,
    /// Run once per run, in addition to the starting agent's own.
    pub input_guardrails: Vec<InputGuardrail>,
    pub output_guardrails: Vec<OutputGuardrail>,
    /// Registry for handoff targets referenced by name.
    pub agents: HashMap<String, Arc<Agent>>,
    /// The caller's cancellation signal; the run derives a child token.
    pub cancel: Option<CancellationToken>,
}

impl RunConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_session(mut self, session: Arc<dyn Session>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_session_history_limit(mut self, limit: usize) -> Self {
        self.session_history_limit = Some(limit);
        self
    }

    pub fn with_model_provider(mut self, provider: Arc<dyn ModelProvider>) -> Self {
        self.model_provider = Some(provider);
        self
    }

    pub fn with_model_settings(mut self, settings: ModelSettings) -> Self {
        self.model_settings = Some(settings);
        self
    }

    pub fn with_previous_response_id(mut self, id: impl Into<String>) -> Self {
        self.previous_response_id = Some(id.into());
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn RunHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn with_input_guardrail(mut self, guardrail: InputGuardrail) -> Self {
        self.input_guardrails.push(guardrail);
        self
    }

    pub fn with_output_guardrail(mut self, guardrail: OutputGuardrail) -> Self {
        self.output_guardrails.push(guardrail);
        self
    }

    /// Register an agent as a named handoff target.
    pub fn register_agent(mut self, agent: Arc<Agent>) -> Self {
        self.agents.insert(agent.name.clone(), agent);
        self
    }

    pub fn with_workflow_name(mut self, name: impl Into<String>) -> Self {
        self.workflow_name = Some(name.into());
        self
    }

    pub fn with_group_id(mut self, id: impl Into<String>) -> Self {
        self.group_id = Some(id.into());
        self
    }

    pub fn with_trace_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.trace_metadata = metadata;
        self
    }

    pub fn with_tracing_disabled(mut self, disabled: bool) -> Self {
        self.tracing_disabled = disabled;
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn effective_max_turns(&self) -> u32 {
        if self.max_turns == 0 {
            DEFAULT_MAX_TURNS
        } else {
            self.max_turns
        }
    }
}

/// Drives agents through the turn loop.
#[derive(Default)]
pub struct Runner {
    pub config: RunConfig,
}

impl Runner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: RunConfig) -> Self {
        Self { config }
    }

    /// Run to completion and return the final result.
    pub async fn run(
        &self,
        agent: Arc<Agent>,
        input: impl Into<RunInput>,
    ) -> Result<RunResult, RunError> {
        let mut state = RunState::new(self.config.clone(), agent, input.into(), None);
        let span = state.span(|| {
            info_span!(
                "agent_run",
                agent = %state.current_agent.name,
                workflow = state.config.workflow_name.as_deref().unwrap_or("agent run"),
            )
        });
        state.run_loop().instrument(span).await
    }
}

/// Run `agent` with the default configuration.
pub async fn run(agent: Arc<Agent>, input: impl Into<RunInput>) -> Result<RunResult, RunError> {
    Runner::new().run(agent, input).await
}

// ─── Per-run state ───────────────────────────────────────────────────────────

/// Classified output of one model response.
struct ProcessedResponse {
    tool_runs: Vec<ToolRun>,
    handoff_runs: Vec<HandoffRun>,
    /// Text of each assistant message, in emission order.
    message_texts: Vec<String>,
}

struct ToolRun {
    tool: FunctionTool,
    call_id: String,
    arguments: String,
}

struct HandoffRun {
    handoff: Handoff,
    call_id: String,
    arguments: String,
}

/// Everything mutable that accumulates during one run. The runner is the
/// sole writer; spawned tasks feed results back through their join values
/// and the state applies them single-threaded, which is what keeps the
/// ordering guarantees without locks on per-run state.
pub(crate) struct RunState {
    pub(crate) config: RunConfig,
    pub(crate) current_agent: Arc<Agent>,
    original_input: Vec<ResponseItem>,
    session_prefix: Vec<ResponseItem>,
    new_items: Vec<RunItem>,
    raw_responses: Vec<ModelResponse>,
    ctx: RunContext,
    hooks: Arc<dyn RunHooks>,
    last_response_id: Option<String>,
    input_guardrail_results: Vec<GuardrailResult>,
    emitter: Option<EventQueue<RunEvent>>,
    /// Set once a pinned tool choice has served its purpose.
    clear_tool_choice: bool,
}

impl RunState {
    pub(crate) fn new(
        config: RunConfig,
        agent: Arc<Agent>,
        input: RunInput,
        emitter: Option<EventQueue<RunEvent>>,
    ) -> Self {
        let cancel = config
            .cancel
            .as_ref()
            .map(CancellationToken::child_token)
            .unwrap_or_default();
        let ctx = RunContext::new(cancel, config.trace_metadata.clone());
        let hooks = config
            .hooks
            .clone()
            .unwrap_or_else(|| Arc::new(NoopRunHooks));
        Self {
            config,
            current_agent: agent,
            original_input: input.into_items(),
            session_prefix: Vec::new(),
            new_items: Vec::new(),
            raw_responses: Vec::new(),
            ctx,
            hooks,
            last_response_id: None,
            input_guardrail_results: Vec::new(),
            emitter,
            clear_tool_choice: false,
        }
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.ctx.cancel.clone()
    }

    pub(crate) fn span(&self, f: impl FnOnce() -> Span) -> Span {
        if self.config.tracing_disabled {
            Span::none()
        } else {
            f()
        }
    }

    fn emit(&self, event: RunEvent) {
        if let Some(emitter) = &self.emitter {
            emitter.put(event);
        }
    }

    /// Append one run item and emit its stream event; the only code path
    /// that grows `new_items`.
    fn append(&mut self, item: RunItem) {
        let name = item.kind_name();
        self.new_items.push(item.clone());
        self.emit(RunEvent::RunItem { item, name });
    }

    fn provider(&self) -> Arc<dyn ModelProvider> {
        self.config
            .model_provider
            .clone()
            .unwrap_or_else(default_model_provider)
    }

    fn resolve_model(&self) -> Result<Arc<dyn Model>, RunError> {
        match &self.current_agent.model {
            ModelRef::Instance(model) => Ok(Arc::clone(model)),
            ModelRef::Named(name) => Ok(self.provider().get_model(Some(name))?),
            ModelRef::Default => Ok(self.provider().get_model(None)?),
        }
    }

    fn build_model_input(&self) -> Vec<ResponseItem> {
        let mut input = self.session_prefix.clone();
        input.extend(self.original_input.iter().cloned());
        input.extend(self.new_items.iter().map(|i| i.raw().clone()));
        input
    }

    fn effective_settings(&self, agent: &Agent) -> ModelSettings {
        let mut settings = match &self.config.model_settings {
            Some(overlay) => agent.model_settings.resolve(overlay),
            None => agent.model_settings.clone(),
        };
        if self.clear_tool_choice {
            settings.tool_choice = None;
        }
        settings
    }

    /// The turn state machine.
    pub(crate) async fn run_loop(&mut self) -> Result<RunResult, RunError> {
        // Load the session prefix once, before the first turn.
        if let Some(session) = self.config.session.clone() {
            self.session_prefix = session.get_items(self.config.session_history_limit).await?;
        }

        let starting_agent = Arc::clone(&self.current_agent);
        self.emit(RunEvent::AgentUpdated { new_agent: Arc::clone(&starting_agent) });
        self.hooks.on_agent_start(&self.ctx, &starting_agent).await?;

        // Input guardrails: the run-level ones plus the starting agent's,
        // over the caller-supplied input only (never session history).
        let input_guardrails: Vec<InputGuardrail> = self
            .config
            .input_guardrails
            .iter()
            .chain(starting_agent.input_guardrails.iter())
            .cloned()
            .collect();
        let mut first_turn = true;

        let max_turns = self.config.effective_max_turns();
        loop {
            if self.ctx.is_cancelled() {
                return Err(RunError::Cancelled);
            }
            let turn = self.ctx.advance_turn();
            if turn > max_turns {
                return Err(RunError::MaxTurnsExceeded(max_turns));
            }

            let agent = Arc::clone(&self.current_agent);
            let model = self.resolve_model()?;
            let (request, registry) = self.build_request(&agent).await?;

            self.hooks.on_llm_start(&self.ctx, &agent, &request).await?;
            let response = if first_turn && !input_guardrails.is_empty() {
                self.model_call_racing_guardrails(&model, request, &input_guardrails, &agent)
                    .await?
            } else {
                self.call_model(&model, request).await?
            };
            first_turn = false;
            self.hooks.on_llm_end(&self.ctx, &agent, &response).await?;

            self.ctx.usage.add(&response.usage);
            if response.response_id.is_some() {
                self.last_response_id = response.response_id.clone();
            }
            self.raw_responses.push(response.clone());

            let turn_start = self.new_items.len();
            let processed = self.process_response(&agent, &registry, &response)?;

            if !processed.handoff_runs.is_empty() {
                self.execute_handoff(&agent, processed, turn_start).await?;
                continue;
            }

            if !processed.tool_runs.is_empty() {
                let summaries = self.execute_tools(&agent, &processed.tool_runs).await?;
                let decision = agent
                    .tool_use_behavior
                    .apply(self.ctx.clone(), &summaries)
                    .await?;
                if decision.is_final {
                    let candidate = decision.final_output.unwrap_or(Value::Null);
                    return self.finalize(&agent, candidate).await;
                }
                self.maybe_clear_tool_choice(&agent);
                continue;
            }

            // Only messages (and passive items): evaluate the candidate.
            let candidate = self.candidate_from_messages(&agent, &processed)?;
            return self.finalize(&agent, candidate).await;
        }
    }

    /// Resolve instructions, assemble the turn's tools (agent tools plus
    /// remote-server tools, enablement applied), and build the request.
    async fn build_request(
        &self,
        agent: &Arc<Agent>,
    ) -> Result<(ModelRequest, ToolRegistry), RunError> {
        let instructions = agent.resolve_instructions(&self.ctx).await?;

        let tool_ctx = self.ctx.tool_context(&agent.name);
        let mut turn_tools = agent.tools.clone();
        for server in &agent.mcp_servers {
            turn_tools.extend(mcp_function_tools(server, &agent.name).await?);
        }
        let registry = ToolRegistry::build(turn_tools, &tool_ctx)
            .map_err(|e| RunError::User(e.to_string()))?;
        let mut tools = registry.definitions();
        for handoff in &agent.handoffs {
            tools.push(handoff.to_definition());
        }

        let output_schema = agent
            .output_schema
            .as_ref()
            .filter(|s| !s.is_plain_text())
            .map(|s| OutputSchemaDef {
                name: s.name().to_string(),
                strict: s.is_strict_json_schema(),
                schema: s.json_schema(),
            });

        let request = ModelRequest {
            system_instructions: instructions,
            input: self.build_model_input(),
            tools,
            settings: self.effective_settings(agent),
            output_schema,
            previous_response_id: self
                .last_response_id
                .clone()
                .or_else(|| self.config.previous_response_id.clone()),
            tracing_enabled: !self.config.tracing_disabled,
        };
        Ok((request, registry))
    }

    /// One model call, streaming raw events through the emitter when the
    /// run is streamed. Honors cancellation at every event boundary.
    async fn call_model(
        &self,
        model: &Arc<dyn Model>,
        request: ModelRequest,
    ) -> Result<ModelResponse, RunError> {
        let span = self.span(|| info_span!("generation", model = %model.name()));
        if self.emitter.is_some() {
            let mut stream = model
                .stream_response(request)
                .instrument(span.clone())
                .await
                .map_err(RunError::from)?;
            let mut completed: Option<ModelResponse> = None;
            loop {
                let next = tokio::select! {
                    biased;
                    _ = self.ctx.cancel.cancelled() => return Err(RunError::Cancelled),
                    ev = stream.next() => ev,
                };
                let Some(event) = next else { break };
                let event = event.map_err(RunError::from)?;
                if let StreamEvent::Completed { response } = &event {
                    completed = Some(response.clone());
                }
                self.emit(RunEvent::RawResponses { event });
            }
            completed.ok_or_else(|| RunError::from(runa_model::ModelError::IncompleteStream))
        } else {
            tokio::select! {
                biased;
                _ = self.ctx.cancel.cancelled() => Err(RunError::Cancelled),
                res = model.get_response(request).instrument(span) => res.map_err(RunError::from),
            }
        }
    }

    /// First-turn model call with the input guardrails racing it.
    ///
    /// The guardrails are polled first (biased), so a check that trips
    /// without suspending fails the run before the model is ever called;
    /// a tripwire arriving while the model is in flight drops the model
    /// future at the next event boundary.
    async fn model_call_racing_guardrails(
        &mut self,
        model: &Arc<dyn Model>,
        request: ModelRequest,
        guardrails: &[InputGuardrail],
        agent: &Arc<Agent>,
    ) -> Result<ModelResponse, RunError> {
        let span = self.span(|| info_span!("guardrails", agent = %agent.name, kind = "input"));
        let g_ctx = self.ctx.clone();
        let g_agent = Arc::clone(agent);
        let g_input = self.original_input.clone();
        let g_list = guardrails.to_vec();
        let guard_fut =
            async move { run_input_guardrails(&g_list, &g_ctx, &g_agent, &g_input).await }
                .instrument(span);
        tokio::pin!(guard_fut);

        let mut results: Option<Vec<GuardrailResult>> = None;
        let response = {
            let model_fut = self.call_model(model, request);
            tokio::pin!(model_fut);
            loop {
                tokio::select! {
                    biased;
                    outcome = &mut guard_fut, if results.is_none() => {
                        results = Some(outcome?);
                    }
                    res = &mut model_fut => break res?,
                }
            }
        };

        // The model can finish first; the guardrails still have to come
        // back clean before the output is accepted.
        let results = match results {
            Some(r) => r,
            None => guard_fut.await?,
        };
        self.input_guardrail_results = results;
        Ok(response)
    }

    /// Partition a model response and append every item in emission order.
    fn process_response(
        &mut self,
        agent: &Arc<Agent>,
        registry: &ToolRegistry,
        response: &ModelResponse,
    ) -> Result<ProcessedResponse, RunError> {
        let mut processed = ProcessedResponse {
            tool_runs: Vec::new(),
            handoff_runs: Vec::new(),
            message_texts: Vec::new(),
        };
        let agent_name = agent.name.clone();

        for item in &response.output {
            let raw = item.clone();
            match item {
                ResponseItem::Message { .. } => {
                    if let Some(text) = item.message_text() {
                        processed.message_texts.push(text);
                    }
                    self.append(RunItem::MessageOutput { agent: agent_name.clone(), raw });
                }
                ResponseItem::Reasoning { .. } => {
                    self.append(RunItem::Reasoning { agent: agent_name.clone(), raw });
                }
                ResponseItem::HostedToolCall { .. } => {
                    // Executed by the backend; recorded verbatim.
                    self.append(RunItem::ToolCall { agent: agent_name.clone(), raw });
                }
                ResponseItem::McpApprovalRequest { .. } => {
                    self.append(RunItem::McpApprovalRequest { agent: agent_name.clone(), raw });
                }
                ResponseItem::McpListTools { .. } => {
                    self.append(RunItem::McpListTools { agent: agent_name.clone(), raw });
                }
                ResponseItem::McpApprovalResponse { .. } => {
                    self.append(RunItem::McpApprovalResponse { agent: agent_name.clone(), raw });
                }
                ResponseItem::FunctionCall { call_id, name, arguments, .. } => {
                    if let Some(handoff) = agent.handoffs.iter().find(|h| h.tool_name == *name) {
                        processed.handoff_runs.push(HandoffRun {
                            handoff: handoff.clone(),
                            call_id: call_id.clone(),
                            arguments: arguments.clone(),
                        });
                        self.append(RunItem::HandoffCall { agent: agent_name.clone(), raw });
                        continue;
                    }
                    let tool = match registry.get(name) {
                        Some(Tool::Function(f)) => f.clone(),
                        _ => {
                            return Err(RunError::ModelBehavior(format!(
                                "model called nonexistent tool '{name}'"
                            )));
                        }
                    };
                    processed.tool_runs.push(ToolRun {
                        tool,
                        call_id: call_id.clone(),
                        arguments: arguments.clone(),
                    });
                    self.append(RunItem::ToolCall { agent: agent_name.clone(), raw });
                }
                ResponseItem::FunctionCallOutput { call_id, .. } => {
                    warn!(call_id = %call_id, "model emitted a function_call_output item; dropped");
                }
            }
        }
        Ok(processed)
    }

    /// Execute a turn's tool calls concurrently, appending outputs in the
    /// order the model issued the calls.
    async fn execute_tools(
        &mut self,
        agent: &Arc<Agent>,
        runs: &[ToolRun],
    ) -> Result<Vec<ToolCallSummary>, RunError> {
        for run in runs {
            self.hooks
                .on_tool_start(&self.ctx, agent, &run.tool.name)
                .await?;
        }

        // Phase 1: spawn every call as its own task.
        let mut tasks = Vec::with_capacity(runs.len());
        for run in runs {
            let tool = run.tool.clone();
            let tool_ctx = self.ctx.tool_context(&agent.name);
            let cancel = self.ctx.cancel.clone();
            let args = run.arguments.clone();
            let span = self.span(|| info_span!("function_call", tool = %tool.name));
            tasks.push(tokio::spawn(
                async move {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Err(ToolError::Failure("cancelled".into())),
                        res = tool.invoke(tool_ctx, args) => res,
                    }
                }
                .instrument(span),
            ));
        }

        // Phase 2: await in call order; each output is appended atomically
        // after its task completes, so outputs never interleave.
        let mut summaries = Vec::with_capacity(runs.len());
        for (run, task) in runs.iter().zip(tasks) {
            let outcome = task.await;
            if self.ctx.is_cancelled() {
                return Err(RunError::Cancelled);
            }
            let output = match outcome {
                Ok(Ok(value)) => value,
                Ok(Err(ToolError::Fatal(source))) => {
                    return Err(RunError::Tool { tool: run.tool.name.clone(), source });
                }
                Ok(Err(ToolError::BadArguments(msg))) => {
                    return Err(RunError::ModelBehavior(format!(
                        "invalid arguments for tool '{}': {msg}",
                        run.tool.name
                    )));
                }
                Ok(Err(ToolError::Failure(msg))) => {
                    warn!(tool = %run.tool.name, error = %msg, "tool reported a failure");
                    json!({ "error": msg })
                }
                Err(join_err) => {
                    warn!(tool = %run.tool.name, error = %join_err, "tool task panicked");
                    json!({ "error": format!("tool panicked: {join_err}") })
                }
            };

            let wire_output = match &output {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            self.append(RunItem::ToolCallOutput {
                agent: agent.name.clone(),
                raw: ResponseItem::function_call_output(&run.call_id, wire_output),
                output: output.clone(),
            });
            self.hooks
                .on_tool_end(&self.ctx, agent, &run.tool.name, &output)
                .await?;
            summaries.push(ToolCallSummary {
                tool_name: run.tool.name.clone(),
                call_id: run.call_id.clone(),
                output,
            });
        }
        Ok(summaries)
    }

    fn maybe_clear_tool_choice(&mut self, agent: &Arc<Agent>) {
        if !agent.reset_tool_choice {
            return;
        }
        let pinned = matches!(
            self.effective_settings(agent).tool_choice,
            Some(ToolChoice::Required) | Some(ToolChoice::Named(_))
        );
        if pinned {
            self.clear_tool_choice = true;
        }
    }

    /// Execute the turn's first handoff; later handoffs and any co-emitted
    /// tool calls are skipped with a synthesized output, so no call is
    /// left unresolved at the turn boundary.
    async fn execute_handoff(
        &mut self,
        agent: &Arc<Agent>,
        processed: ProcessedResponse,
        turn_start: usize,
    ) -> Result<(), RunError> {
        let mut handoffs = processed.handoff_runs.into_iter();
        let first = handoffs.next().expect("caller checked non-empty");

        for extra in handoffs {
            warn!(
                tool = %extra.handoff.tool_name,
                "multiple handoffs in one turn; skipping all but the first"
            );
            self.append(RunItem::HandoffOutput {
                agent: agent.name.clone(),
                raw: ResponseItem::function_call_output(
                    &extra.call_id,
                    json!({ "error": "skipped: another handoff was executed this turn" })
                        .to_string(),
                ),
                source_agent: agent.name.clone(),
                target_agent: extra.handoff.target.name().to_string(),
            });
        }
        for skipped in &processed.tool_runs {
            warn!(
                tool = %skipped.tool.name,
                "tool call emitted alongside a handoff; handoff takes precedence"
            );
            self.append(RunItem::ToolCallOutput {
                agent: agent.name.clone(),
                raw: ResponseItem::function_call_output(
                    &skipped.call_id,
                    json!({ "error": "skipped: a handoff was executed this turn" }).to_string(),
                ),
                output: Value::Null,
            });
        }

        // Strict argument parse when the handoff declares a schema.
        if first.handoff.input_json_schema.is_some() && !first.arguments.trim().is_empty() {
            let _: Value = serde_json::from_str(&first.arguments).map_err(|e| {
                RunError::ModelBehavior(format!(
                    "invalid handoff arguments for '{}': {e}",
                    first.handoff.tool_name
                ))
            })?;
        }

        let resolved = match &first.handoff.target {
            HandoffTarget::Agent(a) => Arc::clone(a),
            HandoffTarget::Named(name) => self
                .config
                .agents
                .get(name)
                .cloned()
                .ok_or_else(|| RunError::User(format!("unknown agent in handoff: {name}")))?,
        };
        let span = self.span(|| info_span!("handoff", from = %agent.name, to = %resolved.name));
        let target = first
            .handoff
            .invoke(self.ctx.clone(), first.arguments.clone(), resolved)
            .instrument(span)
            .await?;

        // The filter may rewrite what the target agent gets to see.
        if let Some(filter) = &first.handoff.input_filter {
            let mut items = std::mem::take(&mut self.new_items);
            let turn_items = items.split_off(turn_start);
            let data = filter(HandoffInputData {
                input_history: std::mem::take(&mut self.original_input),
                pre_handoff_items: items,
                new_items: turn_items,
            });
            self.original_input = data.input_history;
            self.new_items = data.pre_handoff_items;
            self.new_items.extend(data.new_items);
        }

        self.append(RunItem::HandoffOutput {
            agent: agent.name.clone(),
            raw: ResponseItem::function_call_output(
                &first.call_id,
                default_handoff_output(&target.name),
            ),
            source_agent: agent.name.clone(),
            target_agent: target.name.clone(),
        });
        self.hooks.on_handoff(&self.ctx, agent, &target).await?;

        if agent.reset_tool_choice {
            self.clear_tool_choice = true;
        }
        self.current_agent = Arc::clone(&target);
        self.emit(RunEvent::AgentUpdated { new_agent: Arc::clone(&target) });
        self.hooks.on_agent_start(&self.ctx, &target).await?;
        Ok(())
    }

    /// Derive the candidate final output from a message-only turn.
    fn candidate_from_messages(
        &self,
        agent: &Arc<Agent>,
        processed: &ProcessedResponse,
    ) -> Result<Value, RunError> {
        match &agent.output_schema {
            Some(schema) if !schema.is_plain_text() => {
                // The first completed text output is the structured payload.
                let raw = processed.message_texts.first().ok_or_else(|| {
                    RunError::ModelBehavior("model produced no final output".into())
                })?;
                schema.validate_json(raw)
            }
            _ => {
                if processed.message_texts.is_empty() {
                    return Err(RunError::ModelBehavior(
                        "model produced no final output".into(),
                    ));
                }
                Ok(Value::String(processed.message_texts.concat()))
            }
        }
    }

    /// Output guardrails, session append, terminal hook and event.
    async fn finalize(
        &mut self,
        agent: &Arc<Agent>,
        candidate: Value,
    ) -> Result<RunResult, RunError> {
        let output_guardrails: Vec<OutputGuardrail> = self
            .config
            .output_guardrails
            .iter()
            .chain(agent.output_guardrails.iter())
            .cloned()
            .collect();
        let span = self.span(|| info_span!("guardrails", agent = %agent.name, kind = "output"));
        // A tripwire returns here, before anything is persisted: items from
        // a tripped turn never reach the session.
        let output_guardrail_results =
            run_output_guardrails(&output_guardrails, &self.ctx, agent, &candidate)
                .instrument(span)
                .await?;

        if let Some(session) = self.config.session.clone() {
            let mut to_store = self.original_input.clone();
            to_store.extend(self.new_items.iter().map(|i| i.raw().clone()));
            session.add_items(to_store).await?;
        }

        self.hooks.on_agent_end(&self.ctx, agent, &candidate).await?;
        self.emit(RunEvent::Done);

        Ok(RunResult {
            input: std::mem::take(&mut self.original_input),
            new_items: std::mem::take(&mut self.new_items),
            raw_responses: std::mem::take(&mut self.raw_responses),
            final_output: candidate,
            last_agent: Arc::clone(agent),
            usage: self.ctx.usage.snapshot(),
            last_response_id: self.last_response_id.take(),
            input_guardrail_results: std::mem::take(&mut self.input_guardrail_results),
            output_guardrail_results,
        })
    }
}
