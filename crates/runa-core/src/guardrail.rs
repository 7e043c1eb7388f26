// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use serde_json::Value;

use runa_model::ResponseItem;

use crate::{Agent, RunContext, RunError};

/// What a guardrail function reports back.
#[derive(Debug, Clone)]
pub struct GuardrailFunctionOutput {
    /// Free-form diagnostic payload, surfaced in the result.
    pub output_info: Value,
    /// When set, the run fails immediately with a tripwire error.
    pub tripwire_triggered: bool,
}

impl GuardrailFunctionOutput {
    pub fn pass(output_info: Value) -> Self {
        Self { output_info, tripwire_triggered: false }
    }

    pub fn tripwire(output_info: Value) -> Self {
        Self { output_info, tripwire_triggered: true }
    }
}

/// The outcome of one guardrail, embedded in tripwire errors and in the
/// run result.
#[derive(Debug, Clone)]
pub struct GuardrailResult {
    pub guardrail_name: String,
    pub agent_name: String,
    pub output: GuardrailFunctionOutput,
}

type InputGuardrailFn = Arc<
    dyn Fn(
            RunContext,
            Arc<Agent>,
            Vec<ResponseItem>,
        ) -> BoxFuture<'static, Result<GuardrailFunctionOutput, RunError>>
        + Send
        + Sync,
>;

type OutputGuardrailFn = Arc<
    dyn Fn(
            RunContext,
            Arc<Agent>,
            Value,
        ) -> BoxFuture<'static, Result<GuardrailFunctionOutput, RunError>>
        + Send
        + Sync,
>;

/// A check over the caller-supplied input items, run once per top-level
/// run in parallel with the first model call.
#[derive(Clone)]
pub struct InputGuardrail {
    pub name: String,
    func: InputGuardrailFn,
}

impl fmt::Debug for InputGuardrail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputGuardrail").field("name", &self.name).finish_non_exhaustive()
    }
}

impl InputGuardrail {
    pub fn new<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(RunContext, Arc<Agent>, Vec<ResponseItem>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<GuardrailFunctionOutput, RunError>> + Send + 'static,
    {
        let f = Arc::new(f);
        Self {
            name: name.into(),
            func: Arc::new(move |ctx, agent, input| {
                let f = Arc::clone(&f);
                Box::pin(async move { f(ctx, agent, input).await })
            }),
        }
    }
}

/// A check over the candidate final output, run once the agent produces
/// one.
#[derive(Clone)]
pub struct OutputGuardrail {
    pub name: String,
    func: OutputGuardrailFn,
}

impl fmt::Debug for OutputGuardrail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputGuardrail").field("name", &self.name).finish_non_exhaustive()
    }
}

impl OutputGuardrail {
    pub fn new<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(RunContext, Arc<Agent>, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<GuardrailFunctionOutput, RunError>> + Send + 'static,
    {
        let f = Arc::new(f);
        Self {
            name: name.into(),
            func: Arc::new(move |ctx, agent, output| {
                let f = Arc::clone(&f);
                Box::pin(async move { f(ctx, agent, output).await })
            }),
        }
    }
}

/// Run all input guardrails concurrently. The first tripwire (or function
/// error) drops the remaining checks and fails the run.
///
/// The checks are driven as inline futures rather than spawned tasks, so
/// a guardrail that trips without suspending resolves on the very first
/// poll — before a model call racing it can be issued.
pub(crate) async fn run_input_guardrails(
    guardrails: &[InputGuardrail],
    ctx: &RunContext,
    agent: &Arc<Agent>,
    input: &[ResponseItem],
) -> Result<Vec<GuardrailResult>, RunError> {
    let checks: FuturesUnordered<_> = guardrails
        .iter()
        .map(|g| {
            let name = g.name.clone();
            let func = Arc::clone(&g.func);
            let ctx = ctx.clone();
            let agent = Arc::clone(agent);
            let input = input.to_vec();
            async move {
                let out = func(ctx, agent, input).await;
                (name, out)
            }
        })
        .collect();
    collect_guardrails(checks, &agent.name, RunError::InputGuardrailTriggered).await
}

/// Run all output guardrails concurrently over the candidate output.
pub(crate) async fn run_output_guardrails(
    guardrails: &[OutputGuardrail],
    ctx: &RunContext,
    agent: &Arc<Agent>,
    output: &Value,
) -> Result<Vec<GuardrailResult>, RunError> {
    let checks: FuturesUnordered<_> = guardrails
        .iter()
        .map(|g| {
            let name = g.name.clone();
            let func = Arc::clone(&g.func);
            let ctx = ctx.clone();
            let agent = Arc::clone(agent);
            let output = output.clone();
            async move {
                let out = func(ctx, agent, output).await;
                (name, out)
            }
        })
        .collect();
    collect_guardrails(checks, &agent.name, RunError::OutputGuardrailTriggered).await
}

async fn collect_guardrails(
    mut checks: FuturesUnordered<
        impl std::future::Future<Output = (String, Result<GuardrailFunctionOutput, RunError>)>,
    >,
    agent_name: &str,
    trip: impl Fn(GuardrailResult) -> RunError,
) -> Result<Vec<GuardrailResult>, RunError> {
    let mut results = Vec::new();
    while let Some((name, outcome)) = checks.next().await {
        // A raising guardrail aborts the run with its own error, not a
        // tripwire; dropping `checks` cancels the outstanding ones.
        let output = outcome?;
        let result = GuardrailResult {
            guardrail_name: name,
            agent_name: agent_name.to_string(),
            output,
        };
        if result.output.tripwire_triggered {
            return Err(trip(result));
        }
        results.push(result);
    }
    Ok(results)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
