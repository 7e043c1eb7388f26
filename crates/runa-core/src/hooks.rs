// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::Value;

use runa_model::{ModelRequest, ModelResponse};

use crate::{Agent, RunContext, RunError};

/// Lifecycle callbacks invoked by the runner at every boundary.
///
/// Every callback may return an error, which aborts the run with that
/// error. The default implementations are no-ops, so implementors override
/// only the points they care about.
#[async_trait]
pub trait RunHooks: Send + Sync {
    /// The agent became current: at run start and after every handoff.
    async fn on_agent_start(&self, _ctx: &RunContext, _agent: &Agent) -> Result<(), RunError> {
        Ok(())
    }

    /// The run finished with a final output.
    async fn on_agent_end(
        &self,
        _ctx: &RunContext,
        _agent: &Agent,
        _output: &Value,
    ) -> Result<(), RunError> {
        Ok(())
    }

    async fn on_llm_start(
        &self,
        _ctx: &RunContext,
        _agent: &Agent,
        _request: &ModelRequest,
    ) -> Result<(), RunError> {
        Ok(())
    }

    async fn on_llm_end(
        &self,
        _ctx: &RunContext,
        _agent: &Agent,
        _response: &ModelResponse,
    ) -> Result<(), RunError> {
        Ok(())
    }

    async fn on_tool_start(
        &self,
        _ctx: &RunContext,
        _agent: &Agent,
        _tool_name: &str,
    ) -> Result<(), RunError> {
        Ok(())
    }

    async fn on_tool_end(
        &self,
        _ctx: &RunContext,
        _agent: &Agent,
        _tool_name: &str,
        _output: &Value,
    ) -> Result<(), RunError> {
        Ok(())
    }

    async fn on_handoff(
        &self,
        _ctx: &RunContext,
        _from: &Agent,
        _to: &Agent,
    ) -> Result<(), RunError> {
        Ok(())
    }
}

/// The hooks used when none are configured.
pub struct NoopRunHooks;

#[async_trait]
impl RunHooks for NoopRunHooks {}
