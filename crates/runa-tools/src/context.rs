// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Arc;

use runa_model::UsageRef;
use tokio_util::sync::CancellationToken;

/// The view of a run that a tool invocation (or an enablement predicate)
/// is allowed to see.
///
/// Cloning is cheap; all fields share the run's state. The cancellation
/// token is the run's own child token — long-running tools should check it
/// cooperatively.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Name of the agent the tool is attached to for this turn.
    pub agent_name: String,
    /// The run's usage totals so far (live, guarded).
    pub usage: UsageRef,
    /// The turn number the call was issued in (1-based).
    pub turn: u32,
    pub cancel: CancellationToken,
    /// Free-form run metadata (trace metadata from the run config).
    pub metadata: Arc<HashMap<String, String>>,
}

impl ToolContext {
    pub fn new(agent_name: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            usage: UsageRef::new(),
            turn: 0,
            cancel: CancellationToken::new(),
            metadata: Arc::new(HashMap::new()),
        }
    }
}

impl Default for ToolContext {
    fn default() -> Self {
        Self::new("")
    }
}
