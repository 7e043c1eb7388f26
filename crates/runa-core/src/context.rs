// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use runa_model::UsageRef;
use runa_tools::ToolContext;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// The view of a run handed to tools, guardrails, instruction callbacks
/// and hooks.
///
/// Clones share the run's state: usage totals are live, the turn counter
/// advances as the loop progresses, and the cancellation token is a child
/// of the caller's. Only the runner mutates the run; everyone else reads.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub usage: UsageRef,
    turn: Arc<AtomicU32>,
    pub cancel: CancellationToken,
    pub metadata: Arc<HashMap<String, String>>,
}

impl RunContext {
    pub fn new(cancel: CancellationToken, metadata: HashMap<String, String>) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            usage: UsageRef::new(),
            turn: Arc::new(AtomicU32::new(0)),
            cancel,
            metadata: Arc::new(metadata),
        }
    }

    /// The turn currently executing (1-based; 0 before the first turn).
    pub fn current_turn(&self) -> u32 {
        self.turn.load(Ordering::SeqCst)
    }

    pub(crate) fn advance_turn(&self) -> u32 {
        self.turn.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The reduced view handed to tool invokers.
    pub fn tool_context(&self, agent_name: &str) -> ToolContext {
        ToolContext {
            agent_name: agent_name.to_string(),
            usage: self.usage.clone(),
            turn: self.current_turn(),
            cancel: self.cancel.clone(),
            metadata: Arc::clone(&self.metadata),
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new(CancellationToken::new(), HashMap::new())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_turn_counter() {
        let ctx = RunContext::default();
        let clone = ctx.clone();
        ctx.advance_turn();
        assert_eq!(clone.current_turn(), 1);
    }

    #[test]
    fn tool_context_carries_the_current_turn() {
        let ctx = RunContext::default();
        ctx.advance_turn();
        ctx.advance_turn();
        let tc = ctx.tool_context("billing");
        assert_eq!(tc.turn, 2);
        assert_eq!(tc.agent_name, "billing");
    }

    #[test]
    fn run_ids_are_unique() {
        assert_ne!(RunContext::default().run_id, RunContext::default().run_id);
    }
}
