// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use runa_model::StreamEvent;

use crate::{Agent, RunItem};

/// Events observed by streaming consumers, in causal order within a run.
///
/// The stream terminates with `Done` on success, or `Error` when the run
/// fails (the typed error is available from the stream handle).
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// Pass-through of a low-level model event.
    RawResponses { event: StreamEvent },
    /// A newly appended run item.
    RunItem {
        item: RunItem,
        /// Sub-kind string, e.g. `"tool_call_item"`.
        name: &'static str,
    },
    /// The current agent changed (run start and every handoff).
    AgentUpdated { new_agent: Arc<Agent> },
    /// Terminal: the run failed. Carries the display form of the error.
    Error { message: String },
    /// Terminal: the run completed.
    Done,
}

impl RunEvent {
    /// The stable kind string of the stream-event ABI.
    pub fn kind(&self) -> &'static str {
        match self {
            RunEvent::RawResponses { .. } => "raw_responses",
            RunEvent::RunItem { .. } => "run_item",
            RunEvent::AgentUpdated { .. } => "agent_updated",
            RunEvent::Error { .. } => "error",
            RunEvent::Done => "done",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunEvent::Error { .. } | RunEvent::Done)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
