// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info_span, Instrument};

use crate::runner::RunState;
use crate::{Agent, EventQueue, RunError, RunEvent, RunInput, RunResult, Runner};

/// Handle to a streamed run.
///
/// Events arrive in causal order while the run executes in a background
/// task; the final result becomes available once the stream has closed.
pub struct RunStream {
    queue: EventQueue<RunEvent>,
    cancel: CancellationToken,
    handle: JoinHandle<Result<RunResult, RunError>>,
}

impl Runner {
    /// Start the run and return immediately with a streaming handle.
    pub fn run_streamed(&self, agent: Arc<Agent>, input: impl Into<RunInput>) -> RunStream {
        let queue = EventQueue::new();
        let mut state = RunState::new(
            self.config.clone(),
            agent,
            input.into(),
            Some(queue.clone()),
        );
        let cancel = state.cancel_token();
        let span = state.span(|| {
            info_span!(
                "agent_run",
                agent = %state.current_agent.name,
                workflow = state.config.workflow_name.as_deref().unwrap_or("agent run"),
            )
        });
        let terminal = queue.clone();
        let handle = tokio::spawn(async move {
            let result = state.run_loop().instrument(span).await;
            if let Err(e) = &result {
                terminal.put(RunEvent::Error { message: e.to_string() });
            }
            terminal.close().await;
            result
        });
        RunStream { queue, cancel, handle }
    }
}

/// Start `agent` streamed, with the default configuration.
pub fn run_streamed(agent: Arc<Agent>, input: impl Into<RunInput>) -> RunStream {
    Runner::new().run_streamed(agent, input)
}

impl RunStream {
    /// The next event; `None` once the stream has closed.
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        self.queue.get().await
    }

    /// Drain every remaining event until the stream closes.
    pub async fn collect_events(&mut self) -> Vec<RunEvent> {
        let mut events = Vec::new();
        while let Some(ev) = self.next_event().await {
            events.push(ev);
        }
        events
    }

    /// Cancel the run; outstanding model/tool/guardrail work stops at the
    /// next suspension point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the run to finish and return its result. Call after the
    /// event stream has closed (or to wait for it).
    pub async fn final_result(self) -> Result<RunResult, RunError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(RunError::User(format!("run task panicked: {e}"))),
        }
    }

    /// Split into an event channel and a terminal-result channel — the
    /// convenience shape for callers wiring the run into select loops.
    pub fn into_channels(
        mut self,
    ) -> (
        mpsc::UnboundedReceiver<RunEvent>,
        oneshot::Receiver<Result<RunResult, RunError>>,
    ) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = oneshot::channel();
        tokio::spawn(async move {
            while let Some(ev) = self.next_event().await {
                if event_tx.send(ev).is_err() {
                    break;
                }
            }
            let _ = result_tx.send(self.final_result().await);
        });
        (event_rx, result_rx)
    }
}
