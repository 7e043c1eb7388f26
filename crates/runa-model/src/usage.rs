// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Token accounting for one model response, or the running totals of a run.
///
/// [`Usage::add`] is additive and commutative, so deltas can be folded in
/// as responses arrive, in any order. Totals never decrease.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub requests: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    /// Input tokens served from the provider's prompt cache.
    pub cached_input_tokens: u64,
    /// Output tokens spent on reasoning before the visible response.
    pub reasoning_output_tokens: u64,
}

impl Usage {
    /// A delta describing a single request.
    pub fn for_request(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            requests: 1,
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
            cached_input_tokens: 0,
            reasoning_output_tokens: 0,
        }
    }

    pub fn add(&mut self, delta: &Usage) {
        self.requests += delta.requests;
        self.input_tokens += delta.input_tokens;
        self.output_tokens += delta.output_tokens;
        self.total_tokens += delta.total_tokens;
        self.cached_input_tokens += delta.cached_input_tokens;
        self.reasoning_output_tokens += delta.reasoning_output_tokens;
    }
}

/// Shared, mutex-guarded usage accumulator attached to a run.
///
/// Cloning shares the underlying counters; tools and guardrails read a
/// consistent snapshot while the runner folds in deltas.
#[derive(Debug, Clone, Default)]
pub struct UsageRef(Arc<Mutex<Usage>>);

impl UsageRef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, delta: &Usage) {
        self.0.lock().expect("usage lock poisoned").add(delta);
    }

    pub fn snapshot(&self) -> Usage {
        *self.0.lock().expect("usage lock poisoned")
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
