// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use runa_model::{ModelResponse, ResponseItem, Usage};

use crate::{Agent, GuardrailResult, RunError, RunItem};

/// What a completed run hands back to the caller.
#[derive(Debug)]
pub struct RunResult {
    /// The caller's original input items (post any handoff filters).
    pub input: Vec<ResponseItem>,
    /// Every item generated during the run, in causal order.
    pub new_items: Vec<RunItem>,
    /// The complete model responses, one per model call.
    pub raw_responses: Vec<ModelResponse>,
    /// Text runs yield a JSON string; structured runs yield the validated
    /// object.
    pub final_output: Value,
    /// The agent that produced the final output.
    pub last_agent: Arc<Agent>,
    pub usage: Usage,
    pub last_response_id: Option<String>,
    pub input_guardrail_results: Vec<GuardrailResult>,
    pub output_guardrail_results: Vec<GuardrailResult>,
}

impl RunResult {
    /// The final output as plain text. Structured outputs are serialized.
    pub fn final_output_text(&self) -> String {
        match &self.final_output {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Deserialize the final output into a concrete type.
    pub fn final_output_as<T: DeserializeOwned>(&self) -> Result<T, RunError> {
        serde_json::from_value(self.final_output.clone())
            .map_err(|e| RunError::ModelBehavior(format!("final output does not match type: {e}")))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
