// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tool-choice policy forwarded to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    /// The model decides whether to call tools.
    Auto,
    /// The model must call at least one tool.
    Required,
    /// The model must not call tools.
    None,
    /// The model must call the named tool.
    Named(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningEffort {
    Minimal,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    Low,
    Medium,
    High,
}

/// Per-request model knobs.
///
/// Every field is optional: `None` means "provider default". A run-level
/// override is merged over the agent's settings with [`ModelSettings::resolve`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<ReasoningEffort>,
    /// Request a reasoning summary style (e.g. `"concise"`, `"detailed"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbosity: Option<Verbosity>,
    /// Whether the backend should store the response for later retrieval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<bool>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    /// Extra HTTP headers forwarded verbatim by wire-backed models.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_headers: Vec<(String, String)>,
    /// Extra query parameters forwarded verbatim by wire-backed models.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_query: Vec<(String, String)>,
}

impl ModelSettings {
    /// Merge `overlay` over `self`: any field set in the overlay wins.
    ///
    /// Used for the run-level settings override, which takes precedence
    /// over the agent's own settings field by field.
    pub fn resolve(&self, overlay: &ModelSettings) -> ModelSettings {
        let mut merged = self.clone();
        if overlay.temperature.is_some() {
            merged.temperature = overlay.temperature;
        }
        if overlay.top_p.is_some() {
            merged.top_p = overlay.top_p;
        }
        if overlay.max_tokens.is_some() {
            merged.max_tokens = overlay.max_tokens;
        }
        if overlay.tool_choice.is_some() {
            merged.tool_choice = overlay.tool_choice.clone();
        }
        if overlay.parallel_tool_calls.is_some() {
            merged.parallel_tool_calls = overlay.parallel_tool_calls;
        }
        if overlay.reasoning_effort.is_some() {
            merged.reasoning_effort = overlay.reasoning_effort;
        }
        if overlay.reasoning_summary.is_some() {
            merged.reasoning_summary = overlay.reasoning_summary.clone();
        }
        if overlay.verbosity.is_some() {
            merged.verbosity = overlay.verbosity;
        }
        if overlay.store.is_some() {
            merged.store = overlay.store;
        }
        if !overlay.metadata.is_empty() {
            merged.metadata.extend(
                overlay
                    .metadata
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone())),
            );
        }
        if !overlay.extra_headers.is_empty() {
            merged.extra_headers.extend(overlay.extra_headers.iter().cloned());
        }
        if !overlay.extra_query.is_empty() {
            merged.extra_query.extend(overlay.extra_query.iter().cloned());
        }
        merged
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_overlay_wins_for_set_fields() {
        let base = ModelSettings {
            temperature: Some(0.2),
            max_tokens: Some(1024),
            ..Default::default()
        };
        let overlay = ModelSettings {
            temperature: Some(0.9),
            ..Default::default()
        };
        let merged = base.resolve(&overlay);
        assert_eq!(merged.temperature, Some(0.9));
        assert_eq!(merged.max_tokens, Some(1024));
    }

    #[test]
    fn resolve_keeps_base_when_overlay_empty() {
        let base = ModelSettings {
            tool_choice: Some(ToolChoice::Required),
            parallel_tool_calls: Some(true),
            ..Default::default()
        };
        let merged = base.resolve(&ModelSettings::default());
        assert_eq!(merged.tool_choice, Some(ToolChoice::Required));
        assert_eq!(merged.parallel_tool_calls, Some(true));
    }

    #[test]
    fn resolve_merges_metadata_maps() {
        let mut base = ModelSettings::default();
        base.metadata.insert("team".into(), "infra".into());
        let mut overlay = ModelSettings::default();
        overlay.metadata.insert("run".into(), "nightly".into());
        let merged = base.resolve(&overlay);
        assert_eq!(merged.metadata.len(), 2);
        assert_eq!(merged.metadata.get("run").map(String::as_str), Some("nightly"));
    }

    #[test]
    fn named_tool_choice_round_trips() {
        let tc = ToolChoice::Named("count".into());
        let json = serde_json::to_string(&tc).unwrap();
        let back: ToolChoice = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tc);
    }

    #[test]
    fn default_settings_serialize_to_empty_object() {
        let json = serde_json::to_string(&ModelSettings::default()).unwrap();
        assert_eq!(json, "{}");
    }
}
