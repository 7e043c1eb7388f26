// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;

use thiserror::Error;

use runa_model::ToolDefinition;

use crate::{Tool, ToolContext};

#[derive(Debug, Error)]
#[error("duplicate tool name: {0}")]
pub struct DuplicateTool(pub String);

/// Per-turn name → tool lookup.
///
/// Built fresh each turn from the agent's enabled tools plus any tools
/// contributed by remote servers, so dynamic enablement never mutates the
/// agent's own tool list.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Tool>,
    order: Vec<String>,
}

impl ToolRegistry {
    /// Build from an ordered tool list, keeping only tools enabled for the
    /// given context. Duplicate names are a configuration error.
    pub fn build(
        tools: impl IntoIterator<Item = Tool>,
        ctx: &ToolContext,
    ) -> Result<Self, DuplicateTool> {
        let mut reg = Self::default();
        for tool in tools {
            if !tool.is_enabled(ctx) {
                continue;
            }
            let name = tool.name().to_string();
            if reg.tools.contains_key(&name) {
                return Err(DuplicateTool(name));
            }
            reg.order.push(name.clone());
            reg.tools.insert(name, tool);
        }
        Ok(reg)
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    /// Wire descriptors in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .map(|n| self.tools[n].to_definition())
            .collect()
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::{function_tool, ToolEnabled};

    fn noop(name: &str) -> Tool {
        function_tool(name, "noop", json!({ "type": "object" }), |_ctx, _args| async {
            Ok(Value::Null)
        })
    }

    #[test]
    fn build_preserves_order() {
        let ctx = ToolContext::default();
        let reg = ToolRegistry::build([noop("b"), noop("a"), noop("c")], &ctx).unwrap();
        assert_eq!(reg.names(), ["b", "a", "c"]);
    }

    #[test]
    fn build_filters_disabled_tools() {
        let ctx = ToolContext::default();
        let disabled = match noop("off") {
            Tool::Function(f) => Tool::Function(f.with_enabled(ToolEnabled::Never)),
            other => other,
        };
        let reg = ToolRegistry::build([noop("on"), disabled], &ctx).unwrap();
        assert_eq!(reg.names(), ["on"]);
        assert!(reg.get("off").is_none());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let ctx = ToolContext::default();
        let err = ToolRegistry::build([noop("t"), noop("t")], &ctx).unwrap_err();
        assert_eq!(err.0, "t");
    }

    #[test]
    fn definitions_follow_registration_order() {
        let ctx = ToolContext::default();
        let reg = ToolRegistry::build([noop("x"), noop("y")], &ctx).unwrap();
        let names: Vec<_> = reg.definitions().iter().map(|d| d.name().to_string()).collect();
        assert_eq!(names, ["x", "y"]);
    }
}
