// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::fmt;
use std::sync::Arc;

use crate::McpToolDef;

/// Everything a filter decision may depend on.
#[derive(Debug, Clone, Copy)]
pub struct ToolFilterContext<'a> {
    pub agent_name: Option<&'a str>,
    pub server_name: &'a str,
    pub tool: &'a McpToolDef,
}

/// Visibility filter applied to every tool-list result of a server.
/// Tools rejected here are invisible to the model for that agent.
#[derive(Clone)]
pub enum ToolFilter {
    /// Name lists: when `allowed` is set only those names pass, and
    /// `blocked` names are always removed.
    Static {
        allowed: Option<Vec<String>>,
        blocked: Vec<String>,
    },
    /// Arbitrary predicate over the full context.
    Dynamic(Arc<dyn Fn(&ToolFilterContext<'_>) -> bool + Send + Sync>),
}

impl fmt::Debug for ToolFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static { allowed, blocked } => f
                .debug_struct("Static")
                .field("allowed", allowed)
                .field("blocked", blocked)
                .finish(),
            Self::Dynamic(_) => write!(f, "Dynamic(..)"),
        }
    }
}

impl ToolFilter {
    /// Only the named tools are visible.
    pub fn allowed(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::Static {
            allowed: Some(names.into_iter().map(Into::into).collect()),
            blocked: Vec::new(),
        }
    }

    /// The named tools are hidden; everything else is visible.
    pub fn blocked(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::Static {
            allowed: None,
            blocked: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn allows(&self, ctx: &ToolFilterContext<'_>) -> bool {
        match self {
            Self::Static { allowed, blocked } => {
                if blocked.iter().any(|n| n == &ctx.tool.name) {
                    return false;
                }
                match allowed {
                    Some(names) => names.iter().any(|n| n == &ctx.tool.name),
                    None => true,
                }
            }
            Self::Dynamic(pred) => pred(ctx),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
