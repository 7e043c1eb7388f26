// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::Serialize;
use serde_json::Value;

use runa_model::ResponseItem;

/// One item generated during a run, attributed to the agent that produced
/// it and carrying the raw wire representation it came from (or will be
/// sent as).
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunItem {
    MessageOutput {
        agent: String,
        raw: ResponseItem,
    },
    Reasoning {
        agent: String,
        raw: ResponseItem,
    },
    ToolCall {
        agent: String,
        raw: ResponseItem,
    },
    ToolCallOutput {
        agent: String,
        raw: ResponseItem,
        /// The tool's result before serialization into the wire output.
        output: Value,
    },
    HandoffCall {
        agent: String,
        raw: ResponseItem,
    },
    HandoffOutput {
        agent: String,
        raw: ResponseItem,
        source_agent: String,
        target_agent: String,
    },
    McpApprovalRequest {
        agent: String,
        raw: ResponseItem,
    },
    McpApprovalResponse {
        agent: String,
        raw: ResponseItem,
    },
    McpListTools {
        agent: String,
        raw: ResponseItem,
    },
}

impl RunItem {
    /// Name of the agent this item is attributed to.
    pub fn agent(&self) -> &str {
        match self {
            RunItem::MessageOutput { agent, .. }
            | RunItem::Reasoning { agent, .. }
            | RunItem::ToolCall { agent, .. }
            | RunItem::ToolCallOutput { agent, .. }
            | RunItem::HandoffCall { agent, .. }
            | RunItem::HandoffOutput { agent, .. }
            | RunItem::McpApprovalRequest { agent, .. }
            | RunItem::McpApprovalResponse { agent, .. }
            | RunItem::McpListTools { agent, .. } => agent,
        }
    }

    /// The wire item this run item wraps.
    pub fn raw(&self) -> &ResponseItem {
        match self {
            RunItem::MessageOutput { raw, .. }
            | RunItem::Reasoning { raw, .. }
            | RunItem::ToolCall { raw, .. }
            | RunItem::ToolCallOutput { raw, .. }
            | RunItem::HandoffCall { raw, .. }
            | RunItem::HandoffOutput { raw, .. }
            | RunItem::McpApprovalRequest { raw, .. }
            | RunItem::McpApprovalResponse { raw, .. }
            | RunItem::McpListTools { raw, .. } => raw,
        }
    }

    /// The stable sub-kind string used by the stream-event ABI.
    pub fn kind_name(&self) -> &'static str {
        match self {
            RunItem::MessageOutput { .. } => "message_output_item",
            RunItem::Reasoning { .. } => "reasoning_item",
            RunItem::ToolCall { .. } => "tool_call_item",
            RunItem::ToolCallOutput { .. } => "tool_call_output_item",
            RunItem::HandoffCall { .. } => "handoff_call_item",
            RunItem::HandoffOutput { .. } => "handoff_output_item",
            RunItem::McpApprovalRequest { .. } => "mcp_approval_request_item",
            RunItem::McpApprovalResponse { .. } => "mcp_approval_response_item",
            RunItem::McpListTools { .. } => "mcp_list_tools_item",
        }
    }

    /// The call id carried by the wrapped wire item, if any.
    pub fn call_id(&self) -> Option<&str> {
        self.raw().call_id()
    }
}

/// Concatenated text of all message-output items, in order. This is the
/// default final output of an agent without an output type.
pub fn text_message_outputs(items: &[RunItem]) -> String {
    items
        .iter()
        .filter_map(|item| match item {
            RunItem::MessageOutput { raw, .. } => raw.message_text(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
