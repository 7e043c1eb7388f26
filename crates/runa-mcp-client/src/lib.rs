// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Remote tool server client.
//!
//! The engine-side surface of an external tool server: the [`McpServer`]
//! capability trait (transports are supplied by the embedder), the
//! [`McpServerHandle`] per-server state that owns the connection lifecycle,
//! the tool-list cache and tool filtering, and the adapter that turns
//! listed server tools into function tools the agent loop can dispatch.
mod adapter;
mod filter;
mod handle;
mod server;
pub mod testing;

pub use adapter::mcp_function_tools;
pub use filter::{ToolFilter, ToolFilterContext};
pub use handle::McpServerHandle;
pub use server::{
    McpContent, McpError, McpPromptDef, McpPromptResult, McpServer, McpToolDef, McpToolResult,
};
