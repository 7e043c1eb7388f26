// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::{
    McpError, McpPromptDef, McpPromptResult, McpServer, McpToolDef, McpToolResult, ToolFilter,
    ToolFilterContext,
};

/// Engine-side state for one remote tool server.
///
/// Owns the pieces the raw [`McpServer`] trait does not: connection gating
/// (list/call before `connect` is a caller error), the optional tool-list
/// cache, and the visibility filter. The cache stores the *unfiltered*
/// list — the filter can depend on the asking agent, so it is applied on
/// every read.
pub struct McpServerHandle {
    server: Arc<dyn McpServer>,
    cache_tools_list: bool,
    filter: Option<ToolFilter>,
    connected: AtomicBool,
    tools_cache: RwLock<Option<Vec<McpToolDef>>>,
}

impl std::fmt::Debug for McpServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServerHandle")
            .field("server", &self.server.name())
            .field("cache_tools_list", &self.cache_tools_list)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl McpServerHandle {
    pub fn new(server: Arc<dyn McpServer>) -> Self {
        Self {
            server,
            cache_tools_list: false,
            filter: None,
            connected: AtomicBool::new(false),
            tools_cache: RwLock::new(None),
        }
    }

    /// Cache `list_tools` results until invalidated or cleaned up.
    pub fn with_tools_cache(mut self, enabled: bool) -> Self {
        self.cache_tools_list = enabled;
        self
    }

    pub fn with_filter(mut self, filter: ToolFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn name(&self) -> &str {
        self.server.name()
    }

    pub fn use_structured_content(&self) -> bool {
        self.server.use_structured_content()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Establish the connection. A second call on a live handle is a no-op.
    pub async fn connect(&self) -> Result<(), McpError> {
        if self.connected.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.server.connect().await?;
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Tear down the connection and drop cached state. Idempotent.
    pub async fn cleanup(&self) -> Result<(), McpError> {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        *self.tools_cache.write().await = None;
        self.server.cleanup().await
    }

    /// Drop the cached tool list; the next `list_tools` fetches fresh.
    pub async fn invalidate_tools_cache(&self) {
        *self.tools_cache.write().await = None;
    }

    fn ensure_connected(&self) -> Result<(), McpError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(McpError::NotConnected(self.server.name().to_string()))
        }
    }

    /// List the server's tools visible to `agent_name`, serving from the
    /// cache when enabled.
    pub async fn list_tools(&self, agent_name: Option<&str>) -> Result<Vec<McpToolDef>, McpError> {
        self.ensure_connected()?;

        let raw = if self.cache_tools_list {
            if let Some(cached) = self.tools_cache.read().await.clone() {
                cached
            } else {
                let fetched = self.server.list_tools(agent_name).await?;
                *self.tools_cache.write().await = Some(fetched.clone());
                debug!(server = self.server.name(), tools = fetched.len(), "tool list cached");
                fetched
            }
        } else {
            self.server.list_tools(agent_name).await?
        };

        let Some(filter) = &self.filter else {
            return Ok(raw);
        };
        Ok(raw
            .into_iter()
            .filter(|tool| {
                filter.allows(&ToolFilterContext {
                    agent_name,
                    server_name: self.server.name(),
                    tool,
                })
            })
            .collect())
    }

    pub async fn call_tool(
        &self,
        name: &str,
        args: Option<Value>,
    ) -> Result<McpToolResult, McpError> {
        self.ensure_connected()?;
        self.server.call_tool(name, args).await
    }

    pub async fn list_prompts(&self) -> Result<Vec<McpPromptDef>, McpError> {
        self.ensure_connected()?;
        self.server.list_prompts().await
    }

    pub async fn get_prompt(
        &self,
        name: &str,
        args: Option<Value>,
    ) -> Result<McpPromptResult, McpError> {
        self.ensure_connected()?;
        self.server.get_prompt(name, args).await
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
