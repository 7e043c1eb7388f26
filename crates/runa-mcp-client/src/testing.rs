// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! In-process fake server for tests: scripted tools and results, call
//! counters, and a mutation handle so cache behaviour can be exercised.
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    McpError, McpPromptDef, McpPromptResult, McpServer, McpToolDef, McpToolResult,
};

/// Shared call counters of a [`StubServer`].
#[derive(Debug, Default)]
pub struct StubCounters {
    connects: AtomicUsize,
    cleanups: AtomicUsize,
    lists: AtomicUsize,
    calls: AtomicUsize,
}

impl StubCounters {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
    pub fn cleanups(&self) -> usize {
        self.cleanups.load(Ordering::SeqCst)
    }
    pub fn lists(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub struct StubServer {
    name: String,
    tools: Arc<Mutex<Vec<McpToolDef>>>,
    results: Mutex<HashMap<String, McpToolResult>>,
    prompts: Vec<McpPromptDef>,
    counters: Arc<StubCounters>,
    structured: bool,
}

impl StubServer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tools: Arc::new(Mutex::new(Vec::new())),
            results: Mutex::new(HashMap::new()),
            prompts: Vec::new(),
            counters: Arc::new(StubCounters::default()),
            structured: false,
        }
    }

    pub fn with_tool(self, name: &str, description: &str) -> Self {
        self.tools.lock().unwrap().push(McpToolDef {
            name: name.into(),
            description: Some(description.into()),
            input_schema: serde_json::json!({ "type": "object" }),
        });
        self
    }

    /// Script the result returned by `call_tool(name, ..)`.
    pub fn with_result(self, name: &str, result: McpToolResult) -> Self {
        self.results.lock().unwrap().insert(name.into(), result);
        self
    }

    pub fn with_prompt(mut self, name: &str, description: &str) -> Self {
        self.prompts.push(McpPromptDef {
            name: name.into(),
            description: Some(description.into()),
        });
        self
    }

    pub fn with_structured_content(mut self, enabled: bool) -> Self {
        self.structured = enabled;
        self
    }

    pub fn counters(&self) -> Arc<StubCounters> {
        Arc::clone(&self.counters)
    }

    /// Direct handle to the advertised tool list, for simulating remote
    /// mutation between list calls.
    pub fn tools_handle(&self) -> Arc<Mutex<Vec<McpToolDef>>> {
        Arc::clone(&self.tools)
    }
}

#[async_trait]
impl McpServer for StubServer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<(), McpError> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn cleanup(&self) -> Result<(), McpError> {
        self.counters.cleanups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_tools(&self, _agent_name: Option<&str>) -> Result<Vec<McpToolDef>, McpError> {
        self.counters.lists.fetch_add(1, Ordering::SeqCst);
        Ok(self.tools.lock().unwrap().clone())
    }

    async fn call_tool(&self, name: &str, _args: Option<Value>) -> Result<McpToolResult, McpError> {
        self.counters.calls.fetch_add(1, Ordering::SeqCst);
        let known = self.tools.lock().unwrap().iter().any(|t| t.name == name);
        if !known {
            return Err(McpError::UnknownTool {
                server: self.name.clone(),
                tool: name.to_string(),
            });
        }
        Ok(self
            .results
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_else(|| McpToolResult::text(format!("{name}: ok"))))
    }

    async fn list_prompts(&self) -> Result<Vec<McpPromptDef>, McpError> {
        Ok(self.prompts.clone())
    }

    async fn get_prompt(
        &self,
        name: &str,
        _args: Option<Value>,
    ) -> Result<McpPromptResult, McpError> {
        if !self.prompts.iter().any(|p| p.name == name) {
            return Err(McpError::UnknownPrompt {
                server: self.name.clone(),
                prompt: name.to_string(),
            });
        }
        Ok(McpPromptResult {
            description: None,
            text: format!("prompt:{name}"),
        })
    }

    fn use_structured_content(&self) -> bool {
        self.structured
    }
}
