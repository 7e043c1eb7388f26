// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use serde_json::Value;

use runa_tools::{FunctionTool, Tool, ToolError};

use crate::{McpError, McpServerHandle, McpToolResult};

/// Convert the tools a server advertises to `agent_name` into function
/// tools that proxy `call_tool`.
///
/// The handle must already be connected. Each produced tool parses its
/// argument string to JSON (empty string → no arguments) and maps the
/// server result per [`extract_output`]. Remote failures come back as
/// non-fatal tool failures, so the model sees them and can react.
pub async fn mcp_function_tools(
    handle: &Arc<McpServerHandle>,
    agent_name: &str,
) -> Result<Vec<Tool>, McpError> {
    let defs = handle.list_tools(Some(agent_name)).await?;
    let mut tools = Vec::with_capacity(defs.len());
    for def in defs {
        let server = Arc::clone(handle);
        let tool_name = def.name.clone();
        let structured = handle.use_structured_content();
        let invoker: runa_tools::ToolInvoker = Arc::new(move |_ctx, args_json: String| {
            let server = Arc::clone(&server);
            let tool_name = tool_name.clone();
            Box::pin(async move {
                let args: Option<Value> = if args_json.trim().is_empty() {
                    None
                } else {
                    Some(
                        serde_json::from_str(&args_json)
                            .map_err(|e| ToolError::BadArguments(e.to_string()))?,
                    )
                };
                let result = server
                    .call_tool(&tool_name, args)
                    .await
                    .map_err(|e| ToolError::Failure(e.to_string()))?;
                extract_output(result, structured)
            })
        });
        tools.push(Tool::Function(
            FunctionTool::new(
                def.name,
                def.description.unwrap_or_default(),
                def.input_schema,
                invoker,
            )
            // Remote schemas are authored elsewhere; don't promise strict
            // enforcement on their behalf.
            .with_strict(false),
        ));
    }
    Ok(tools)
}

/// Map a server result to the value appended as tool output.
fn extract_output(result: McpToolResult, structured: bool) -> Result<Value, ToolError> {
    if result.is_error {
        return Err(ToolError::Failure(result.text_content()));
    }
    if structured {
        if let Some(value) = result.structured_content {
            return Ok(value);
        }
    }
    Ok(Value::String(result.text_content()))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
