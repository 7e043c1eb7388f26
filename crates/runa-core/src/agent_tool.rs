// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use serde_json::{json, Value};

use runa_tools::{FunctionTool, Tool, ToolError};

use crate::{Agent, RunConfig, RunResult, Runner};

/// How an agent-as-tool turns the sub-run's result into the tool output.
pub type OutputExtractor = Arc<dyn Fn(&RunResult) -> String + Send + Sync>;

impl Agent {
    /// Wrap this agent as a tool: invoking it spawns a nested run with the
    /// argument string as input and returns the sub-run's final output.
    ///
    /// Unlike a handoff, the caller keeps the conversation; the sub-agent
    /// sees only the tool-call input.
    pub fn as_tool(
        self: &Arc<Self>,
        tool_name: Option<&str>,
        tool_description: Option<&str>,
    ) -> Tool {
        self.as_tool_with_extractor(
            tool_name,
            tool_description,
            Arc::new(|result: &RunResult| result.final_output_text()),
        )
    }

    /// Like [`Agent::as_tool`], with a custom extractor over the sub-run's
    /// result.
    pub fn as_tool_with_extractor(
        self: &Arc<Self>,
        tool_name: Option<&str>,
        tool_description: Option<&str>,
        extractor: OutputExtractor,
    ) -> Tool {
        let name = tool_name.map(str::to_string).unwrap_or_else(|| {
            let safe: String = self
                .name
                .chars()
                .map(|c| if c.is_alphanumeric() { c } else { '_' })
                .collect();
            format!("run_{safe}")
        });
        let description = tool_description
            .map(str::to_string)
            .or_else(|| self.handoff_description.clone())
            .unwrap_or_else(|| format!("Run the {} agent with the given input.", self.name));

        let agent = Arc::clone(self);
        let invoker: runa_tools::ToolInvoker = Arc::new(move |tool_ctx, args_json: String| {
            let agent = Arc::clone(&agent);
            let extractor = Arc::clone(&extractor);
            Box::pin(async move {
                let input = match serde_json::from_str::<Value>(&args_json) {
                    Ok(args) => args
                        .get("input")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .ok_or_else(|| {
                            ToolError::BadArguments("missing 'input' argument".into())
                        })?,
                    Err(e) => return Err(ToolError::BadArguments(e.to_string())),
                };

                // The nested run inherits the caller's cancellation signal.
                let runner = Runner::with_config(
                    RunConfig::new().with_cancel(tool_ctx.cancel.clone()),
                );
                let result = runner
                    .run(agent, input)
                    .await
                    .map_err(|e| ToolError::Failure(format!("sub-agent failed: {e}")))?;
                Ok(Value::String(extractor(&result)))
            })
        });

        Tool::Function(FunctionTool::new(
            name,
            description,
            json!({
                "type": "object",
                "properties": {
                    "input": {
                        "type": "string",
                        "description": "The input to hand the sub-agent"
                    }
                },
                "required": ["input"],
                "additionalProperties": false
            }),
            invoker,
        ))
    }
}
