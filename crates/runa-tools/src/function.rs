// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{FunctionTool, Tool, ToolContext, ToolError};

/// Build a function tool from an async closure over the raw JSON argument
/// string.
pub fn function_tool<F, Fut>(
    name: impl Into<String>,
    description: impl Into<String>,
    params_schema: Value,
    f: F,
) -> Tool
where
    F: Fn(ToolContext, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
{
    let f = Arc::new(f);
    Tool::Function(FunctionTool::new(
        name,
        description,
        params_schema,
        Arc::new(move |ctx, args| {
            let f = Arc::clone(&f);
            Box::pin(async move { f(ctx, args).await })
        }),
    ))
}

/// Build a function tool whose arguments are deserialized into `A` before
/// invocation. A JSON parse failure surfaces as [`ToolError::BadArguments`],
/// which the runner treats as model misbehaviour rather than a tool fault.
pub fn typed_function_tool<A, F, Fut>(
    name: impl Into<String>,
    description: impl Into<String>,
    params_schema: Value,
    f: F,
) -> Tool
where
    A: DeserializeOwned + Send + 'static,
    F: Fn(ToolContext, A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
{
    function_tool(name, description, params_schema, move |ctx, args_json| {
        let parsed: Result<A, _> = serde_json::from_str(&args_json);
        let fut = parsed.map(|args| f(ctx, args));
        async move {
            match fut {
                Ok(inner) => inner.await,
                Err(e) => Err(ToolError::BadArguments(e.to_string())),
            }
        }
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Deserialize)]
    struct CountArgs {
        needle: String,
        haystack: String,
    }

    fn count_tool() -> Tool {
        typed_function_tool(
            "count",
            "Count occurrences of a character in a string",
            json!({
                "type": "object",
                "properties": {
                    "needle": { "type": "string" },
                    "haystack": { "type": "string" }
                },
                "required": ["needle", "haystack"],
                "additionalProperties": false
            }),
            |_ctx, args: CountArgs| async move {
                let n = args.haystack.matches(&args.needle).count();
                Ok(json!(n))
            },
        )
    }

    #[tokio::test]
    async fn typed_tool_parses_and_invokes() {
        let Tool::Function(tool) = count_tool() else {
            panic!("expected function tool")
        };
        let out = tool
            .invoke(
                ToolContext::default(),
                r#"{"needle":"r","haystack":"Strawberrry"}"#.into(),
            )
            .await
            .unwrap();
        assert_eq!(out, json!(4));
    }

    #[tokio::test]
    async fn typed_tool_rejects_malformed_arguments() {
        let Tool::Function(tool) = count_tool() else {
            panic!("expected function tool")
        };
        let err = tool
            .invoke(ToolContext::default(), "not-json".into())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::BadArguments(_)));
    }

    #[tokio::test]
    async fn untyped_tool_sees_the_raw_string() {
        let tool = function_tool(
            "raw",
            "returns its raw args",
            json!({ "type": "object" }),
            |_ctx, args| async move { Ok(Value::String(args)) },
        );
        let Tool::Function(tool) = tool else { panic!() };
        let out = tool
            .invoke(ToolContext::default(), "{\"k\":2}".into())
            .await
            .unwrap();
        assert_eq!(out, Value::String("{\"k\":2}".into()));
    }
}
