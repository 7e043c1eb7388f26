// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! End-to-end scenarios through the public facade.
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};

use runa::{
    agent_graph, run, typed_function_tool, Agent, Handoff, RunConfig, RunEvent, RunItem, Runner,
    ScriptedModel, Session, SqliteSession,
};

fn count_tool() -> runa::Tool {
    #[derive(serde::Deserialize)]
    struct Args {
        needle: String,
        haystack: String,
    }
    typed_function_tool(
        "count",
        "Count occurrences of a substring",
        json!({
            "type": "object",
            "properties": {
                "needle": { "type": "string" },
                "haystack": { "type": "string" }
            },
            "required": ["needle", "haystack"],
            "additionalProperties": false
        }),
        |_ctx, args: Args| async move { Ok(json!(args.haystack.matches(&args.needle).count())) },
    )
}

#[tokio::test]
async fn plain_text_conversation() {
    let agent = Arc::new(
        Agent::new("assistant")
            .instructions("Reply very concisely.")
            .model_instance(Arc::new(ScriptedModel::new(vec![
                ScriptedModel::text_response("San Francisco."),
            ]))),
    );
    let result = run(agent, "What city is the Golden Gate Bridge in?")
        .await
        .unwrap();
    assert_eq!(result.final_output_text(), "San Francisco.");
    assert_eq!(result.usage.requests, 1);
}

#[tokio::test]
async fn tool_roundtrip_through_the_facade() {
    let agent = Arc::new(
        Agent::new("assistant")
            .tool(count_tool())
            .model_instance(Arc::new(ScriptedModel::new(vec![
                ScriptedModel::tool_call_response(
                    "c1",
                    "count",
                    r#"{"needle":"l","haystack":"hello world"}"#,
                ),
                ScriptedModel::text_response("3"),
            ]))),
    );
    let result = run(agent, "How many l's in 'hello world'?").await.unwrap();
    assert_eq!(result.final_output_text(), "3");
    let outputs: Vec<&Value> = result
        .new_items
        .iter()
        .filter_map(|i| match i {
            RunItem::ToolCallOutput { output, .. } => Some(output),
            _ => None,
        })
        .collect();
    assert_eq!(outputs, vec![&json!(3)]);
}

#[tokio::test]
async fn handoff_streams_the_agent_switch() {
    let b = Arc::new(
        Agent::new("B").model_instance(Arc::new(ScriptedModel::always_text("done"))),
    );
    let a = Arc::new(
        Agent::new("A")
            .handoff(Handoff::new(Arc::clone(&b)))
            .model_instance(Arc::new(ScriptedModel::new(vec![
                ScriptedModel::tool_call_response("h1", "handoff_to_B", ""),
            ]))),
    );
    let mut stream = Runner::new().run_streamed(a, "escalate this");
    let events = stream.collect_events().await;
    let result = stream.final_result().await.unwrap();

    assert_eq!(result.last_agent.name, "B");
    assert_eq!(result.final_output_text(), "done");
    assert!(events.iter().any(|e| matches!(
        e,
        RunEvent::AgentUpdated { new_agent } if new_agent.name == "B"
    )));
}

#[tokio::test]
async fn sqlite_session_carries_memory_between_runs() {
    let dir = tempfile::tempdir().unwrap();
    let session = Arc::new(SqliteSession::new("demo", dir.path().join("s.db")).unwrap());

    let first = Arc::new(
        Agent::new("assistant")
            .model_instance(Arc::new(ScriptedModel::always_text("noted"))),
    );
    Runner::with_config(RunConfig::new().with_session(session.clone()))
        .run(first, "remember me")
        .await
        .unwrap();

    let model = Arc::new(ScriptedModel::always_text("I remember"));
    let second = Arc::new(Agent::new("assistant").model_instance(model.clone()));
    Runner::with_config(RunConfig::new().with_session(session.clone()))
        .run(second, "do you remember?")
        .await
        .unwrap();

    let req = model.last_request.lock().unwrap().clone().unwrap();
    assert_eq!(
        req.input[0].message_text().as_deref(),
        Some("remember me")
    );
    assert_eq!(session.get_items(None).await.unwrap().len(), 4);
}

#[tokio::test]
async fn agent_graph_tolerates_cycles() {
    let a = Arc::new(Agent::new("a").handoff(Handoff::to_named("b")));
    let b = Arc::new(Agent::new("b").handoff(Handoff::to_named("a")));
    let registry: HashMap<String, Arc<Agent>> =
        [("a".to_string(), a.clone()), ("b".to_string(), b)].into();
    let graph = agent_graph(&a, &registry);
    assert_eq!(graph.nodes.len(), 2);
    assert_eq!(graph.edges.len(), 2);
}
