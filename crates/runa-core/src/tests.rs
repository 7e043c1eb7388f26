// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
/// Runner integration tests.
///
/// Uses ScriptedModel so every scenario is deterministic and requires no
/// network access.
mod runner_tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use serde_json::{json, Value};
    use tokio_util::sync::CancellationToken;

    use async_trait::async_trait;
    use runa_mcp_client::{testing::StubServer, McpServerHandle};
    use runa_model::{
        Model, ModelResponse, ResponseItem, ScriptedModel, Usage,
    };
    use runa_tools::{typed_function_tool, Tool, ToolError};

    use crate::{
        run, Agent, GuardrailFunctionOutput, Handoff, HandoffInputData, InMemorySession,
        InputGuardrail, JsonSchemaOutput, OutputGuardrail, RunConfig, RunContext, RunError,
        RunEvent, RunHooks, RunItem, Runner, Session, ToolUseBehavior,
    };

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn count_tool() -> Tool {
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
            |_ctx, args: Args| async move {
                Ok(json!(args.haystack.matches(&args.needle).count()))
            },
        )
    }

    fn sleeping_tool(name: &'static str, millis: u64) -> Tool {
        typed_function_tool(
            name,
            "sleeps then reports its name",
            json!({ "type": "object" }),
            move |_ctx, _args: Value| async move {
                tokio::time::sleep(Duration::from_millis(millis)).await;
                Ok(json!(name))
            },
        )
    }

    fn agent_with(model: ScriptedModel) -> Arc<Agent> {
        Arc::new(Agent::new("assistant").model_instance(Arc::new(model)))
    }

    fn tool_output_items(items: &[RunItem]) -> Vec<&RunItem> {
        items
            .iter()
            .filter(|i| matches!(i, RunItem::ToolCallOutput { .. }))
            .collect()
    }

    /// Hooks that record which callbacks fired.
    #[derive(Default)]
    struct RecordingHooks {
        log: Mutex<Vec<String>>,
    }

    impl RecordingHooks {
        fn entries(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
        fn push(&self, entry: impl Into<String>) {
            self.log.lock().unwrap().push(entry.into());
        }
    }

    #[async_trait]
    impl RunHooks for RecordingHooks {
        async fn on_agent_start(&self, _ctx: &RunContext, agent: &Agent) -> Result<(), RunError> {
            self.push(format!("agent_start:{}", agent.name));
            Ok(())
        }
        async fn on_agent_end(
            &self,
            _ctx: &RunContext,
            agent: &Agent,
            _output: &Value,
        ) -> Result<(), RunError> {
            self.push(format!("agent_end:{}", agent.name));
            Ok(())
        }
        async fn on_llm_start(
            &self,
            _ctx: &RunContext,
            _agent: &Agent,
            _request: &runa_model::ModelRequest,
        ) -> Result<(), RunError> {
            self.push("llm_start");
            Ok(())
        }
        async fn on_llm_end(
            &self,
            _ctx: &RunContext,
            _agent: &Agent,
            _response: &ModelResponse,
        ) -> Result<(), RunError> {
            self.push("llm_end");
            Ok(())
        }
        async fn on_tool_start(
            &self,
            _ctx: &RunContext,
            _agent: &Agent,
            tool_name: &str,
        ) -> Result<(), RunError> {
            self.push(format!("tool_start:{tool_name}"));
            Ok(())
        }
        async fn on_tool_end(
            &self,
            _ctx: &RunContext,
            _agent: &Agent,
            tool_name: &str,
            _output: &Value,
        ) -> Result<(), RunError> {
            self.push(format!("tool_end:{tool_name}"));
            Ok(())
        }
        async fn on_handoff(
            &self,
            _ctx: &RunContext,
            from: &Agent,
            to: &Agent,
        ) -> Result<(), RunError> {
            self.push(format!("handoff:{}->{}", from.name, to.name));
            Ok(())
        }
    }

    // ── Happy path ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn happy_path_plain_text() {
        let model = ScriptedModel::new(vec![ScriptedModel::text_response("San Francisco.")]);
        let agent = Arc::new(
            Agent::new("assistant")
                .instructions("Reply very concisely.")
                .model_instance(Arc::new(model)),
        );
        let result = run(agent, "What city is the Golden Gate Bridge in?")
            .await
            .unwrap();

        assert_eq!(result.final_output_text(), "San Francisco.");
        assert_eq!(result.new_items.len(), 1);
        assert!(matches!(result.new_items[0], RunItem::MessageOutput { .. }));
        assert_eq!(result.usage.requests, 1);
        assert_eq!(result.last_agent.name, "assistant");
    }

    #[tokio::test]
    async fn instructions_reach_the_model() {
        let model = Arc::new(ScriptedModel::always_text("ok"));
        let agent = Arc::new(
            Agent::new("a")
                .instructions("Reply very concisely.")
                .model_instance(model.clone()),
        );
        run(agent, "hi").await.unwrap();
        let req = model.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(req.system_instructions.as_deref(), Some("Reply very concisely."));
    }

    #[tokio::test]
    async fn dynamic_instructions_resolve_each_turn() {
        let model = Arc::new(ScriptedModel::new(vec![
            ScriptedModel::tool_call_response("c1", "count", r#"{"needle":"a","haystack":"aa"}"#),
            ScriptedModel::text_response("2"),
        ]));
        let agent = Arc::new(
            Agent::new("a")
                .instructions_fn(|ctx, agent| async move {
                    Ok(format!("agent={} turn={}", agent.name, ctx.current_turn()))
                })
                .tool(count_tool())
                .model_instance(model.clone()),
        );
        run(agent, "count").await.unwrap();
        let req = model.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(req.system_instructions.as_deref(), Some("agent=a turn=2"));
    }

    // ── Tool dispatch ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn single_tool_call_then_final() {
        let model = ScriptedModel::new(vec![
            ScriptedModel::tool_call_response(
                "c1",
                "count",
                r#"{"needle":"r","haystack":"Strawberrry"}"#,
            ),
            ScriptedModel::text_response("4"),
        ]);
        let agent = Arc::new(
            Agent::new("assistant")
                .tool(count_tool())
                .model_instance(Arc::new(model)),
        );
        let result = run(agent, "How many r's in Strawberrry?").await.unwrap();

        assert_eq!(result.final_output_text(), "4");
        assert_eq!(result.usage.requests, 2);
        let kinds: Vec<_> = result.new_items.iter().map(|i| i.kind_name()).collect();
        assert_eq!(
            kinds,
            vec!["tool_call_item", "tool_call_output_item", "message_output_item"]
        );
        match &result.new_items[1] {
            RunItem::ToolCallOutput { output, raw, .. } => {
                assert_eq!(output, &json!(4));
                assert_eq!(raw.call_id(), Some("c1"));
            }
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_tool_calls_preserve_call_order() {
        let model = ScriptedModel::new(vec![
            ScriptedModel::response(vec![
                ResponseItem::function_call("c-slow", "slow", "{}"),
                ResponseItem::function_call("c-fast", "fast", "{}"),
            ]),
            ScriptedModel::text_response("done"),
        ]);
        let agent = Arc::new(
            Agent::new("assistant")
                .tool(sleeping_tool("slow", 500))
                .tool(sleeping_tool("fast", 10))
                .model_instance(Arc::new(model)),
        );

        let started = tokio::time::Instant::now();
        let result = run(agent, "run both").await.unwrap();
        let elapsed = started.elapsed();

        // Concurrent, not sequential: ~500ms wall time, not ~510ms.
        assert!(elapsed < Duration::from_millis(510), "tools ran sequentially: {elapsed:?}");

        let outputs = tool_output_items(&result.new_items);
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].call_id(), Some("c-slow"));
        assert_eq!(outputs[1].call_id(), Some("c-fast"));
    }

    #[tokio::test]
    async fn tool_failure_is_fed_back_to_the_model() {
        let failing = typed_function_tool(
            "flaky",
            "always fails",
            json!({ "type": "object" }),
            |_ctx, _args: Value| async { Err::<Value, _>(ToolError::Failure("boom".into())) },
        );
        let model = ScriptedModel::new(vec![
            ScriptedModel::tool_call_response("c1", "flaky", "{}"),
            ScriptedModel::text_response("recovered"),
        ]);
        let agent = Arc::new(
            Agent::new("assistant")
                .tool(failing)
                .model_instance(Arc::new(model)),
        );
        let result = run(agent, "go").await.unwrap();
        assert_eq!(result.final_output_text(), "recovered");
        match &result.new_items[1] {
            RunItem::ToolCallOutput { output, .. } => {
                assert_eq!(output, &json!({ "error": "boom" }));
            }
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[tokio::test]
    async fn fatal_tool_error_aborts_the_run() {
        let fatal = typed_function_tool(
            "broken",
            "explodes",
            json!({ "type": "object" }),
            |_ctx, _args: Value| async {
                Err::<Value, _>(ToolError::Fatal(anyhow::anyhow!("disk on fire")))
            },
        );
        let model = ScriptedModel::new(vec![ScriptedModel::tool_call_response("c1", "broken", "{}")]);
        let agent = Arc::new(
            Agent::new("assistant")
                .tool(fatal)
                .model_instance(Arc::new(model)),
        );
        let err = run(agent, "go").await.unwrap_err();
        assert!(matches!(err, RunError::Tool { ref tool, .. } if tool == "broken"));
    }

    #[tokio::test]
    async fn call_to_nonexistent_tool_is_model_behavior() {
        let model = ScriptedModel::new(vec![ScriptedModel::tool_call_response("c1", "ghost", "{}")]);
        let agent = agent_with(model);
        let err = run(agent, "go").await.unwrap_err();
        assert!(matches!(err, RunError::ModelBehavior(msg) if msg.contains("ghost")));
    }

    #[tokio::test]
    async fn stop_on_first_tool_uses_tool_output_as_final() {
        let model = ScriptedModel::new(vec![ScriptedModel::tool_call_response(
            "c1",
            "count",
            r#"{"needle":"b","haystack":"bbb"}"#,
        )]);
        let agent = Arc::new(
            Agent::new("assistant")
                .tool(count_tool())
                .tool_use_behavior(ToolUseBehavior::StopOnFirstTool)
                .model_instance(Arc::new(model)),
        );
        let result = run(agent, "go").await.unwrap();
        assert_eq!(result.final_output, json!(3));
        assert_eq!(result.usage.requests, 1);
    }

    #[tokio::test]
    async fn stop_at_tool_names_stops_only_on_match() {
        let model = ScriptedModel::new(vec![
            ScriptedModel::tool_call_response("c1", "count", r#"{"needle":"x","haystack":"x"}"#),
            ScriptedModel::tool_call_response("c2", "final_answer", r#"{"needle":"y","haystack":"yy"}"#),
        ]);
        let finisher = typed_function_tool(
            "final_answer",
            "produces the final answer",
            json!({ "type": "object" }),
            |_ctx, _args: Value| async { Ok(json!("the answer")) },
        );
        let agent = Arc::new(
            Agent::new("assistant")
                .tool(count_tool())
                .tool(finisher)
                .tool_use_behavior(ToolUseBehavior::stop_at(["final_answer"]))
                .model_instance(Arc::new(model)),
        );
        let result = run(agent, "go").await.unwrap();
        assert_eq!(result.final_output, json!("the answer"));
        assert_eq!(result.usage.requests, 2);
    }

    #[tokio::test]
    async fn hosted_tool_calls_are_recorded_not_executed() {
        let model = ScriptedModel::new(vec![ScriptedModel::response(vec![
            ResponseItem::HostedToolCall {
                id: Some("ws_1".into()),
                kind: runa_model::HostedToolKind::WebSearch,
                arguments: Some(json!({ "query": "weather" })),
                output: Some("sunny".into()),
                status: Some("completed".into()),
            },
            ResponseItem::assistant_message("It is sunny."),
        ])]);
        let agent = agent_with(model);
        let result = run(agent, "weather?").await.unwrap();
        assert_eq!(result.final_output_text(), "It is sunny.");
        assert_eq!(result.new_items[0].kind_name(), "tool_call_item");
    }

    // ── Guardrails ────────────────────────────────────────────────────────────

    fn homework_guardrail() -> InputGuardrail {
        InputGuardrail::new("homework", |_ctx, _agent, input: Vec<ResponseItem>| async move {
            let text: String = input.iter().filter_map(|i| i.message_text()).collect();
            if text.contains("math homework") {
                Ok(GuardrailFunctionOutput::tripwire(json!({ "matched": "math homework" })))
            } else {
                Ok(GuardrailFunctionOutput::pass(json!(null)))
            }
        })
    }

    #[tokio::test]
    async fn input_guardrail_tripwire_preempts_the_model_call() {
        let model = Arc::new(ScriptedModel::always_text("should never be seen"));
        let agent = Arc::new(
            Agent::new("assistant")
                .input_guardrail(homework_guardrail())
                .model_instance(model.clone()),
        );

        let mut stream = Runner::new().run_streamed(agent, "please do my math homework");
        let events = stream.collect_events().await;
        let err = stream.final_result().await.unwrap_err();

        assert!(matches!(err, RunError::InputGuardrailTriggered(r) if r.guardrail_name == "homework"));
        // No items were generated and the model was never called.
        assert!(!events.iter().any(|e| matches!(e, RunEvent::RunItem { .. })));
        assert_eq!(model.requests_made(), 0);
    }

    #[tokio::test]
    async fn clean_input_guardrails_allow_the_run() {
        let agent = Arc::new(
            Agent::new("assistant")
                .input_guardrail(homework_guardrail())
                .model_instance(Arc::new(ScriptedModel::always_text("essay help"))),
        );
        let result = run(agent, "please help with my essay").await.unwrap();
        assert_eq!(result.final_output_text(), "essay help");
        assert_eq!(result.input_guardrail_results.len(), 1);
        assert!(!result.input_guardrail_results[0].output.tripwire_triggered);
    }

    #[tokio::test]
    async fn slow_input_guardrail_tripwire_cancels_inflight_model() {
        // Model that never yields a response before the guardrail trips.
        #[derive(Debug)]
        struct StallingModel;
        #[async_trait]
        impl Model for StallingModel {
            fn name(&self) -> &str {
                "stalling"
            }
            async fn get_response(
                &self,
                _req: runa_model::ModelRequest,
            ) -> Result<ModelResponse, runa_model::ModelError> {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(ModelResponse::default())
            }
            async fn stream_response(
                &self,
                _req: runa_model::ModelRequest,
            ) -> Result<runa_model::ResponseStream, runa_model::ModelError> {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(Box::pin(futures::stream::empty()))
            }
        }
        let slow_trip = InputGuardrail::new("slow-trip", |_ctx, _agent, _input| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(GuardrailFunctionOutput::tripwire(json!(null)))
        });
        let agent = Arc::new(
            Agent::new("stalled")
                .input_guardrail(slow_trip)
                .model_instance(Arc::new(StallingModel)),
        );
        let started = std::time::Instant::now();
        let err = run(agent, "anything").await.unwrap_err();
        assert!(matches!(err, RunError::InputGuardrailTriggered(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn output_guardrail_tripwire_fails_and_skips_session_append() {
        let session = Arc::new(InMemorySession::new());
        let tripper = OutputGuardrail::new("no-secrets", |_ctx, _agent, output: Value| async move {
            let text = output.as_str().unwrap_or_default().to_string();
            Ok(if text.contains("secret") {
                GuardrailFunctionOutput::tripwire(json!({ "leak": true }))
            } else {
                GuardrailFunctionOutput::pass(json!(null))
            })
        });
        let agent = Arc::new(
            Agent::new("assistant")
                .output_guardrail(tripper)
                .model_instance(Arc::new(ScriptedModel::always_text("the secret is 42"))),
        );
        let runner = Runner::with_config(RunConfig::new().with_session(session.clone()));
        let err = runner.run(agent, "tell me").await.unwrap_err();
        assert!(matches!(err, RunError::OutputGuardrailTriggered(_)));
        assert!(session.get_items(None).await.unwrap().is_empty());
    }

    // ── Handoffs ──────────────────────────────────────────────────────────────

    fn handoff_pair() -> (Arc<Agent>, Arc<ScriptedModel>) {
        let model_b = ScriptedModel::always_text("done");
        let b = Arc::new(Agent::new("B").model_instance(Arc::new(model_b)));
        let model_a = Arc::new(ScriptedModel::new(vec![ScriptedModel::tool_call_response(
            "h1",
            "handoff_to_B",
            "",
        )]));
        let a = Arc::new(
            Agent::new("A")
                .handoff(Handoff::new(Arc::clone(&b)))
                .model_instance(model_a.clone()),
        );
        (a, model_a)
    }

    #[tokio::test]
    async fn handoff_switches_agent_and_finishes_on_target() {
        let (a, _) = handoff_pair();
        let result = run(a, "escalate").await.unwrap();
        assert_eq!(result.last_agent.name, "B");
        assert_eq!(result.final_output_text(), "done");

        let kinds: Vec<_> = result.new_items.iter().map(|i| i.kind_name()).collect();
        assert_eq!(
            kinds,
            vec!["handoff_call_item", "handoff_output_item", "message_output_item"]
        );
        match &result.new_items[1] {
            RunItem::HandoffOutput { raw, source_agent, target_agent, .. } => {
                assert_eq!(source_agent, "A");
                assert_eq!(target_agent, "B");
                match raw {
                    ResponseItem::FunctionCallOutput { output, .. } => {
                        assert_eq!(output, r#"{"assistant":"B"}"#);
                    }
                    other => panic!("unexpected raw item: {other:?}"),
                }
            }
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[tokio::test]
    async fn handoff_emits_exactly_one_agent_updated_for_the_target() {
        let (a, _) = handoff_pair();
        let mut stream = Runner::new().run_streamed(a, "escalate");
        let events = stream.collect_events().await;
        let updates: Vec<String> = events
            .iter()
            .filter_map(|e| match e {
                RunEvent::AgentUpdated { new_agent } => Some(new_agent.name.clone()),
                _ => None,
            })
            .collect();
        // Run start announces A; the handoff announces B exactly once.
        assert_eq!(updates, vec!["A", "B"]);
        stream.final_result().await.unwrap();
    }

    #[tokio::test]
    async fn named_handoff_resolves_through_the_registry() {
        let model_b = ScriptedModel::always_text("named done");
        let b = Arc::new(Agent::new("B").model_instance(Arc::new(model_b)));
        let a = Arc::new(
            Agent::new("A")
                .handoff(Handoff::to_named("B"))
                .model_instance(Arc::new(ScriptedModel::new(vec![
                    ScriptedModel::tool_call_response("h1", "handoff_to_B", ""),
                ]))),
        );
        let runner = Runner::with_config(RunConfig::new().register_agent(b));
        let result = runner.run(a, "go").await.unwrap();
        assert_eq!(result.final_output_text(), "named done");
    }

    #[tokio::test]
    async fn unknown_named_handoff_is_a_user_error() {
        let a = Arc::new(
            Agent::new("A")
                .handoff(Handoff::to_named("nobody"))
                .model_instance(Arc::new(ScriptedModel::new(vec![
                    ScriptedModel::tool_call_response("h1", "handoff_to_nobody", ""),
                ]))),
        );
        let err = run(a, "go").await.unwrap_err();
        assert!(matches!(err, RunError::User(msg) if msg.contains("nobody")));
    }

    #[tokio::test]
    async fn second_handoff_in_one_turn_is_skipped_with_a_warning_output() {
        let b = Arc::new(Agent::new("B").model_instance(Arc::new(ScriptedModel::always_text("from B"))));
        let c = Arc::new(Agent::new("C").model_instance(Arc::new(ScriptedModel::always_text("from C"))));
        let a = Arc::new(
            Agent::new("A")
                .handoff(Handoff::new(Arc::clone(&b)))
                .handoff(Handoff::new(Arc::clone(&c)))
                .model_instance(Arc::new(ScriptedModel::new(vec![ScriptedModel::response(
                    vec![
                        ResponseItem::function_call("h1", "handoff_to_B", ""),
                        ResponseItem::function_call("h2", "handoff_to_C", ""),
                    ],
                )]))),
        );
        let result = run(a, "go").await.unwrap();
        assert_eq!(result.last_agent.name, "B");
        assert_eq!(result.final_output_text(), "from B");
        // The skipped handoff resolved with an error payload.
        let skipped = result
            .new_items
            .iter()
            .find_map(|i| match i {
                RunItem::HandoffOutput { raw: ResponseItem::FunctionCallOutput { call_id, output }, .. }
                    if call_id == "h2" =>
                {
                    Some(output.clone())
                }
                _ => None,
            })
            .expect("skipped handoff output");
        assert!(skipped.contains("skipped"));
    }

    #[tokio::test]
    async fn handoff_wins_over_co_emitted_tool_calls() {
        let b = Arc::new(Agent::new("B").model_instance(Arc::new(ScriptedModel::always_text("handled"))));
        let count_calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let calls = Arc::clone(&count_calls);
        let counting = typed_function_tool(
            "probe",
            "counts invocations",
            json!({ "type": "object" }),
            move |_ctx, _args: Value| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Ok(json!(null))
                }
            },
        );
        let a = Arc::new(
            Agent::new("A")
                .tool(counting)
                .handoff(Handoff::new(Arc::clone(&b)))
                .model_instance(Arc::new(ScriptedModel::new(vec![ScriptedModel::response(
                    vec![
                        ResponseItem::function_call("t1", "probe", "{}"),
                        ResponseItem::function_call("h1", "handoff_to_B", ""),
                    ],
                )]))),
        );
        let result = run(a, "go").await.unwrap();
        assert_eq!(result.last_agent.name, "B");
        // The tool was never executed; its call still resolved.
        assert_eq!(count_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert!(result
            .new_items
            .iter()
            .any(|i| matches!(i, RunItem::ToolCallOutput { raw: ResponseItem::FunctionCallOutput { call_id, .. }, .. } if call_id == "t1")));
    }

    #[tokio::test]
    async fn handoff_input_filter_rewrites_history() {
        let model_b = Arc::new(ScriptedModel::always_text("clean slate"));
        let b = Arc::new(Agent::new("B").model_instance(model_b.clone()));
        let filter: crate::HandoffInputFilter = Arc::new(|data: HandoffInputData| {
            // Hide everything from the target but the original user input.
            HandoffInputData {
                input_history: data.input_history,
                pre_handoff_items: Vec::new(),
                new_items: Vec::new(),
            }
        });
        let a = Arc::new(
            Agent::new("A")
                .handoff(Handoff::new(Arc::clone(&b)).with_input_filter(filter))
                .model_instance(Arc::new(ScriptedModel::new(vec![
                    ScriptedModel::tool_call_response("h1", "handoff_to_B", ""),
                ]))),
        );
        let result = run(a, "original request").await.unwrap();
        assert_eq!(result.final_output_text(), "clean slate");
        let req = model_b.last_request.lock().unwrap().clone().unwrap();
        // B sees the user input and the handoff resolution, not A's call.
        assert!(req.input.iter().any(|i| i.message_text().as_deref() == Some("original request")));
        assert!(!req
            .input
            .iter()
            .any(|i| matches!(i, ResponseItem::FunctionCall { name, .. } if name == "handoff_to_B")));
    }

    // ── Structured output ─────────────────────────────────────────────────────

    fn number_schema() -> Arc<JsonSchemaOutput> {
        Arc::new(JsonSchemaOutput::new(
            "answer",
            json!({
                "type": "object",
                "properties": { "number": { "type": "integer" } },
                "required": ["number"],
                "additionalProperties": false
            }),
        ))
    }

    #[tokio::test]
    async fn structured_output_is_validated_and_returned() {
        let agent = Arc::new(
            Agent::new("assistant")
                .output_schema(number_schema())
                .model_instance(Arc::new(ScriptedModel::always_text(r#"{"number": 7}"#))),
        );
        let result = run(agent, "pick a number").await.unwrap();
        assert_eq!(result.final_output, json!({ "number": 7 }));
    }

    #[tokio::test]
    async fn invalid_structured_output_is_model_behavior() {
        let hooks = Arc::new(RecordingHooks::default());
        let agent = Arc::new(
            Agent::new("assistant")
                .output_schema(number_schema())
                .model_instance(Arc::new(ScriptedModel::always_text("not-json"))),
        );
        let runner = Runner::with_config(RunConfig::new().with_hooks(hooks.clone()));
        let err = runner.run(agent, "pick a number").await.unwrap_err();
        assert!(matches!(err, RunError::ModelBehavior(_)));
        // Hooks ran up to the validation point.
        let entries = hooks.entries();
        assert!(entries.contains(&"agent_start:assistant".to_string()));
        assert!(entries.contains(&"llm_end".to_string()));
        assert!(!entries.contains(&"agent_end:assistant".to_string()));
    }

    #[tokio::test]
    async fn schema_descriptor_is_forwarded_to_the_model() {
        let model = Arc::new(ScriptedModel::always_text(r#"{"number": 1}"#));
        let agent = Arc::new(
            Agent::new("assistant")
                .output_schema(number_schema())
                .model_instance(model.clone()),
        );
        run(agent, "go").await.unwrap();
        let req = model.last_request.lock().unwrap().clone().unwrap();
        let schema = req.output_schema.expect("schema descriptor");
        assert_eq!(schema.name, "answer");
        assert!(schema.strict);
        assert_eq!(schema.schema["type"], "object");
    }

    // ── Max turns ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn max_turns_enforced_after_exactly_n_model_calls() {
        for n in [1u32, 2, 3] {
            let model = Arc::new(ScriptedModel::repeating(ScriptedModel::tool_call_response(
                "c1",
                "count",
                r#"{"needle":"a","haystack":"a"}"#,
            )));
            let agent = Arc::new(
                Agent::new("assistant")
                    .tool(count_tool())
                    .model_instance(model.clone()),
            );
            let runner = Runner::with_config(RunConfig::new().with_max_turns(n));
            let err = runner.run(agent, "loop forever").await.unwrap_err();
            assert!(matches!(err, RunError::MaxTurnsExceeded(m) if m == n));
            assert_eq!(model.requests_made() as u32, n);
        }
    }

    // ── Sessions ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn session_append_law_second_run_sees_first_runs_items() {
        let session = Arc::new(InMemorySession::new());

        let agent1 = agent_with(ScriptedModel::new(vec![ScriptedModel::text_response("reply one")]));
        let runner = Runner::with_config(RunConfig::new().with_session(session.clone()));
        runner.run(agent1, "one").await.unwrap();

        let stored = session.get_items(None).await.unwrap();
        assert_eq!(stored.len(), 2); // user message + assistant reply

        let model2 = Arc::new(ScriptedModel::new(vec![ScriptedModel::text_response("reply two")]));
        let agent2 = Arc::new(Agent::new("assistant").model_instance(model2.clone()));
        let runner = Runner::with_config(RunConfig::new().with_session(session.clone()));
        runner.run(agent2, "two").await.unwrap();

        let req = model2.last_request.lock().unwrap().clone().unwrap();
        // The second run's effective input prefix equals the session
        // contents after the first run.
        assert_eq!(req.input[..stored.len()], stored[..]);
        assert_eq!(
            req.input[stored.len()].message_text().as_deref(),
            Some("two")
        );

        // And the session now also holds the second turn.
        assert_eq!(session.get_items(None).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn session_history_limit_truncates_the_prefix() {
        let session = Arc::new(InMemorySession::new());
        session
            .add_items(vec![
                ResponseItem::user_message("old-1"),
                ResponseItem::user_message("old-2"),
                ResponseItem::user_message("old-3"),
            ])
            .await
            .unwrap();
        let model = Arc::new(ScriptedModel::always_text("ok"));
        let agent = Arc::new(Agent::new("assistant").model_instance(model.clone()));
        let runner = Runner::with_config(
            RunConfig::new()
                .with_session(session)
                .with_session_history_limit(1),
        );
        runner.run(agent, "now").await.unwrap();
        let req = model.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(req.input[0].message_text().as_deref(), Some("old-3"));
        assert_eq!(req.input[1].message_text().as_deref(), Some("now"));
    }

    // ── Streaming ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn stream_events_match_new_items_order() {
        let model = ScriptedModel::new(vec![
            ScriptedModel::tool_call_response(
                "c1",
                "count",
                r#"{"needle":"l","haystack":"hello"}"#,
            ),
            ScriptedModel::text_response("2"),
        ]);
        let agent = Arc::new(
            Agent::new("assistant")
                .tool(count_tool())
                .model_instance(Arc::new(model)),
        );
        let mut stream = Runner::new().run_streamed(agent, "count l in hello");
        let events = stream.collect_events().await;
        let result = stream.final_result().await.unwrap();

        let streamed_items: Vec<&RunItem> = events
            .iter()
            .filter_map(|e| match e {
                RunEvent::RunItem { item, .. } => Some(item),
                _ => None,
            })
            .collect();
        assert_eq!(streamed_items.len(), result.new_items.len());
        for (streamed, resulting) in streamed_items.iter().zip(&result.new_items) {
            assert_eq!(streamed.kind_name(), resulting.kind_name());
            assert_eq!(streamed.raw(), resulting.raw());
        }
        // Terminal event closes the stream.
        assert!(matches!(events.last(), Some(RunEvent::Done)));
    }

    #[tokio::test]
    async fn stream_carries_raw_response_events() {
        let agent = agent_with(ScriptedModel::new(vec![ScriptedModel::text_response("hi")]));
        let mut stream = Runner::new().run_streamed(agent, "hello");
        let events = stream.collect_events().await;
        assert!(events
            .iter()
            .any(|e| matches!(e, RunEvent::RawResponses { .. })));
        stream.final_result().await.unwrap();
    }

    #[tokio::test]
    async fn stream_error_event_precedes_typed_error() {
        let agent = agent_with(ScriptedModel::new(vec![ScriptedModel::tool_call_response(
            "c1", "ghost", "{}",
        )]));
        let mut stream = Runner::new().run_streamed(agent, "go");
        let events = stream.collect_events().await;
        assert!(matches!(events.last(), Some(RunEvent::Error { .. })));
        assert!(matches!(
            stream.final_result().await,
            Err(RunError::ModelBehavior(_))
        ));
    }

    #[tokio::test]
    async fn into_channels_delivers_events_and_result() {
        let agent = agent_with(ScriptedModel::new(vec![ScriptedModel::text_response("hi")]));
        let stream = Runner::new().run_streamed(agent, "hello");
        let (mut events, result) = stream.into_channels();
        let mut kinds = Vec::new();
        while let Some(ev) = events.recv().await {
            kinds.push(ev.kind());
        }
        assert!(kinds.contains(&"run_item"));
        assert_eq!(result.await.unwrap().unwrap().final_output_text(), "hi");
    }

    // ── Cancellation ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn pre_cancelled_run_fails_immediately() {
        let token = CancellationToken::new();
        token.cancel();
        let agent = agent_with(ScriptedModel::always_text("never"));
        let runner = Runner::with_config(RunConfig::new().with_cancel(token));
        let err = runner.run(agent, "go").await.unwrap_err();
        assert!(matches!(err, RunError::Cancelled));
    }

    #[tokio::test]
    async fn cancelling_a_stream_stops_the_run() {
        #[derive(Debug)]
        struct NeverModel;
        #[async_trait]
        impl Model for NeverModel {
            fn name(&self) -> &str {
                "never"
            }
            async fn get_response(
                &self,
                _req: runa_model::ModelRequest,
            ) -> Result<ModelResponse, runa_model::ModelError> {
                futures::future::pending().await
            }
            async fn stream_response(
                &self,
                _req: runa_model::ModelRequest,
            ) -> Result<runa_model::ResponseStream, runa_model::ModelError> {
                Ok(Box::pin(futures::stream::pending()))
            }
        }
        let agent = Arc::new(Agent::new("assistant").model_instance(Arc::new(NeverModel)));
        let mut stream = Runner::new().run_streamed(agent, "hang");
        // Drain the startup event, then cancel.
        let _ = stream.next_event().await;
        stream.cancel();
        let _ = stream.collect_events().await;
        assert!(matches!(
            stream.final_result().await,
            Err(RunError::Cancelled)
        ));
    }

    // ── Hooks ─────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn hooks_fire_in_lifecycle_order() {
        let hooks = Arc::new(RecordingHooks::default());
        let (a, _) = handoff_pair();
        let runner = Runner::with_config(RunConfig::new().with_hooks(hooks.clone()));
        runner.run(a, "escalate").await.unwrap();
        let entries = hooks.entries();
        let expected = [
            "agent_start:A",
            "llm_start",
            "llm_end",
            "handoff:A->B",
            "agent_start:B",
            "llm_start",
            "llm_end",
            "agent_end:B",
        ];
        assert_eq!(entries, expected);
    }

    #[tokio::test]
    async fn hook_error_aborts_the_run() {
        struct FailingHooks;
        #[async_trait]
        impl RunHooks for FailingHooks {
            async fn on_llm_end(
                &self,
                _ctx: &RunContext,
                _agent: &Agent,
                _response: &ModelResponse,
            ) -> Result<(), RunError> {
                Err(RunError::User("hook rejected the response".into()))
            }
        }
        let agent = agent_with(ScriptedModel::always_text("ok"));
        let runner = Runner::with_config(RunConfig::new().with_hooks(Arc::new(FailingHooks)));
        let err = runner.run(agent, "go").await.unwrap_err();
        assert!(matches!(err, RunError::User(msg) if msg.contains("hook rejected")));
    }

    // ── Usage & settings ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn usage_accumulates_across_turns() {
        let model = ScriptedModel::new(vec![
            ScriptedModel::tool_call_response("c1", "count", r#"{"needle":"a","haystack":"a"}"#),
            ScriptedModel::text_response("1"),
        ]);
        let agent = Arc::new(
            Agent::new("assistant")
                .tool(count_tool())
                .model_instance(Arc::new(model)),
        );
        let result = run(agent, "go").await.unwrap();
        assert_eq!(result.usage.requests, 2);
        assert_eq!(result.usage.input_tokens, 20);
        assert_eq!(result.usage.output_tokens, 10);
        assert_eq!(result.usage.total_tokens, 30);
    }

    #[tokio::test]
    async fn run_level_settings_override_agent_settings() {
        let model = Arc::new(ScriptedModel::always_text("ok"));
        let agent = Arc::new(
            Agent::new("assistant")
                .model_settings(runa_model::ModelSettings {
                    temperature: Some(0.2),
                    max_tokens: Some(256),
                    ..Default::default()
                })
                .model_instance(model.clone()),
        );
        let runner = Runner::with_config(RunConfig::new().with_model_settings(
            runa_model::ModelSettings {
                temperature: Some(0.9),
                ..Default::default()
            },
        ));
        runner.run(agent, "go").await.unwrap();
        let req = model.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(req.settings.temperature, Some(0.9));
        assert_eq!(req.settings.max_tokens, Some(256));
    }

    #[tokio::test]
    async fn response_id_feeds_the_next_turn() {
        let first = ModelResponse {
            output: vec![ResponseItem::function_call(
                "c1",
                "count",
                r#"{"needle":"a","haystack":"a"}"#,
            )],
            usage: Usage::for_request(5, 5),
            response_id: Some("resp_1".into()),
        };
        let model = Arc::new(ScriptedModel::new(vec![
            first,
            ScriptedModel::text_response("1"),
        ]));
        let agent = Arc::new(
            Agent::new("assistant")
                .tool(count_tool())
                .model_instance(model.clone()),
        );
        let result = run(agent, "go").await.unwrap();
        assert_eq!(result.last_response_id.as_deref(), Some("resp_1"));
        let req = model.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(req.previous_response_id.as_deref(), Some("resp_1"));
    }

    // ── Remote tool servers ───────────────────────────────────────────────────

    #[tokio::test]
    async fn mcp_tools_are_listed_and_invoked_through_the_loop() {
        let handle = Arc::new(
            McpServerHandle::new(Arc::new(StubServer::new("srv").with_tool("fetch", "fetches")))
                .with_tools_cache(true),
        );
        handle.connect().await.unwrap();
        let model = ScriptedModel::new(vec![
            ScriptedModel::tool_call_response("c1", "fetch", "{}"),
            ScriptedModel::text_response("fetched"),
        ]);
        let agent = Arc::new(
            Agent::new("assistant")
                .mcp_server(handle)
                .model_instance(Arc::new(model)),
        );
        let result = run(agent, "go").await.unwrap();
        assert_eq!(result.final_output_text(), "fetched");
        match &result.new_items[1] {
            RunItem::ToolCallOutput { output, .. } => {
                assert_eq!(output, &json!("fetch: ok"));
            }
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unconnected_mcp_server_is_a_user_error() {
        let handle = Arc::new(McpServerHandle::new(Arc::new(
            StubServer::new("srv").with_tool("fetch", "fetches"),
        )));
        let agent = Arc::new(
            Agent::new("assistant")
                .mcp_server(handle)
                .model_instance(Arc::new(ScriptedModel::always_text("unreached"))),
        );
        let err = run(agent, "go").await.unwrap_err();
        assert!(matches!(err, RunError::User(msg) if msg.contains("not connected")));
    }

    // ── Agent as tool ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn agent_as_tool_runs_a_nested_agent() {
        let sub = Arc::new(
            Agent::new("summarizer")
                .model_instance(Arc::new(ScriptedModel::always_text("summary: ok"))),
        );
        let model = ScriptedModel::new(vec![
            ScriptedModel::tool_call_response("c1", "run_summarizer", r#"{"input":"long text"}"#),
            ScriptedModel::text_response("wrapped up"),
        ]);
        let orchestrator = Arc::new(
            Agent::new("orchestrator")
                .tool(sub.as_tool(None, None))
                .model_instance(Arc::new(model)),
        );
        let result = run(orchestrator, "summarize this").await.unwrap();
        assert_eq!(result.final_output_text(), "wrapped up");
        match &result.new_items[1] {
            RunItem::ToolCallOutput { output, .. } => {
                assert_eq!(output, &json!("summary: ok"));
            }
            other => panic!("unexpected item: {other:?}"),
        }
    }
}
