// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;

use crate::{
    Model, ModelError, ModelRequest, ModelResponse, ResponseItem, ResponseStream, Role,
    StreamEvent, Usage,
};

/// Deterministic mock model for tests. Echoes the last user message back
/// as the assistant response.
#[derive(Debug)]
pub struct MockModel {
    name: String,
}

impl Default for MockModel {
    fn default() -> Self {
        Self::named("mock-model")
    }
}

impl MockModel {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn reply_for(req: &ModelRequest) -> ModelResponse {
        let reply = req
            .input
            .iter()
            .rev()
            .find(|item| item.role() == Some(Role::User))
            .and_then(|item| item.message_text())
            .unwrap_or_else(|| "[no input]".to_string());
        ModelResponse {
            output: vec![ResponseItem::assistant_message(format!("MOCK: {reply}"))],
            usage: Usage::for_request(10, 10),
            response_id: None,
        }
    }
}

#[async_trait]
impl Model for MockModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_response(&self, req: ModelRequest) -> Result<ModelResponse, ModelError> {
        Ok(Self::reply_for(&req))
    }

    async fn stream_response(&self, req: ModelRequest) -> Result<ResponseStream, ModelError> {
        Ok(stream_from_response(Self::reply_for(&req)))
    }
}

/// A pre-scripted model. Each call pops the next response from the front
/// of the queue, so tests can specify exact item sequences — including tool
/// calls and handoffs — without network access.
#[derive(Debug)]
pub struct ScriptedModel {
    name: String,
    scripts: Mutex<VecDeque<Result<ModelResponse, ModelError>>>,
    /// Served once the queue is exhausted. `None` falls back to a marker
    /// text response so a runaway loop is visible in test output.
    fallback: Option<ModelResponse>,
    /// The last `ModelRequest` seen. Written on every call so tests can
    /// inspect what was sent.
    pub last_request: Arc<Mutex<Option<ModelRequest>>>,
    requests: AtomicU64,
}

impl ScriptedModel {
    /// Build a model from an ordered list of responses.
    pub fn new(responses: Vec<ModelResponse>) -> Self {
        Self {
            name: "scripted-model".into(),
            scripts: Mutex::new(responses.into_iter().map(Ok).collect()),
            fallback: None,
            last_request: Arc::new(Mutex::new(None)),
            requests: AtomicU64::new(0),
        }
    }

    /// Convenience: a model that always returns a single text reply.
    pub fn always_text(text: impl Into<String>) -> Self {
        let mut m = Self::new(vec![]);
        m.fallback = Some(Self::text_response(text));
        m
    }

    /// Convenience: a model that returns the same response on every call.
    /// Useful for max-turn tests with a model that always calls a tool.
    pub fn repeating(response: ModelResponse) -> Self {
        let mut m = Self::new(vec![]);
        m.fallback = Some(response);
        m
    }

    /// Append a scripted failure after the queued responses.
    pub fn then_error(self, err: ModelError) -> Self {
        self.scripts
            .lock()
            .expect("script lock poisoned")
            .push_back(Err(err));
        self
    }

    /// Number of completed `get_response`/`stream_response` calls.
    pub fn requests_made(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }

    /// A plain assistant text response.
    pub fn text_response(text: impl Into<String>) -> ModelResponse {
        Self::response(vec![ResponseItem::assistant_message(text)])
    }

    /// A response consisting of a single function call.
    pub fn tool_call_response(
        call_id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> ModelResponse {
        Self::response(vec![ResponseItem::function_call(call_id, name, arguments)])
    }

    /// A response from arbitrary output items with default usage numbers.
    pub fn response(output: Vec<ResponseItem>) -> ModelResponse {
        ModelResponse {
            output,
            usage: Usage::for_request(10, 5),
            response_id: None,
        }
    }

    fn next(&self, req: ModelRequest) -> Result<ModelResponse, ModelError> {
        *self.last_request.lock().expect("request lock poisoned") = Some(req);
        self.requests.fetch_add(1, Ordering::SeqCst);
        let popped = self.scripts.lock().expect("script lock poisoned").pop_front();
        match popped {
            Some(result) => result,
            None => Ok(self
                .fallback
                .clone()
                .unwrap_or_else(|| Self::text_response("[no more scripts]"))),
        }
    }
}

#[async_trait]
impl Model for ScriptedModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_response(&self, req: ModelRequest) -> Result<ModelResponse, ModelError> {
        self.next(req)
    }

    async fn stream_response(&self, req: ModelRequest) -> Result<ResponseStream, ModelError> {
        Ok(stream_from_response(self.next(req)?))
    }
}

/// Expand a complete response into the event sequence a streaming backend
/// would produce: text deltas for message items, an item-done per output
/// item, and the terminal `Completed`.
fn stream_from_response(response: ModelResponse) -> ResponseStream {
    let mut events: Vec<Result<StreamEvent, ModelError>> = vec![Ok(StreamEvent::Created {
        response_id: response.response_id.clone(),
    })];
    for item in &response.output {
        if let Some(text) = item.message_text() {
            if !text.is_empty() {
                events.push(Ok(StreamEvent::OutputTextDelta { delta: text }));
            }
        }
        events.push(Ok(StreamEvent::OutputItemDone { item: item.clone() }));
    }
    events.push(Ok(StreamEvent::Completed { response }));
    Box::pin(stream::iter(events))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    fn req_with_user(text: &str) -> ModelRequest {
        ModelRequest {
            input: vec![ResponseItem::user_message(text)],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn mock_echoes_last_user_message() {
        let m = MockModel::default();
        let resp = m.get_response(req_with_user("hi")).await.unwrap();
        assert_eq!(
            resp.output[0].message_text().as_deref(),
            Some("MOCK: hi")
        );
    }

    #[tokio::test]
    async fn scripted_pops_in_order() {
        let m = ScriptedModel::new(vec![
            ScriptedModel::text_response("first"),
            ScriptedModel::text_response("second"),
        ]);
        let a = m.get_response(req_with_user("x")).await.unwrap();
        let b = m.get_response(req_with_user("x")).await.unwrap();
        assert_eq!(a.output[0].message_text().as_deref(), Some("first"));
        assert_eq!(b.output[0].message_text().as_deref(), Some("second"));
        assert_eq!(m.requests_made(), 2);
    }

    #[tokio::test]
    async fn scripted_fallback_when_exhausted() {
        let m = ScriptedModel::new(vec![]);
        let resp = m.get_response(req_with_user("x")).await.unwrap();
        assert!(resp.output[0]
            .message_text()
            .unwrap()
            .contains("no more scripts"));
    }

    #[tokio::test]
    async fn scripted_error_is_surfaced() {
        let m = ScriptedModel::new(vec![]).then_error(ModelError::RateLimited("slow down".into()));
        let err = m.get_response(req_with_user("x")).await.unwrap_err();
        assert!(matches!(err, ModelError::RateLimited(_)));
    }

    #[tokio::test]
    async fn scripted_captures_last_request() {
        let m = ScriptedModel::always_text("ok");
        let _ = m.get_response(req_with_user("inspect me")).await.unwrap();
        let captured = m.last_request.lock().unwrap();
        let input = &captured.as_ref().unwrap().input;
        assert_eq!(input[0].message_text().as_deref(), Some("inspect me"));
    }

    #[tokio::test]
    async fn stream_ends_with_completed() {
        let m = ScriptedModel::always_text("streamed");
        let mut s = m.stream_response(req_with_user("x")).await.unwrap();
        let mut events = Vec::new();
        while let Some(ev) = s.next().await {
            events.push(ev.unwrap());
        }
        assert!(matches!(events.first(), Some(StreamEvent::Created { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, StreamEvent::OutputTextDelta { delta } if delta == "streamed")));
        assert!(matches!(events.last(), Some(StreamEvent::Completed { .. })));
    }

    #[tokio::test]
    async fn repeating_never_exhausts() {
        let m = ScriptedModel::repeating(ScriptedModel::tool_call_response("c1", "loop", "{}"));
        for _ in 0..5 {
            let resp = m.get_response(req_with_user("x")).await.unwrap();
            assert!(matches!(
                resp.output[0],
                ResponseItem::FunctionCall { ref name, .. } if name == "loop"
            ));
        }
        assert_eq!(m.requests_made(), 5);
    }
}
