//! Shared fixtures for runtime integration tests.
#![allow(dead_code)]

use arbor_contract::{
    Content, Event, EventStream, FunctionCall, LlmRequest, LlmResponse, Model, ModelError, Part,
    Role, SessionService,
};
use arbor_runtime::Runner;
use arbor_store::InMemorySessionService;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Model that replays a fixed script of responses and counts invocations.
pub struct ScriptedModel {
    script: Mutex<VecDeque<Result<LlmResponse, ModelError>>>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn new(responses: Vec<LlmResponse>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().map(Ok).collect()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn from_results(results: Vec<Result<LlmResponse, ModelError>>) -> Self {
        Self {
            script: Mutex::new(results.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Model for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate_content(&self, _request: LlmRequest) -> Result<LlmResponse, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .expect("script lock poisoned")
            .pop_front()
            .unwrap_or_else(|| Ok(LlmResponse::text("script exhausted")))
    }
}

/// A model response carrying one function-call part per `(name, id)` pair.
pub fn calls_response(calls: &[(&str, &str)]) -> LlmResponse {
    let parts = calls
        .iter()
        .map(|(name, id)| Part::function_call(FunctionCall::new(*name, *id, Map::new())))
        .collect();
    LlmResponse::from_content(Content {
        role: Role::Model,
        parts,
    })
}

pub fn payload(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// Runner over the in-memory session service with one pre-created session
/// `("app", "u1", "s1")`.
pub async fn setup(
    build: impl FnOnce(Arc<InMemorySessionService>) -> Runner,
) -> (Runner, Arc<InMemorySessionService>) {
    let sessions = Arc::new(InMemorySessionService::new());
    sessions
        .create_session("app", "u1", Some("s1".into()), None)
        .await
        .expect("create session");
    (build(sessions.clone()), sessions)
}

pub async fn collect(stream: EventStream) -> Vec<Event> {
    stream.collect().await
}

pub fn authors(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .map(|e| e.author.clone().unwrap_or_default())
        .collect()
}
