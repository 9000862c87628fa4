//! Flow-level behavior: termination, degradation, recovery, state routing.

mod common;

use arbor_contract::{
    CallbackContext, Content, FunctionDeclaration, FunctionTool, InvocationContext, LlmResponse,
    ModelError, Plugin, RunConfig, SessionService, Tool, ToolContext, ToolError, Toolset,
};
use arbor_runtime::{LlmAgent, Runner};
use async_trait::async_trait;
use common::{authors, calls_response, collect, payload, setup, ScriptedModel};
use serde_json::{json, Map, Value};
use std::sync::Arc;

fn echo_tool(name: &str) -> Arc<FunctionTool> {
    Arc::new(FunctionTool::new(
        FunctionDeclaration::new(name, "echo"),
        |_args| async { Ok(Map::new()) },
    ))
}

#[tokio::test]
async fn iteration_limit_yields_error_event() {
    // The model never stops asking for the tool.
    let model = Arc::new(ScriptedModel::new(
        (0..10).map(|_| calls_response(&[("t", "fc")])).collect(),
    ));
    let (runner, _) = setup(|sessions| {
        Runner::new(
            "app",
            Arc::new(LlmAgent::new("A", model.clone()).with_tool(echo_tool("t"))),
            sessions,
        )
        .unwrap()
    })
    .await;

    let config = RunConfig {
        max_iterations: 2,
        ..Default::default()
    };
    let events = collect(
        runner
            .run_with_config("u1", "s1", Content::user("go"), config)
            .await
            .unwrap(),
    )
    .await;

    let last = events.last().unwrap();
    assert_eq!(last.error_code.as_deref(), Some("iteration_limit"));
    assert_eq!(model.call_count(), 2);
}

#[tokio::test]
async fn unrecovered_model_error_terminates_with_error_event() {
    let model = Arc::new(ScriptedModel::from_results(vec![Err(
        ModelError::Provider("upstream 500".into()),
    )]));
    let (runner, sessions) = setup(|sessions| {
        Runner::new("app", Arc::new(LlmAgent::new("A", model.clone())), sessions).unwrap()
    })
    .await;

    let events = collect(runner.run("u1", "s1", Content::user("hi")).await.unwrap()).await;

    assert_eq!(authors(&events), vec!["user", "A"]);
    assert_eq!(events[1].error_code.as_deref(), Some("model_error"));
    assert!(events[1]
        .error_message
        .as_ref()
        .unwrap()
        .contains("upstream 500"));

    // Error events are part of the record.
    let session = sessions.get_session("app", "u1", "s1", None).await.unwrap();
    assert_eq!(session.events.len(), 2);
}

struct ModelFallback;

#[async_trait]
impl Plugin for ModelFallback {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn on_model_error(
        &self,
        _ctx: &mut CallbackContext,
        _error: &ModelError,
    ) -> Option<LlmResponse> {
        Some(LlmResponse::text("fallback answer"))
    }
}

#[tokio::test]
async fn model_error_recovered_by_plugin() {
    let model = Arc::new(ScriptedModel::from_results(vec![Err(
        ModelError::Provider("down".into()),
    )]));
    let (runner, _) = setup(|sessions| {
        Runner::new("app", Arc::new(LlmAgent::new("A", model.clone())), sessions)
            .unwrap()
            .with_plugins(vec![Arc::new(ModelFallback)])
            .unwrap()
    })
    .await;

    let events = collect(runner.run("u1", "s1", Content::user("hi")).await.unwrap()).await;
    assert_eq!(events[1].content.as_ref().unwrap().text(), "fallback answer");
    assert!(events[1].error_code.is_none());
}

struct BrokenToolset;

#[async_trait]
impl Toolset for BrokenToolset {
    fn name(&self) -> &str {
        "broken"
    }

    async fn tools(&self, _ctx: &InvocationContext) -> Result<Vec<Arc<dyn Tool>>, ToolError> {
        Err(ToolError::Internal("listing failed".into()))
    }
}

#[tokio::test]
async fn failing_toolset_degrades_to_empty() {
    let model = Arc::new(ScriptedModel::new(vec![LlmResponse::text("still fine")]));
    let (runner, _) = setup(|sessions| {
        Runner::new(
            "app",
            Arc::new(
                LlmAgent::new("A", model.clone()).with_toolset(Arc::new(BrokenToolset)),
            ),
            sessions,
        )
        .unwrap()
    })
    .await;

    let events = collect(runner.run("u1", "s1", Content::user("hi")).await.unwrap()).await;
    assert_eq!(events[1].content.as_ref().unwrap().text(), "still fine");
}

#[tokio::test]
async fn unknown_tool_becomes_error_response() {
    let model = Arc::new(ScriptedModel::new(vec![
        calls_response(&[("ghost", "fc1")]),
        LlmResponse::text("noted"),
    ]));
    let (runner, _) = setup(|sessions| {
        Runner::new("app", Arc::new(LlmAgent::new("A", model.clone())), sessions).unwrap()
    })
    .await;

    let events = collect(runner.run("u1", "s1", Content::user("go")).await.unwrap()).await;

    let responses = events[2].function_responses();
    assert!(responses[0].response["error"]
        .as_str()
        .unwrap()
        .contains("ghost"));
    // The model saw the error payload and got to react.
    assert_eq!(events[3].content.as_ref().unwrap().text(), "noted");
}

#[tokio::test]
async fn failing_tool_becomes_error_response() {
    let model = Arc::new(ScriptedModel::new(vec![
        calls_response(&[("boom", "fc1")]),
        LlmResponse::text("recovered conversationally"),
    ]));
    let tool = Arc::new(FunctionTool::new(
        FunctionDeclaration::new("boom", "always fails"),
        |_args| async { Err(ToolError::ExecutionFailed("disk on fire".into())) },
    ));
    let (runner, _) = setup(|sessions| {
        Runner::new(
            "app",
            Arc::new(LlmAgent::new("A", model.clone()).with_tool(tool)),
            sessions,
        )
        .unwrap()
    })
    .await;

    let events = collect(runner.run("u1", "s1", Content::user("go")).await.unwrap()).await;
    let responses = events[2].function_responses();
    assert!(responses[0].response["error"]
        .as_str()
        .unwrap()
        .contains("disk on fire"));
}

#[tokio::test]
async fn long_running_tool_ends_turn_with_placeholder() {
    let model = Arc::new(ScriptedModel::new(vec![
        calls_response(&[("bg_job", "fc_bg")]),
        LlmResponse::text("should not be requested"),
    ]));
    let tool = Arc::new(
        FunctionTool::new(FunctionDeclaration::new("bg_job", "slow job"), |_args| async {
            Ok(payload(&[("status", json!("pending"))]))
        })
        .long_running(),
    );
    let (runner, _) = setup(|sessions| {
        Runner::new(
            "app",
            Arc::new(LlmAgent::new("A", model.clone()).with_tool(tool)),
            sessions,
        )
        .unwrap()
    })
    .await;

    let events = collect(runner.run("u1", "s1", Content::user("start")).await.unwrap()).await;

    let tool_event = events.last().unwrap();
    assert_eq!(tool_event.long_running_tool_ids, vec!["fc_bg".to_string()]);
    assert!(tool_event.is_final_response());
    assert_eq!(
        tool_event.function_responses()[0].response["status"],
        json!("pending")
    );
    // The placeholder ended the loop; no summarization round ran.
    assert_eq!(model.call_count(), 1);
}

struct StampEvents;

#[async_trait]
impl Plugin for StampEvents {
    fn name(&self) -> &str {
        "stamp"
    }

    async fn on_event(
        &self,
        _ctx: &InvocationContext,
        event: &arbor_contract::Event,
    ) -> Option<arbor_contract::Event> {
        let mut rewritten = event.clone();
        rewritten
            .actions
            .state_delta
            .insert("stamped".into(), json!(true));
        Some(rewritten)
    }
}

#[tokio::test]
async fn on_event_rewrites_are_what_gets_persisted() {
    let model = Arc::new(ScriptedModel::new(vec![LlmResponse::text("ok")]));
    let (runner, sessions) = setup(|sessions| {
        Runner::new("app", Arc::new(LlmAgent::new("A", model.clone())), sessions)
            .unwrap()
            .with_plugins(vec![Arc::new(StampEvents)])
            .unwrap()
    })
    .await;

    collect(runner.run("u1", "s1", Content::user("hi")).await.unwrap()).await;

    let session = sessions.get_session("app", "u1", "s1", None).await.unwrap();
    // The user event is committed before the agent runs; every
    // agent-yielded event passed through the rewrite.
    assert!(session
        .events
        .iter()
        .skip(1)
        .all(|e| e.actions.state_delta["stamped"] == json!(true)));
    assert_eq!(session.state["stamped"], json!(true));
}

#[tokio::test]
async fn partial_responses_stream_but_never_persist() {
    let mut fragment = LlmResponse::text("frag");
    fragment.partial = true;
    fragment.turn_complete = false;
    let model = Arc::new(ScriptedModel::new(vec![
        fragment,
        LlmResponse::text("full answer"),
    ]));
    let (runner, sessions) = setup(|sessions| {
        Runner::new("app", Arc::new(LlmAgent::new("A", model.clone())), sessions).unwrap()
    })
    .await;

    let events = collect(runner.run("u1", "s1", Content::user("hi")).await.unwrap()).await;

    // Caller sees the fragment...
    assert_eq!(events.len(), 3);
    assert!(events[1].partial);
    assert_eq!(events[2].content.as_ref().unwrap().text(), "full answer");

    // ...the session never does.
    let session = sessions.get_session("app", "u1", "s1", None).await.unwrap();
    assert_eq!(session.events.len(), 2);
    assert!(session.events.iter().all(|e| !e.partial));
}

struct WriterTool;

#[async_trait]
impl Tool for WriterTool {
    fn declaration(&self) -> FunctionDeclaration {
        FunctionDeclaration::new("writer", "writes scoped state")
    }

    async fn run(
        &self,
        _args: Map<String, Value>,
        ctx: &mut ToolContext,
    ) -> Result<Map<String, Value>, ToolError> {
        ctx.set_state("app:shared", json!("X"));
        ctx.set_state("temp:scratch", json!("gone"));
        ctx.set_state("local", json!(7));
        Ok(Map::new())
    }
}

#[tokio::test]
async fn tool_state_writes_apply_at_append() {
    let model = Arc::new(ScriptedModel::new(vec![
        calls_response(&[("writer", "fc1")]),
        LlmResponse::text("done"),
    ]));
    let (runner, sessions) = setup(|sessions| {
        Runner::new(
            "app",
            Arc::new(LlmAgent::new("A", model.clone()).with_tool(Arc::new(WriterTool))),
            sessions,
        )
        .unwrap()
    })
    .await;

    collect(runner.run("u1", "s1", Content::user("go")).await.unwrap()).await;

    let session = sessions.get_session("app", "u1", "s1", None).await.unwrap();
    assert_eq!(session.state["app:shared"], json!("X"));
    assert_eq!(session.state["local"], json!(7));
    assert!(!session.state.contains_key("temp:scratch"));
}

struct AgentGate {
    block: bool,
}

#[async_trait]
impl Plugin for AgentGate {
    fn name(&self) -> &str {
        "agent_gate"
    }

    async fn before_agent(
        &self,
        _agent: &dyn arbor_contract::Agent,
        ctx: &mut CallbackContext,
    ) -> Option<Content> {
        if self.block {
            ctx.set_state("gated", json!(true));
            Some(Content::model("agent disabled"))
        } else {
            None
        }
    }

    async fn after_agent(
        &self,
        _agent: &dyn arbor_contract::Agent,
        _ctx: &mut CallbackContext,
    ) -> Option<Content> {
        Some(Content::model("appended by gate"))
    }
}

#[tokio::test]
async fn before_agent_short_circuit_replaces_agent_body() {
    let model = Arc::new(ScriptedModel::new(vec![LlmResponse::text("never")]));
    let (runner, sessions) = setup(|sessions| {
        Runner::new("app", Arc::new(LlmAgent::new("A", model.clone())), sessions)
            .unwrap()
            .with_plugins(vec![Arc::new(AgentGate { block: true })])
            .unwrap()
    })
    .await;

    let events = collect(runner.run("u1", "s1", Content::user("hi")).await.unwrap()).await;

    assert_eq!(authors(&events), vec!["user", "A"]);
    assert_eq!(events[1].content.as_ref().unwrap().text(), "agent disabled");
    assert_eq!(model.call_count(), 0);

    // The callback's buffered write rode the synthetic event into state.
    let session = sessions.get_session("app", "u1", "s1", None).await.unwrap();
    assert_eq!(session.state["gated"], json!(true));
}

#[tokio::test]
async fn after_agent_appends_replacement_content() {
    let model = Arc::new(ScriptedModel::new(vec![LlmResponse::text("body")]));
    let (runner, _) = setup(|sessions| {
        Runner::new("app", Arc::new(LlmAgent::new("A", model.clone())), sessions)
            .unwrap()
            .with_plugins(vec![Arc::new(AgentGate { block: false })])
            .unwrap()
    })
    .await;

    let events = collect(runner.run("u1", "s1", Content::user("hi")).await.unwrap()).await;

    assert_eq!(authors(&events), vec!["user", "A", "A"]);
    assert_eq!(events[2].content.as_ref().unwrap().text(), "appended by gate");
}

#[tokio::test]
async fn cancelled_turn_stops_at_first_suspension_point() {
    let model = Arc::new(ScriptedModel::new(vec![LlmResponse::text("never")]));
    let (runner, _) = setup(|sessions| {
        Runner::new("app", Arc::new(LlmAgent::new("A", model.clone())), sessions).unwrap()
    })
    .await;

    let config = RunConfig::default();
    config.cancellation.cancel();
    let events = collect(
        runner
            .run_with_config("u1", "s1", Content::user("hi"), config)
            .await
            .unwrap(),
    )
    .await;

    // The committed user event survives; the model was never consulted.
    assert_eq!(authors(&events), vec!["user"]);
    assert_eq!(model.call_count(), 0);
}
