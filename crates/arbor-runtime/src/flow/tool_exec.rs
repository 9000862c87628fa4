//! Parallel tool dispatch and deterministic result merging.

use crate::control::{await_controlled, Controlled};
use arbor_contract::{
    Content, Event, EventActions, FunctionCall, FunctionResponse, InvocationContext, Part, Role,
    Tool, ToolContext, ToolError,
};
use futures::future::join_all;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::Instrument;

/// Everything one finished call contributes to the merged results event.
pub(crate) struct CallOutcome {
    call: FunctionCall,
    response: Map<String, Value>,
    actions: EventActions,
    long_running: bool,
}

fn error_payload(message: impl Into<String>) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("error".into(), Value::String(message.into()));
    map
}

/// Dispatch every call of one model round concurrently and fold the
/// outcomes into a single tool-results event. Response parts keep the
/// original call order regardless of completion order.
pub(crate) async fn execute_tool_round(
    agent_name: &str,
    ctx: &InvocationContext,
    catalog: &HashMap<String, Arc<dyn Tool>>,
    calls: &[FunctionCall],
    callback_actions: EventActions,
) -> Event {
    let outcomes = join_all(calls.iter().map(|call| {
        let ctx = ctx.clone();
        let tool = catalog.get(&call.name).cloned();
        let call = call.clone();
        async move { execute_single_call(ctx, tool, call).await }
    }))
    .await;

    merge_outcomes(agent_name, ctx, callback_actions, outcomes)
}

/// One call: before_tool fold → schema validation → execution (raced
/// against cancellation and the tool timeout) → after_tool fold, with
/// on_tool_error recovery. Unrecovered failures become an `{"error": …}`
/// payload so the model can see and react.
pub(crate) async fn execute_single_call(
    ctx: InvocationContext,
    tool: Option<Arc<dyn Tool>>,
    call: FunctionCall,
) -> CallOutcome {
    let chain = ctx.plugins.clone();
    let call_id = call.id.clone().unwrap_or_default();
    let cancellation = ctx.run_config.cancellation.clone();
    let timeout = ctx.run_config.tool_timeout;
    let mut tool_ctx = ToolContext::new(ctx, call_id);
    let mut args = call.args.clone();

    let Some(tool) = tool else {
        tracing::warn!(tool = %call.name, "model requested unknown tool");
        return CallOutcome {
            response: error_payload(ToolError::NotFound(call.name.clone()).to_string()),
            actions: tool_ctx.take_actions(),
            long_running: false,
            call,
        };
    };

    let executed = match chain.before_tool(tool.as_ref(), &mut args, &mut tool_ctx).await {
        Some(bypassed) => Ok(bypassed),
        None => match tool.validate_args(&Value::Object(args.clone())) {
            Err(err) => Err(err),
            Ok(()) => {
                let span = tracing::info_span!("tool_call", tool = %call.name);
                let controlled =
                    await_controlled(&cancellation, timeout, tool.run(args.clone(), &mut tool_ctx));
                match controlled.instrument(span).await {
                    Controlled::Value(result) => result,
                    Controlled::Cancelled => Err(ToolError::Cancelled),
                    Controlled::TimedOut(ms) => Err(ToolError::Timeout(ms)),
                }
            }
        },
    };

    let response = match executed {
        Ok(result) => {
            match chain
                .after_tool(tool.as_ref(), &args, &mut tool_ctx, &result)
                .await
            {
                Some(replaced) => replaced,
                None => result,
            }
        }
        Err(err) => {
            tracing::warn!(tool = %call.name, error = %err, "tool execution failed");
            match chain
                .on_tool_error(tool.as_ref(), &args, &mut tool_ctx, &err)
                .await
            {
                Some(recovered) => recovered,
                None => error_payload(err.to_string()),
            }
        }
    };

    CallOutcome {
        response,
        actions: tool_ctx.take_actions(),
        long_running: tool.is_long_running(),
        call,
    }
}

/// Fold per-call buffers (in call-index order) over the callback-level
/// buffer. Conflicting state keys between calls: last writer by index
/// wins, with a warning. The first transfer target set wins; later ones
/// warn. Flags OR-reduce and artifact deltas union.
pub(crate) fn merge_outcomes(
    agent_name: &str,
    ctx: &InvocationContext,
    callback_actions: EventActions,
    outcomes: Vec<CallOutcome>,
) -> Event {
    let mut merged = callback_actions;
    let mut tool_written: std::collections::HashSet<String> = std::collections::HashSet::new();
    let mut parts = Vec::with_capacity(outcomes.len());
    let mut long_running_tool_ids = Vec::new();

    for outcome in outcomes {
        let actions = outcome.actions;
        for (key, value) in actions.state_delta {
            if !tool_written.insert(key.clone()) {
                tracing::warn!(
                    key = %key,
                    tool = %outcome.call.name,
                    "state key written by multiple tool calls in one round; last writer wins"
                );
            }
            merged.state_delta.insert(key, value);
        }
        merged.artifact_delta.extend(actions.artifact_delta);
        match (&merged.transfer_to_agent, actions.transfer_to_agent) {
            (None, Some(target)) => merged.transfer_to_agent = Some(target),
            (Some(kept), Some(dropped)) => tracing::warn!(
                kept = %kept,
                dropped = %dropped,
                "multiple transfer targets in one tool round; keeping the first"
            ),
            _ => {}
        }
        merged.escalate |= actions.escalate;
        merged.skip_summarization |= actions.skip_summarization;
        merged
            .requested_tool_confirmations
            .extend(actions.requested_tool_confirmations);

        if outcome.long_running {
            if let Some(id) = outcome.call.id.clone() {
                long_running_tool_ids.push(id);
            }
        }
        parts.push(Part::function_response(FunctionResponse {
            name: outcome.call.name,
            id: outcome.call.id,
            response: outcome.response,
        }));
    }

    let mut event = Event::new(agent_name)
        .with_content(Content {
            role: Role::User,
            parts,
        })
        .with_actions(merged)
        .with_invocation(ctx.invocation_id.clone())
        .with_branch(ctx.branch.clone());
    event.long_running_tool_ids = long_running_tool_ids;
    event
}
