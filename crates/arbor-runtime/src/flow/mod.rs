//! The per-agent loop: alternate model calls and tool rounds until a final
//! response.
//!
//! Each iteration folds the `before_model` chain, calls the model (unless
//! short-circuited), folds `after_model`, yields the response event, fans
//! out any function calls, and yields the merged tool-results event. The
//! loop ends on a final response, escalate, transfer, error, cancellation,
//! or the iteration limit.

mod tool_exec;

pub(crate) use tool_exec::execute_tool_round;

use crate::agents::{callback_event, resolve_after_agent, resolve_before_agent, LlmAgent};
use crate::control::{await_controlled, Controlled};
use async_stream::stream;
use arbor_contract::{
    Agent, CallbackContext, Content, Event, EventStream, FunctionCall, FunctionDeclaration,
    InvocationContext, LlmRequest, ModelError, Tool,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::Instrument;

/// How an agent's loop ended. Only normal completions run the AFTER
/// boundary; transfers and escalations hand control elsewhere.
enum FlowEnd {
    Completed,
    Transferred,
    Escalated,
    Errored,
    Cancelled,
    Ended,
    IterationLimit,
}

fn stamp(ctx: &InvocationContext, event: Event) -> Event {
    event
        .with_invocation(ctx.invocation_id.clone())
        .with_branch(ctx.branch.clone())
}

/// Project committed session events into model-visible conversation turns.
fn project_conversation(ctx: &InvocationContext) -> Vec<Content> {
    ctx.session
        .events
        .iter()
        .filter(|e| !e.partial)
        .filter_map(|e| e.content.clone())
        .collect()
}

/// Static tools concatenated with each toolset's contribution. A failing
/// toolset degrades to nothing and never aborts the turn.
async fn compose_catalog(agent: &LlmAgent, ctx: &InvocationContext) -> Vec<Arc<dyn Tool>> {
    let mut tools = agent.tools.clone();
    for toolset in &agent.toolsets {
        match toolset.tools(ctx).await {
            Ok(mut contributed) => tools.append(&mut contributed),
            Err(err) => tracing::warn!(
                toolset = %toolset.name(),
                error = %err,
                "toolset failed to resolve; continuing without its tools"
            ),
        }
    }
    tools
}

pub(crate) fn run_flow(agent: Arc<LlmAgent>, ctx: InvocationContext) -> EventStream {
    Box::pin(stream! {
        let agent_name = agent.name().to_string();
        let chain = ctx.plugins.clone();

        let mut before_ctx = CallbackContext::new(ctx.clone());
        if let Some(content) =
            resolve_before_agent(&*agent, &agent.before_callbacks, &mut before_ctx).await
        {
            yield callback_event(&agent_name, &mut before_ctx, content);
            return;
        }
        // Writes made by pass-through BEFORE callbacks ride the first
        // committed event of the loop.
        let mut carried_actions = before_ctx.take_actions();

        let tools = compose_catalog(&agent, &ctx).await;
        let declarations: Vec<FunctionDeclaration> =
            tools.iter().map(|t| t.declaration()).collect();
        let catalog: HashMap<String, Arc<dyn Tool>> = tools
            .iter()
            .map(|t| (t.declaration().name, t.clone()))
            .collect();

        let mut conversation = project_conversation(&ctx);

        let mut iterations = 0usize;
        let end = loop {
            if ctx.is_cancelled() {
                break FlowEnd::Cancelled;
            }
            if iterations >= ctx.run_config.max_iterations {
                break FlowEnd::IterationLimit;
            }
            iterations += 1;

            let mut request = LlmRequest {
                system_instruction: (!agent.instruction.is_empty())
                    .then(|| agent.instruction.clone()),
                contents: conversation.clone(),
                tools: declarations.clone(),
            };
            let mut model_ctx = CallbackContext::new(ctx.clone());
            model_ctx.actions = std::mem::take(&mut carried_actions);

            let response = match chain.before_model(&mut model_ctx, &mut request).await {
                Some(short_circuited) => short_circuited,
                None => {
                    let span = tracing::info_span!(
                        "llm_generate",
                        agent = %agent_name,
                        model = %agent.model.name(),
                    );
                    let controlled = await_controlled(
                        &ctx.run_config.cancellation,
                        ctx.run_config.model_timeout,
                        agent.model.generate_content(request),
                    );
                    let result = match controlled.instrument(span).await {
                        Controlled::Value(result) => result,
                        Controlled::Cancelled => break FlowEnd::Cancelled,
                        Controlled::TimedOut(ms) => Err(ModelError::Timeout(ms)),
                    };
                    match result {
                        Ok(response) => response,
                        Err(err) => match chain.on_model_error(&mut model_ctx, &err).await {
                            Some(recovered) => recovered,
                            None => {
                                yield stamp(
                                    &ctx,
                                    Event::error(&agent_name, "model_error", err.to_string()),
                                );
                                break FlowEnd::Errored;
                            }
                        },
                    }
                }
            };
            let response = match chain.after_model(&mut model_ctx, &response).await {
                Some(replaced) => replaced,
                None => response,
            };

            let mut event = stamp(&ctx, Event::from_llm_response(&agent_name, response));
            let calls: Vec<FunctionCall> =
                event.function_calls().into_iter().cloned().collect();
            if calls.is_empty() {
                // No tool round to carry them, so the model-boundary buffer
                // attaches to the response event itself.
                event.actions = model_ctx.take_actions();
            }
            if !event.partial {
                if let Some(content) = &event.content {
                    conversation.push(content.clone());
                }
            }
            let response_is_final = event.is_final_response();
            yield event;
            if ctx.is_ended() {
                break FlowEnd::Ended;
            }

            if calls.is_empty() {
                if response_is_final {
                    break FlowEnd::Completed;
                }
                // Partial placeholder; keep the loop going.
                continue;
            }

            let tool_event = execute_tool_round(
                &agent_name,
                &ctx,
                &catalog,
                &calls,
                model_ctx.take_actions(),
            )
            .await;
            if let Some(content) = &tool_event.content {
                conversation.push(content.clone());
            }
            let transferred = tool_event.actions.transfer_to_agent.is_some();
            let escalated = tool_event.actions.escalate;
            let results_are_final = tool_event.is_final_response();
            yield tool_event;

            if transferred {
                break FlowEnd::Transferred;
            }
            if escalated {
                break FlowEnd::Escalated;
            }
            if results_are_final {
                break FlowEnd::Completed;
            }
            if ctx.is_ended() {
                break FlowEnd::Ended;
            }
        };

        if matches!(end, FlowEnd::IterationLimit) {
            yield stamp(
                &ctx,
                Event::error(
                    &agent_name,
                    "iteration_limit",
                    format!(
                        "agent '{agent_name}' exceeded {} model iterations",
                        ctx.run_config.max_iterations
                    ),
                ),
            );
        }

        match end {
            FlowEnd::Completed | FlowEnd::IterationLimit => {
                let mut after_ctx = CallbackContext::new(ctx.clone());
                if let Some(content) =
                    resolve_after_agent(&*agent, &agent.after_callbacks, &mut after_ctx).await
                {
                    yield callback_event(&agent_name, &mut after_ctx, content);
                }
            }
            FlowEnd::Transferred
            | FlowEnd::Escalated
            | FlowEnd::Errored
            | FlowEnd::Cancelled
            | FlowEnd::Ended => {}
        }
    })
}
