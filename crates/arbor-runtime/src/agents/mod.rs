//! The fixed agent kinds: LLM-driven, custom closures, and workflow
//! compositions. All compose through the [`Agent`] contract.

mod custom;
mod llm;
mod workflow;

pub use custom::{CustomAgent, RunFn};
pub use llm::LlmAgent;
pub use workflow::{LoopAgent, ParallelAgent, SequentialAgent};

use arbor_contract::{Agent, CallbackContext, Content, Event};
use std::sync::Arc;

/// Synchronous agent-boundary callback. The first callback returning
/// content short-circuits its boundary; state writes land in the
/// callback's actions buffer either way.
pub type AgentCallback = Arc<dyn Fn(&mut CallbackContext) -> Option<Content> + Send + Sync>;

/// Run the plugin `before_agent` fold, then the agent's own callbacks, in
/// order; the first non-`None` content wins.
pub(crate) async fn resolve_before_agent(
    agent: &dyn Agent,
    callbacks: &[AgentCallback],
    ctx: &mut CallbackContext,
) -> Option<Content> {
    let chain = ctx.invocation().plugins.clone();
    if let Some(content) = chain.before_agent(agent, ctx).await {
        return Some(content);
    }
    callbacks.iter().find_map(|cb| cb(ctx))
}

/// Same fold at the AFTER boundary.
pub(crate) async fn resolve_after_agent(
    agent: &dyn Agent,
    callbacks: &[AgentCallback],
    ctx: &mut CallbackContext,
) -> Option<Content> {
    let chain = ctx.invocation().plugins.clone();
    if let Some(content) = chain.after_agent(agent, ctx).await {
        return Some(content);
    }
    callbacks.iter().find_map(|cb| cb(ctx))
}

/// Synthetic event produced when a callback boundary short-circuits,
/// carrying the callback's accumulated actions.
pub(crate) fn callback_event(
    agent_name: &str,
    ctx: &mut CallbackContext,
    content: Content,
) -> Event {
    let invocation_id = ctx.invocation_id().to_string();
    let branch = ctx.invocation().branch.clone();
    Event::new(agent_name)
        .with_content(content)
        .with_actions(ctx.take_actions())
        .with_invocation(invocation_id)
        .with_branch(branch)
}
