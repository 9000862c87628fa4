//! User-defined agents: a closure-produced event stream wrapped in the
//! BEFORE/STREAM/AFTER callback machine.

use super::{callback_event, resolve_after_agent, resolve_before_agent, AgentCallback};
use async_stream::stream;
use arbor_contract::{Agent, CallbackContext, EventStream, InvocationContext};
use futures::StreamExt;
use std::sync::Arc;

/// Closure producing an agent's event stream for one invocation.
pub type RunFn = Arc<dyn Fn(InvocationContext) -> EventStream + Send + Sync>;

/// An agent defined by a user closure plus before/after callback lists.
///
/// BEFORE runs first: the first callback returning content short-circuits
/// the whole run with a synthetic event. Otherwise the closure's stream is
/// forwarded (authorless events get this agent's name), then AFTER runs
/// with the same short-circuit rule.
pub struct CustomAgent {
    name: String,
    description: String,
    run_fn: Option<RunFn>,
    before_callbacks: Vec<AgentCallback>,
    after_callbacks: Vec<AgentCallback>,
    sub_agents: Vec<Arc<dyn Agent>>,
}

impl CustomAgent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            run_fn: None,
            before_callbacks: Vec::new(),
            after_callbacks: Vec::new(),
            sub_agents: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_run<F>(mut self, run_fn: F) -> Self
    where
        F: Fn(InvocationContext) -> EventStream + Send + Sync + 'static,
    {
        self.run_fn = Some(Arc::new(run_fn));
        self
    }

    #[must_use]
    pub fn with_before_callback(mut self, callback: AgentCallback) -> Self {
        self.before_callbacks.push(callback);
        self
    }

    #[must_use]
    pub fn with_after_callback(mut self, callback: AgentCallback) -> Self {
        self.after_callbacks.push(callback);
        self
    }

    #[must_use]
    pub fn with_sub_agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.sub_agents.push(agent);
        self
    }
}

impl Agent for CustomAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn sub_agents(&self) -> &[Arc<dyn Agent>] {
        &self.sub_agents
    }

    fn run(self: Arc<Self>, ctx: InvocationContext) -> EventStream {
        Box::pin(stream! {
            let mut before_ctx = CallbackContext::new(ctx.clone());
            if let Some(content) =
                resolve_before_agent(&*self, &self.before_callbacks, &mut before_ctx).await
            {
                yield callback_event(&self.name, &mut before_ctx, content);
                return;
            }

            if let Some(run_fn) = &self.run_fn {
                let mut inner = run_fn(ctx.clone());
                while let Some(mut event) = inner.next().await {
                    if event.author.is_none() {
                        event.author = Some(self.name.clone());
                    }
                    if event.invocation_id.is_none() {
                        event.invocation_id = Some(ctx.invocation_id.clone());
                    }
                    if event.branch.is_none() {
                        event.branch = ctx.branch.clone();
                    }
                    yield event;
                }
            }

            let mut after_ctx = CallbackContext::new(ctx.clone());
            if let Some(content) =
                resolve_after_agent(&*self, &self.after_callbacks, &mut after_ctx).await
            {
                yield callback_event(&self.name, &mut after_ctx, content);
            }
        })
    }
}
