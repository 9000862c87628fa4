//! Deterministic orchestration agents: sequential, parallel, and looping
//! composition of sub-agents through the common contract.

use async_stream::stream;
use arbor_contract::{Agent, EventStream, InvocationContext};
use futures::stream::select_all;
use futures::StreamExt;
use std::sync::Arc;

fn child_branch(parent: Option<&str>, child: &str) -> String {
    match parent {
        Some(branch) => format!("{branch}.{child}"),
        None => child.to_string(),
    }
}

/// Runs its sub-agents one after another; an escalating event stops the
/// remaining sequence.
pub struct SequentialAgent {
    name: String,
    description: String,
    sub_agents: Vec<Arc<dyn Agent>>,
}

impl SequentialAgent {
    pub fn new(name: impl Into<String>, sub_agents: Vec<Arc<dyn Agent>>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            sub_agents,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl Agent for SequentialAgent {
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
            for child in &self.sub_agents {
                let child_ctx = ctx.clone().with_agent(child.clone());
                let mut events = child.clone().run(child_ctx);
                while let Some(event) = events.next().await {
                    let escalated = event.actions.escalate;
                    yield event;
                    if escalated {
                        return;
                    }
                }
                if ctx.is_ended() || ctx.is_cancelled() {
                    return;
                }
            }
        })
    }
}

/// Runs its sub-agents concurrently on disjoint branch labels and yields
/// their events as they arrive.
pub struct ParallelAgent {
    name: String,
    description: String,
    sub_agents: Vec<Arc<dyn Agent>>,
}

impl ParallelAgent {
    pub fn new(name: impl Into<String>, sub_agents: Vec<Arc<dyn Agent>>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            sub_agents,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl Agent for ParallelAgent {
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
        let streams: Vec<EventStream> = self
            .sub_agents
            .iter()
            .map(|child| {
                let branch = child_branch(ctx.branch.as_deref(), child.name());
                let child_ctx = ctx
                    .clone()
                    .with_agent(child.clone())
                    .with_branch(branch);
                child.clone().run(child_ctx)
            })
            .collect();
        Box::pin(select_all(streams))
    }
}

/// Repeats its sub-agents in order until one escalates or the iteration
/// cap is reached.
pub struct LoopAgent {
    name: String,
    description: String,
    sub_agents: Vec<Arc<dyn Agent>>,
    max_iterations: Option<usize>,
}

impl LoopAgent {
    pub fn new(name: impl Into<String>, sub_agents: Vec<Arc<dyn Agent>>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            sub_agents,
            max_iterations: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }
}

impl Agent for LoopAgent {
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
            let mut iteration = 0usize;
            loop {
                if let Some(cap) = self.max_iterations {
                    if iteration >= cap {
                        return;
                    }
                }
                iteration += 1;
                for child in &self.sub_agents {
                    let child_ctx = ctx.clone().with_agent(child.clone());
                    let mut events = child.clone().run(child_ctx);
                    while let Some(event) = events.next().await {
                        let escalated = event.actions.escalate;
                        yield event;
                        if escalated {
                            return;
                        }
                    }
                    if ctx.is_ended() || ctx.is_cancelled() {
                        return;
                    }
                }
            }
        })
    }
}
