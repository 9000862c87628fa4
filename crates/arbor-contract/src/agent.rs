//! Agent capability contract and tree utilities.

use crate::context::InvocationContext;
use crate::event::Event;
use futures::Stream;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Lazy event sequence produced by one agent run. Pull-based: dropping the
/// stream cancels in-flight work at the next suspension point.
pub type EventStream = Pin<Box<dyn Stream<Item = Event> + Send>>;

/// Agent tree validation errors.
#[derive(Debug, Clone, Error)]
pub enum AgentTreeError {
    #[error("duplicate agent name in tree: {0}")]
    DuplicateName(String),
}

/// The polymorphic agent capability. Fixed kinds (LLM, custom, workflow)
/// and user extensions all compose through this interface.
pub trait Agent: Send + Sync {
    /// Unique name within the agent tree.
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn sub_agents(&self) -> &[Arc<dyn Agent>] {
        &[]
    }

    /// Drive one invocation, yielding events lazily. The context is a
    /// copy-on-write snapshot owned by this run.
    fn run(self: Arc<Self>, ctx: InvocationContext) -> EventStream;
}

/// Depth-first search for an agent by name, including the root itself.
pub fn find_agent(root: &Arc<dyn Agent>, name: &str) -> Option<Arc<dyn Agent>> {
    if root.name() == name {
        return Some(root.clone());
    }
    for child in root.sub_agents() {
        if let Some(found) = find_agent(child, name) {
            return Some(found);
        }
    }
    None
}

/// Map every descendant's name to its parent. The root has no entry.
pub fn build_parent_map(root: &Arc<dyn Agent>) -> HashMap<String, Arc<dyn Agent>> {
    let mut map = HashMap::new();
    let mut stack = vec![root.clone()];
    while let Some(agent) = stack.pop() {
        for child in agent.sub_agents() {
            map.insert(child.name().to_string(), agent.clone());
            stack.push(child.clone());
        }
    }
    map
}

/// Reject trees with duplicate agent names; the first duplicate found in
/// DFS order short-circuits.
pub fn validate_unique_names(root: &Arc<dyn Agent>) -> Result<(), AgentTreeError> {
    fn walk(
        agent: &Arc<dyn Agent>,
        seen: &mut std::collections::HashSet<String>,
    ) -> Result<(), AgentTreeError> {
        if !seen.insert(agent.name().to_string()) {
            return Err(AgentTreeError::DuplicateName(agent.name().to_string()));
        }
        for child in agent.sub_agents() {
            walk(child, seen)?;
        }
        Ok(())
    }
    walk(root, &mut std::collections::HashSet::new())
}
