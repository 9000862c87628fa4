//! The model-driven agent kind.

use super::AgentCallback;
use arbor_contract::{Agent, EventStream, InvocationContext, Model, Tool, Toolset};
use std::sync::Arc;

/// An agent whose body is the LLM↔tool loop: it calls its model, fans out
/// requested tools, and repeats until a final response.
pub struct LlmAgent {
    pub(crate) name: String,
    pub(crate) description: String,
    /// System instruction sent with every model request.
    pub(crate) instruction: String,
    pub(crate) model: Arc<dyn Model>,
    pub(crate) tools: Vec<Arc<dyn Tool>>,
    pub(crate) toolsets: Vec<Arc<dyn Toolset>>,
    pub(crate) sub_agents: Vec<Arc<dyn Agent>>,
    pub(crate) before_callbacks: Vec<AgentCallback>,
    pub(crate) after_callbacks: Vec<AgentCallback>,
}

impl LlmAgent {
    pub fn new(name: impl Into<String>, model: Arc<dyn Model>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            instruction: String::new(),
            model,
            tools: Vec::new(),
            toolsets: Vec::new(),
            sub_agents: Vec::new(),
            before_callbacks: Vec::new(),
            after_callbacks: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    #[must_use]
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    #[must_use]
    pub fn with_tools(mut self, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.tools = tools;
        self
    }

    #[must_use]
    pub fn with_toolset(mut self, toolset: Arc<dyn Toolset>) -> Self {
        self.toolsets.push(toolset);
        self
    }

    #[must_use]
    pub fn with_sub_agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.sub_agents.push(agent);
        self
    }

    #[must_use]
    pub fn with_sub_agents(mut self, agents: Vec<Arc<dyn Agent>>) -> Self {
        self.sub_agents = agents;
        self
    }

    #[must_use]
    pub fn with_before_agent_callback(mut self, callback: AgentCallback) -> Self {
        self.before_callbacks.push(callback);
        self
    }

    #[must_use]
    pub fn with_after_agent_callback(mut self, callback: AgentCallback) -> Self {
        self.after_callbacks.push(callback);
        self
    }
}

impl Agent for LlmAgent {
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
        crate::flow::run_flow(self, ctx)
    }
}
