//! The arbor execution engine: per-agent LLM↔tool loop, agent kinds, and
//! the plugin-aware runner over the session service.

pub mod agents;
mod control;
mod flow;
pub mod metrics;
pub mod runner;

pub use agents::{
    AgentCallback, CustomAgent, LlmAgent, LoopAgent, ParallelAgent, RunFn, SequentialAgent,
};
pub use metrics::{InMemorySink, Metrics, MetricsPlugin, MetricsSink, ModelSpan, ToolSpan};
pub use runner::{Runner, RunnerError};

/// Common imports for building on the runtime.
pub mod prelude {
    pub use crate::{
        CustomAgent, InMemorySink, LlmAgent, LoopAgent, MetricsPlugin, ParallelAgent, Runner,
        SequentialAgent,
    };
    pub use arbor_contract::{
        Agent, ArtifactService, CallbackContext, Content, Event, EventActions, EventStream,
        FunctionCall, FunctionDeclaration, FunctionResponse, FunctionTool, GetSessionConfig,
        InvocationContext, LlmRequest, LlmResponse, MemoryService, Model, ModelError, Part, Plugin,
        PluginChain, Role, RunConfig, Session, SessionService, Tool, ToolContext, ToolError,
        Toolset, TypedTool,
    };
}
