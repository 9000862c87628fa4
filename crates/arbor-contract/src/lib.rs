//! Shared contracts for the arbor agent runtime: content and event models,
//! session state scoping, service traits, and the plugin SPI.

pub mod agent;
pub mod artifact;
pub mod content;
pub mod context;
pub mod event;
pub mod llm;
pub mod memory;
pub mod plugin;
pub mod session;
pub mod tool;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

// content
pub use content::{Blob, Content, FunctionCall, FunctionResponse, Part, PartKind, Role};

// event
pub use event::{Event, EventActions, ToolConfirmationRequest};

// session
pub use session::state::{
    extract_deltas, merge_states, scope_of, trim_temp_delta, ScopedDeltas, StateMap, StateScope,
    APP_PREFIX, TEMP_PREFIX, USER_PREFIX,
};
pub use session::{GetSessionConfig, Session, SessionService, SessionServiceError};

// services
pub use artifact::{
    validate_filename, ArtifactService, ArtifactServiceError, USER_ARTIFACT_SESSION_ID,
    USER_FILENAME_PREFIX,
};
pub use memory::{MemoryEntry, MemoryService, MemoryServiceError};

// llm
pub use llm::{LlmRequest, LlmResponse, Model, ModelError, UsageMetadata};

// tool
pub use tool::{
    validate_against_schema, FunctionDeclaration, FunctionTool, Tool, ToolError, Toolset, TypedTool,
};

// agent
pub use agent::{
    build_parent_map, find_agent, validate_unique_names, Agent, AgentTreeError, EventStream,
};

// contexts
pub use context::{CallbackContext, InvocationContext, RunConfig, ToolContext};

// plugin
pub use plugin::{Plugin, PluginChain, PluginChainError};
