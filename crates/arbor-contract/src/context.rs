//! The three nested execution contexts threaded through a turn.
//!
//! `InvocationContext` lives for one turn, `CallbackContext` for one
//! callback boundary, `ToolContext` for one function-call id. All three are
//! copy-on-write snapshots: reads see the session as of the turn start plus
//! locally buffered writes, and mutations accumulate in actions buffers
//! applied centrally at append.

use crate::agent::Agent;
use crate::artifact::{ArtifactService, ArtifactServiceError};
use crate::content::{Content, Part};
use crate::event::{EventActions, ToolConfirmationRequest};
use crate::memory::{MemoryEntry, MemoryService, MemoryServiceError};
use crate::plugin::PluginChain;
use crate::session::{Session, SessionService};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Per-turn knobs.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Upper bound on model rounds within one agent flow.
    pub max_iterations: usize,
    /// Timeout applied to each individual model call.
    pub model_timeout: Option<Duration>,
    /// Timeout applied to each individual tool call.
    pub tool_timeout: Option<Duration>,
    /// Cooperative cancellation for the whole turn. Clone the token before
    /// starting the run to retain a handle.
    pub cancellation: CancellationToken,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            model_timeout: None,
            tool_timeout: None,
            cancellation: CancellationToken::new(),
        }
    }
}

/// Immutable per-turn context. Updates produce a new value; the `ended`
/// flag is the one piece of shared mutable signal, so a callback deep in
/// the tree can end the whole invocation.
#[derive(Clone)]
pub struct InvocationContext {
    pub agent: Arc<dyn Agent>,
    pub session: Session,
    pub invocation_id: String,
    pub branch: Option<String>,
    pub user_content: Option<Content>,
    pub run_config: RunConfig,
    pub session_service: Arc<dyn SessionService>,
    pub artifact_service: Option<Arc<dyn ArtifactService>>,
    pub memory_service: Option<Arc<dyn MemoryService>>,
    pub plugins: Arc<PluginChain>,
    ended: Arc<AtomicBool>,
}

impl InvocationContext {
    pub fn new(
        agent: Arc<dyn Agent>,
        session: Session,
        session_service: Arc<dyn SessionService>,
    ) -> Self {
        Self {
            agent,
            session,
            invocation_id: uuid::Uuid::new_v4().to_string(),
            branch: None,
            user_content: None,
            run_config: RunConfig::default(),
            session_service,
            artifact_service: None,
            memory_service: None,
            plugins: Arc::new(PluginChain::empty()),
            ended: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn with_agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.agent = agent;
        self
    }

    #[must_use]
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    #[must_use]
    pub fn with_user_content(mut self, content: Content) -> Self {
        self.user_content = Some(content);
        self
    }

    #[must_use]
    pub fn with_run_config(mut self, run_config: RunConfig) -> Self {
        self.run_config = run_config;
        self
    }

    #[must_use]
    pub fn with_plugins(mut self, plugins: Arc<PluginChain>) -> Self {
        self.plugins = plugins;
        self
    }

    #[must_use]
    pub fn with_artifact_service(mut self, service: Arc<dyn ArtifactService>) -> Self {
        self.artifact_service = Some(service);
        self
    }

    #[must_use]
    pub fn with_memory_service(mut self, service: Arc<dyn MemoryService>) -> Self {
        self.memory_service = Some(service);
        self
    }

    /// Replace the session snapshot (used when re-entering after transfer).
    #[must_use]
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = session;
        self
    }

    pub fn app_name(&self) -> &str {
        &self.session.app_name
    }

    pub fn user_id(&self) -> &str {
        &self.session.user_id
    }

    pub fn session_id(&self) -> &str {
        &self.session.id
    }

    /// Signal that the turn should not continue past the current step.
    pub fn end_invocation(&self) {
        self.ended.store(true, Ordering::SeqCst);
    }

    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.run_config.cancellation.is_cancelled()
    }
}

/// Context handed to callbacks at agent and model boundaries. Reads fall
/// through the local actions buffer to the session snapshot; writes land
/// only in the buffer.
pub struct CallbackContext {
    invocation: InvocationContext,
    pub actions: EventActions,
}

impl CallbackContext {
    pub fn new(invocation: InvocationContext) -> Self {
        Self {
            invocation,
            actions: EventActions::default(),
        }
    }

    pub fn invocation(&self) -> &InvocationContext {
        &self.invocation
    }

    pub fn agent_name(&self) -> &str {
        self.invocation.agent.name()
    }

    pub fn invocation_id(&self) -> &str {
        &self.invocation.invocation_id
    }

    pub fn session_id(&self) -> &str {
        self.invocation.session_id()
    }

    pub fn app_name(&self) -> &str {
        self.invocation.app_name()
    }

    pub fn user_id(&self) -> &str {
        self.invocation.user_id()
    }

    pub fn user_content(&self) -> Option<&Content> {
        self.invocation.user_content.as_ref()
    }

    /// Read-through: buffered delta first, then the session snapshot.
    pub fn get_state(&self, key: &str) -> Option<&Value> {
        self.actions
            .state_delta
            .get(key)
            .or_else(|| self.invocation.session.state.get(key))
    }

    /// Buffer a state write; applied when the owning event is appended.
    pub fn set_state(&mut self, key: impl Into<String>, value: Value) {
        self.actions.state_delta.insert(key.into(), value);
    }

    pub fn end_invocation(&self) {
        self.invocation.end_invocation();
    }

    pub async fn search_memory(
        &self,
        query: &str,
    ) -> Result<Vec<MemoryEntry>, MemoryServiceError> {
        let service = self
            .invocation
            .memory_service
            .as_ref()
            .ok_or(MemoryServiceError::NotConfigured)?;
        service
            .search(self.app_name(), self.user_id(), query)
            .await
    }

    pub fn take_actions(&mut self) -> EventActions {
        std::mem::take(&mut self.actions)
    }
}

/// Context for one tool call. Owns its own actions buffer on top of the
/// wrapped callback layer, plus artifact access keyed to the invocation.
pub struct ToolContext {
    callback: CallbackContext,
    pub function_call_id: String,
    pub actions: EventActions,
}

impl ToolContext {
    pub fn new(invocation: InvocationContext, function_call_id: impl Into<String>) -> Self {
        Self {
            callback: CallbackContext::new(invocation),
            function_call_id: function_call_id.into(),
            actions: EventActions::default(),
        }
    }

    pub fn callback(&self) -> &CallbackContext {
        &self.callback
    }

    pub fn invocation(&self) -> &InvocationContext {
        self.callback.invocation()
    }

    pub fn agent_name(&self) -> &str {
        self.callback.agent_name()
    }

    /// Read-through: tool buffer, then callback buffer, then session.
    pub fn get_state(&self, key: &str) -> Option<&Value> {
        self.actions
            .state_delta
            .get(key)
            .or_else(|| self.callback.get_state(key))
    }

    pub fn set_state(&mut self, key: impl Into<String>, value: Value) {
        self.actions.state_delta.insert(key.into(), value);
    }

    /// Hand control to another agent in the tree after this round.
    pub fn transfer_to_agent(&mut self, agent_name: impl Into<String>) {
        self.actions.transfer_to_agent = Some(agent_name.into());
    }

    /// Escalate to the parent agent; ends the current agent's loop.
    pub fn escalate(&mut self) {
        self.actions.escalate = true;
    }

    /// Present this call's raw result without a summarization round.
    pub fn skip_summarization(&mut self) {
        self.actions.skip_summarization = true;
    }

    /// Ask the outer application to confirm this call.
    pub fn request_confirmation(&mut self, tool_name: impl Into<String>, hint: Option<String>) {
        self.actions
            .requested_tool_confirmations
            .push(ToolConfirmationRequest {
                function_call_id: self.function_call_id.clone(),
                tool_name: tool_name.into(),
                hint,
            });
    }

    /// Store a new artifact version and record it in the artifact delta.
    pub async fn save_artifact(
        &mut self,
        filename: &str,
        part: Part,
    ) -> Result<u64, ArtifactServiceError> {
        let invocation = self.callback.invocation();
        let service = invocation
            .artifact_service
            .as_ref()
            .ok_or(ArtifactServiceError::NotConfigured)?;
        let version = service
            .save_artifact(
                invocation.app_name(),
                invocation.user_id(),
                invocation.session_id(),
                filename,
                part,
            )
            .await?;
        self.actions
            .artifact_delta
            .insert(filename.to_string(), version);
        Ok(version)
    }

    pub async fn load_artifact(
        &self,
        filename: &str,
        version: Option<u64>,
    ) -> Result<Option<Part>, ArtifactServiceError> {
        let invocation = self.callback.invocation();
        let service = invocation
            .artifact_service
            .as_ref()
            .ok_or(ArtifactServiceError::NotConfigured)?;
        service
            .load_artifact(
                invocation.app_name(),
                invocation.user_id(),
                invocation.session_id(),
                filename,
                version,
            )
            .await
    }

    pub async fn list_artifacts(&self) -> Result<Vec<String>, ArtifactServiceError> {
        let invocation = self.callback.invocation();
        let service = invocation
            .artifact_service
            .as_ref()
            .ok_or(ArtifactServiceError::NotConfigured)?;
        service
            .list_artifact_keys(
                invocation.app_name(),
                invocation.user_id(),
                invocation.session_id(),
            )
            .await
    }

    pub async fn search_memory(
        &self,
        query: &str,
    ) -> Result<Vec<MemoryEntry>, MemoryServiceError> {
        self.callback.search_memory(query).await
    }

    pub fn take_actions(&mut self) -> EventActions {
        std::mem::take(&mut self.actions)
    }
}
