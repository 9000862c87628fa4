//! The runner: owns the user-message → event-stream turn.

use async_stream::stream;
use arbor_contract::{
    find_agent, validate_unique_names, Agent, AgentTreeError, ArtifactService, Content, Event,
    EventStream, InvocationContext, MemoryService, Plugin, PluginChain, PluginChainError,
    RunConfig, SessionService, SessionServiceError,
};
use futures::StreamExt;
use std::sync::Arc;
use thiserror::Error;

/// Author stamped on the committed copy of the incoming user message.
const USER_AUTHOR: &str = "user";

/// Runner construction and session resolution failures.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Session(#[from] SessionServiceError),

    #[error(transparent)]
    Plugins(#[from] PluginChainError),

    #[error(transparent)]
    Tree(#[from] AgentTreeError),
}

/// Drives one turn at a time: commits the user message, folds the runner
/// plugin hooks, streams the current agent, and handles transfer and
/// escalation. Every non-partial event is committed to the session before
/// it is yielded, so subscribers never observe an event the session does
/// not yet contain.
pub struct Runner {
    app_name: String,
    root_agent: Arc<dyn Agent>,
    session_service: Arc<dyn SessionService>,
    artifact_service: Option<Arc<dyn ArtifactService>>,
    memory_service: Option<Arc<dyn MemoryService>>,
    plugins: Arc<PluginChain>,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("app_name", &self.app_name)
            .field("root_agent", &self.root_agent.name())
            .field("plugins", &self.plugins)
            .finish_non_exhaustive()
    }
}

impl Runner {
    /// Build a runner over an agent tree. Fails on duplicate agent names.
    pub fn new(
        app_name: impl Into<String>,
        root_agent: Arc<dyn Agent>,
        session_service: Arc<dyn SessionService>,
    ) -> Result<Self, RunnerError> {
        validate_unique_names(&root_agent)?;
        Ok(Self {
            app_name: app_name.into(),
            root_agent,
            session_service,
            artifact_service: None,
            memory_service: None,
            plugins: Arc::new(PluginChain::empty()),
        })
    }

    /// Install the plugin chain. Fails on duplicate plugin names.
    pub fn with_plugins(mut self, plugins: Vec<Arc<dyn Plugin>>) -> Result<Self, RunnerError> {
        self.plugins = Arc::new(PluginChain::new(plugins)?);
        Ok(self)
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

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn root_agent(&self) -> &Arc<dyn Agent> {
        &self.root_agent
    }

    /// Run one turn with default per-turn configuration.
    pub async fn run(
        &self,
        user_id: &str,
        session_id: &str,
        new_message: Content,
    ) -> Result<EventStream, RunnerError> {
        self.run_with_config(user_id, session_id, new_message, RunConfig::default())
            .await
    }

    /// Run one turn. The session must already exist — creation is an
    /// explicit `SessionService::create_session` call.
    pub async fn run_with_config(
        &self,
        user_id: &str,
        session_id: &str,
        new_message: Content,
        run_config: RunConfig,
    ) -> Result<EventStream, RunnerError> {
        let session = self
            .session_service
            .get_session(&self.app_name, user_id, session_id, None)
            .await?;

        let root = self.root_agent.clone();
        let session_service = self.session_service.clone();
        let artifact_service = self.artifact_service.clone();
        let memory_service = self.memory_service.clone();
        let plugins = self.plugins.clone();

        Ok(Box::pin(stream! {
            let mut base_ctx = InvocationContext::new(
                root.clone(),
                session,
                session_service.clone(),
            )
            .with_run_config(run_config)
            .with_plugins(plugins.clone());
            if let Some(service) = artifact_service {
                base_ctx = base_ctx.with_artifact_service(service);
            }
            if let Some(service) = memory_service {
                base_ctx = base_ctx.with_memory_service(service);
            }

            let content = plugins
                .on_user_message(&base_ctx, &new_message)
                .await
                .unwrap_or(new_message);
            let mut base_ctx = base_ctx.with_user_content(content.clone());
            let invocation_id = base_ctx.invocation_id.clone();
            tracing::debug!(invocation_id = %invocation_id, agent = %root.name(), "turn start");

            let mut session = base_ctx.session.clone();
            let user_event = Event::new(USER_AUTHOR)
                .with_content(content)
                .with_invocation(invocation_id.clone());
            let user_event = match session_service.append_event(&mut session, user_event).await {
                Ok(stamped) => stamped,
                Err(err) => {
                    yield Event::error(root.name(), "session_error", err.to_string());
                    return;
                }
            };
            base_ctx = base_ctx.with_session(session.clone());
            yield user_event;

            if let Some(content) = plugins.before_run(&base_ctx).await {
                let event = Event::new(root.name())
                    .with_content(content)
                    .with_invocation(invocation_id.clone());
                match session_service.append_event(&mut session, event).await {
                    Ok(stamped) => yield stamped,
                    Err(err) => {
                        yield Event::error(root.name(), "session_error", err.to_string());
                    }
                }
                plugins.after_run(&base_ctx).await;
                return;
            }

            let mut current = root.clone();
            'agents: loop {
                let agent_ctx = base_ctx
                    .clone()
                    .with_agent(current.clone())
                    .with_session(session.clone());
                let mut events = current.clone().run(agent_ctx);
                let mut next_agent: Option<Arc<dyn Agent>> = None;

                while let Some(event) = events.next().await {
                    let event = plugins.on_event(&base_ctx, &event).await.unwrap_or(event);
                    let committed = if event.partial {
                        event
                    } else {
                        match session_service.append_event(&mut session, event).await {
                            Ok(stamped) => stamped,
                            Err(err) => {
                                yield Event::error(
                                    current.name(),
                                    "session_error",
                                    err.to_string(),
                                );
                                break 'agents;
                            }
                        }
                    };
                    let transfer = committed.actions.transfer_to_agent.clone();
                    let escalated = committed.actions.escalate;
                    yield committed;

                    if let Some(target) = transfer {
                        // Targets resolve from the root, not the current
                        // agent, so siblings and ancestors are reachable.
                        match find_agent(&root, &target) {
                            Some(found) => {
                                next_agent = Some(found);
                                break;
                            }
                            None => {
                                let error_event = Event::error(
                                    current.name(),
                                    "transfer_target_missing",
                                    format!("transfer target not in agent tree: {target}"),
                                )
                                .with_invocation(invocation_id.clone());
                                match session_service
                                    .append_event(&mut session, error_event)
                                    .await
                                {
                                    Ok(stamped) => yield stamped,
                                    Err(err) => {
                                        yield Event::error(
                                            current.name(),
                                            "session_error",
                                            err.to_string(),
                                        );
                                    }
                                }
                                break 'agents;
                            }
                        }
                    }
                    if escalated {
                        break 'agents;
                    }
                }

                match next_agent {
                    Some(agent) => {
                        tracing::debug!(
                            from = %current.name(),
                            to = %agent.name(),
                            "agent transfer"
                        );
                        current = agent;
                    }
                    None => break 'agents,
                }
            }

            plugins.after_run(&base_ctx).await;
        }))
    }
}
