//! Test fixtures shared by contract consumers. Compiled for tests and the
//! `test-support` feature only.

use crate::agent::{Agent, EventStream};
use crate::context::InvocationContext;
use crate::event::Event;
use crate::session::state::StateMap;
use crate::session::{GetSessionConfig, Session, SessionService, SessionServiceError};
use async_trait::async_trait;
use std::sync::Arc;

/// Agent that yields nothing; useful wherever a tree node is required.
pub struct StubAgent {
    name: String,
}

impl StubAgent {
    pub fn named(name: impl Into<String>) -> Arc<dyn Agent> {
        Arc::new(Self { name: name.into() })
    }
}

impl Agent for StubAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(self: Arc<Self>, _ctx: InvocationContext) -> EventStream {
        Box::pin(futures::stream::empty())
    }
}

/// Session service that accepts appends without persisting anything.
pub struct NoopSessionService;

#[async_trait]
impl SessionService for NoopSessionService {
    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: Option<String>,
        initial_state: Option<StateMap>,
    ) -> Result<Session, SessionServiceError> {
        let mut session = Session::new(
            session_id.unwrap_or_else(|| "s".to_string()),
            app_name,
            user_id,
        );
        session.state = initial_state.unwrap_or_default();
        Ok(session)
    }

    async fn get_session(
        &self,
        _app_name: &str,
        _user_id: &str,
        session_id: &str,
        _config: Option<GetSessionConfig>,
    ) -> Result<Session, SessionServiceError> {
        Err(SessionServiceError::NotFound(session_id.to_string()))
    }

    async fn list_sessions(
        &self,
        _app_name: &str,
        _user_id: &str,
    ) -> Result<Vec<Session>, SessionServiceError> {
        Ok(vec![])
    }

    async fn delete_session(
        &self,
        _app_name: &str,
        _user_id: &str,
        _session_id: &str,
    ) -> Result<(), SessionServiceError> {
        Ok(())
    }

    async fn append_event(
        &self,
        session: &mut Session,
        event: Event,
    ) -> Result<Event, SessionServiceError> {
        if !event.partial {
            session.events.push(event.clone());
        }
        Ok(event)
    }
}

/// An invocation context over a fresh `(app, u1, s1)` session and a stub
/// agent, for exercising contexts and plugin hooks in isolation.
pub fn test_invocation() -> InvocationContext {
    InvocationContext::new(
        StubAgent::named("stub"),
        Session::new("s1", "app", "u1"),
        Arc::new(NoopSessionService),
    )
}
