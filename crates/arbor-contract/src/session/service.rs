//! Session service contract.

use super::state::StateMap;
use super::Session;
use crate::event::Event;
use async_trait::async_trait;
use thiserror::Error;

/// Filters applied by [`SessionService::get_session`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GetSessionConfig {
    /// Keep only the last N events (applied after the time filter).
    pub num_recent_events: Option<usize>,
    /// Keep only events with `timestamp > after_timestamp` (unix ms).
    pub after_timestamp: Option<u64>,
}

/// Session service failures.
#[derive(Debug, Clone, Error)]
pub enum SessionServiceError {
    #[error("session not found: {0}")]
    NotFound(String),

    #[error("session already exists: {0}")]
    AlreadyExists(String),
}

/// The stateful authority over sessions and scoped state.
///
/// Writes serialize per service instance; reads observe the post-write
/// state of any completed write. `append_event` is atomic: either the
/// scoped deltas and the trimmed event are persisted together, or neither.
#[async_trait]
pub trait SessionService: Send + Sync {
    /// Create a session. A missing `session_id` gets a generated UUIDv4.
    /// `initial_state` is sliced by scope and persisted per store; the
    /// returned session exposes the merged view.
    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: Option<String>,
        initial_state: Option<StateMap>,
    ) -> Result<Session, SessionServiceError>;

    /// Fetch a session with the merged state view, optionally filtered.
    async fn get_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        config: Option<GetSessionConfig>,
    ) -> Result<Session, SessionServiceError>;

    /// All sessions of one user within an app.
    async fn list_sessions(
        &self,
        app_name: &str,
        user_id: &str,
    ) -> Result<Vec<Session>, SessionServiceError>;

    /// Delete a session. Idempotent.
    async fn delete_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<(), SessionServiceError>;

    /// Commit an event: stamp its timestamp, fan its state delta out to the
    /// scope stores, strip `temp:` keys, and append the trimmed event.
    /// Partial events are a no-op. The caller's `session` snapshot is
    /// updated in place so a running turn observes its own commits; the
    /// stamped event is returned.
    async fn append_event(
        &self,
        session: &mut Session,
        event: Event,
    ) -> Result<Event, SessionServiceError>;
}
