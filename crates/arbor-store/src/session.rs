//! In-memory session service for testing and local development.

use arbor_contract::session::state::{extract_deltas, merge_states, trim_temp_delta, StateMap};
use arbor_contract::{Event, GetSessionConfig, Session, SessionService, SessionServiceError};
use async_trait::async_trait;
use std::collections::HashMap;

fn now_unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_millis().min(u128::from(u64::MAX)) as u64)
}

#[derive(Default)]
struct StoredSession {
    /// Session-scope keys only; app/user slices live in their own stores.
    state: StateMap,
    events: Vec<Event>,
    last_update_time: u64,
}

#[derive(Default)]
struct Inner {
    app_state: HashMap<String, StateMap>,
    user_state: HashMap<(String, String), StateMap>,
    sessions: HashMap<(String, String, String), StoredSession>,
}

impl Inner {
    /// Merged state view: app ∪ user ∪ session, prefixes re-attached.
    fn state_view(&self, app_name: &str, user_id: &str, stored: &StoredSession) -> StateMap {
        let empty = StateMap::new();
        let app = self.app_state.get(app_name).unwrap_or(&empty);
        let user = self
            .user_state
            .get(&(app_name.to_string(), user_id.to_string()))
            .unwrap_or(&empty);
        merge_states(app, user, &stored.state)
    }

    fn merged_view(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        stored: &StoredSession,
    ) -> Session {
        Session {
            id: session_id.to_string(),
            app_name: app_name.to_string(),
            user_id: user_id.to_string(),
            state: self.state_view(app_name, user_id, stored),
            events: stored.events.clone(),
            last_update_time: stored.last_update_time,
        }
    }
}

/// In-memory storage: three indexed scope stores behind one lock. Writers
/// serialize through the write guard; readers observe consistent snapshots
/// of any completed write. Appends are atomic under the guard.
#[derive(Default)]
pub struct InMemorySessionService {
    inner: tokio::sync::RwLock<Inner>,
}

impl InMemorySessionService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionService for InMemorySessionService {
    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: Option<String>,
        initial_state: Option<StateMap>,
    ) -> Result<Session, SessionServiceError> {
        let session_id = session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let key = (
            app_name.to_string(),
            user_id.to_string(),
            session_id.clone(),
        );

        let mut inner = self.inner.write().await;
        if inner.sessions.contains_key(&key) {
            return Err(SessionServiceError::AlreadyExists(session_id));
        }

        let deltas = extract_deltas(&initial_state.unwrap_or_default());
        inner
            .app_state
            .entry(app_name.to_string())
            .or_default()
            .extend(deltas.app);
        inner
            .user_state
            .entry((app_name.to_string(), user_id.to_string()))
            .or_default()
            .extend(deltas.user);

        let stored = StoredSession {
            state: deltas.session,
            events: Vec::new(),
            last_update_time: now_unix_millis(),
        };
        let view = inner.merged_view(app_name, user_id, &session_id, &stored);
        inner.sessions.insert(key, stored);
        Ok(view)
    }

    async fn get_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        config: Option<GetSessionConfig>,
    ) -> Result<Session, SessionServiceError> {
        let inner = self.inner.read().await;
        let key = (
            app_name.to_string(),
            user_id.to_string(),
            session_id.to_string(),
        );
        let stored = inner
            .sessions
            .get(&key)
            .ok_or_else(|| SessionServiceError::NotFound(session_id.to_string()))?;
        let mut session = inner.merged_view(app_name, user_id, session_id, stored);

        if let Some(config) = config {
            if let Some(after) = config.after_timestamp {
                session.events.retain(|e| e.timestamp > after);
            }
            if let Some(limit) = config.num_recent_events {
                let skip = session.events.len().saturating_sub(limit);
                session.events.drain(..skip);
            }
        }
        Ok(session)
    }

    async fn list_sessions(
        &self,
        app_name: &str,
        user_id: &str,
    ) -> Result<Vec<Session>, SessionServiceError> {
        let inner = self.inner.read().await;
        let mut sessions: Vec<Session> = inner
            .sessions
            .iter()
            .filter(|((app, user, _), _)| app == app_name && user == user_id)
            .map(|((_, _, id), stored)| Session {
                id: id.clone(),
                app_name: app_name.to_string(),
                user_id: user_id.to_string(),
                state: inner.state_view(app_name, user_id, stored),
                // Listings are summaries; event logs come from get_session.
                events: Vec::new(),
                last_update_time: stored.last_update_time,
            })
            .collect();
        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(sessions)
    }

    async fn delete_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<(), SessionServiceError> {
        let mut inner = self.inner.write().await;
        inner.sessions.remove(&(
            app_name.to_string(),
            user_id.to_string(),
            session_id.to_string(),
        ));
        Ok(())
    }

    async fn append_event(
        &self,
        session: &mut Session,
        event: Event,
    ) -> Result<Event, SessionServiceError> {
        if event.partial {
            return Ok(event);
        }

        let key = (
            session.app_name.clone(),
            session.user_id.clone(),
            session.id.clone(),
        );
        let mut inner = self.inner.write().await;
        if !inner.sessions.contains_key(&key) {
            return Err(SessionServiceError::NotFound(session.id.clone()));
        }

        // Stamp inside the write guard: per-session timestamps never regress
        // even when the wall clock does.
        let last = inner
            .sessions
            .get(&key)
            .and_then(|s| s.events.last().map(|e| e.timestamp))
            .unwrap_or(0);
        let timestamp = now_unix_millis().max(last);

        let mut stamped = event;
        stamped.timestamp = timestamp;
        stamped.actions.state_delta = trim_temp_delta(&stamped.actions.state_delta);

        let deltas = extract_deltas(&stamped.actions.state_delta);
        inner
            .app_state
            .entry(session.app_name.clone())
            .or_default()
            .extend(deltas.app);
        inner
            .user_state
            .entry((session.app_name.clone(), session.user_id.clone()))
            .or_default()
            .extend(deltas.user);

        let stored = inner
            .sessions
            .get_mut(&key)
            .ok_or_else(|| SessionServiceError::NotFound(session.id.clone()))?;
        stored.state.extend(deltas.session);
        stored.events.push(stamped.clone());
        stored.last_update_time = timestamp;

        // Refresh the caller's snapshot so the running turn sees its commit.
        let stored = &inner.sessions[&key];
        session.state = inner.state_view(&session.app_name, &session.user_id, stored);
        session.events.push(stamped.clone());
        session.last_update_time = timestamp;

        Ok(stamped)
    }
}
