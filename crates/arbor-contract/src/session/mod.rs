//! Session record and the service contract that owns it.

pub mod service;
pub mod state;

use crate::event::Event;
use serde::{Deserialize, Serialize};
use state::StateMap;

pub use service::{GetSessionConfig, SessionService, SessionServiceError};

/// Per-(app, user, id) record of events and merged state.
///
/// The `state` map on a session returned from a read is the merged view:
/// app-scope ∪ user-scope ∪ session-scope with prefixes re-attached.
/// `temp:` keys never appear, and `events` never contains a partial event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub app_name: String,
    pub user_id: String,
    #[serde(default)]
    pub state: StateMap,
    #[serde(default)]
    pub events: Vec<Event>,
    /// Unix milliseconds of the most recent append.
    #[serde(default)]
    pub last_update_time: u64,
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        app_name: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            app_name: app_name.into(),
            user_id: user_id.into(),
            state: StateMap::new(),
            events: Vec::new(),
            last_update_time: 0,
        }
    }
}
