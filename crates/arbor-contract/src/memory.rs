//! Long-term memory service contract.

use crate::content::Content;
use crate::session::Session;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One recalled fragment of a past conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub content: Content,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Unix milliseconds of the originating event, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

/// Memory service failures.
#[derive(Debug, Clone, Error)]
pub enum MemoryServiceError {
    #[error("memory backend error: {0}")]
    Backend(String),

    #[error("memory service not configured")]
    NotConfigured,
}

/// Stores completed sessions and answers similarity queries over them.
#[async_trait]
pub trait MemoryService: Send + Sync {
    /// Ingest a session's events into memory.
    async fn add_session(&self, session: &Session) -> Result<(), MemoryServiceError>;

    /// Retrieve entries relevant to `query` for one user of one app.
    async fn search(
        &self,
        app_name: &str,
        user_id: &str,
        query: &str,
    ) -> Result<Vec<MemoryEntry>, MemoryServiceError>;
}
