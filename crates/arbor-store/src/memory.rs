//! In-memory long-term memory with keyword search.

use arbor_contract::{MemoryEntry, MemoryService, MemoryServiceError, Session};
use async_trait::async_trait;
use std::collections::HashMap;

/// Reference memory backend: stores event contents per (app, user) and
/// answers queries by case-insensitive word matching.
#[derive(Default)]
pub struct InMemoryMemoryService {
    inner: tokio::sync::RwLock<HashMap<(String, String), Vec<MemoryEntry>>>,
}

impl InMemoryMemoryService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryService for InMemoryMemoryService {
    async fn add_session(&self, session: &Session) -> Result<(), MemoryServiceError> {
        let entries: Vec<MemoryEntry> = session
            .events
            .iter()
            .filter_map(|event| {
                let content = event.content.clone()?;
                if content.text().is_empty() {
                    return None;
                }
                Some(MemoryEntry {
                    content,
                    author: event.author.clone(),
                    timestamp: Some(event.timestamp),
                })
            })
            .collect();

        let mut inner = self.inner.write().await;
        inner
            .entry((session.app_name.clone(), session.user_id.clone()))
            .or_default()
            .extend(entries);
        Ok(())
    }

    async fn search(
        &self,
        app_name: &str,
        user_id: &str,
        query: &str,
    ) -> Result<Vec<MemoryEntry>, MemoryServiceError> {
        let words: Vec<String> = query
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .collect();
        if words.is_empty() {
            return Ok(vec![]);
        }

        let inner = self.inner.read().await;
        let entries = inner
            .get(&(app_name.to_string(), user_id.to_string()))
            .map(|entries| {
                entries
                    .iter()
                    .filter(|entry| {
                        let text = entry.content.text().to_lowercase();
                        words.iter().any(|w| text.contains(w.as_str()))
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(entries)
    }
}
