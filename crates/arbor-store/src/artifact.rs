//! In-memory artifact storage with 1-based versioning.

use arbor_contract::{
    validate_filename, ArtifactService, ArtifactServiceError, Part, USER_ARTIFACT_SESSION_ID,
    USER_FILENAME_PREFIX,
};
use async_trait::async_trait;
use std::collections::HashMap;

type ArtifactKey = (String, String, String, String);

/// In-memory artifact store. `user:`-prefixed filenames land under the
/// sentinel session id so they are visible across a user's sessions.
#[derive(Default)]
pub struct InMemoryArtifactService {
    inner: tokio::sync::RwLock<HashMap<ArtifactKey, Vec<Part>>>,
}

impl InMemoryArtifactService {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(app_name: &str, user_id: &str, session_id: &str, filename: &str) -> ArtifactKey {
        let session_id = if filename.starts_with(USER_FILENAME_PREFIX) {
            USER_ARTIFACT_SESSION_ID
        } else {
            session_id
        };
        (
            app_name.to_string(),
            user_id.to_string(),
            session_id.to_string(),
            filename.to_string(),
        )
    }
}

#[async_trait]
impl ArtifactService for InMemoryArtifactService {
    async fn save_artifact(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        filename: &str,
        part: Part,
    ) -> Result<u64, ArtifactServiceError> {
        validate_filename(filename)?;
        let mut inner = self.inner.write().await;
        let versions = inner
            .entry(Self::key(app_name, user_id, session_id, filename))
            .or_default();
        versions.push(part);
        Ok(versions.len() as u64)
    }

    async fn load_artifact(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        filename: &str,
        version: Option<u64>,
    ) -> Result<Option<Part>, ArtifactServiceError> {
        validate_filename(filename)?;
        let inner = self.inner.read().await;
        let Some(versions) = inner.get(&Self::key(app_name, user_id, session_id, filename)) else {
            return Ok(None);
        };
        let part = match version {
            None | Some(0) => versions.last(),
            Some(v) => versions.get(v as usize - 1),
        };
        Ok(part.cloned())
    }

    async fn delete_artifact(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        filename: &str,
    ) -> Result<(), ArtifactServiceError> {
        validate_filename(filename)?;
        let mut inner = self.inner.write().await;
        inner.remove(&Self::key(app_name, user_id, session_id, filename));
        Ok(())
    }

    async fn list_artifact_keys(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<Vec<String>, ArtifactServiceError> {
        let inner = self.inner.read().await;
        let mut filenames: Vec<String> = inner
            .keys()
            .filter(|(app, user, sess, _)| {
                app == app_name
                    && user == user_id
                    && (sess == session_id || sess == USER_ARTIFACT_SESSION_ID)
            })
            .map(|(_, _, _, filename)| filename.clone())
            .collect();
        filenames.sort();
        Ok(filenames)
    }

    async fn list_versions(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        filename: &str,
    ) -> Result<Vec<u64>, ArtifactServiceError> {
        validate_filename(filename)?;
        let inner = self.inner.read().await;
        let versions = inner
            .get(&Self::key(app_name, user_id, session_id, filename))
            .ok_or_else(|| ArtifactServiceError::NotFound(filename.to_string()))?;
        Ok((1..=versions.len() as u64).collect())
    }
}
