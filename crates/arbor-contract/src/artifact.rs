//! Artifact service contract: versioned named blobs per session.

use crate::content::Part;
use async_trait::async_trait;
use thiserror::Error;

/// Filenames with this prefix are stored under the sentinel session id
/// [`USER_ARTIFACT_SESSION_ID`] and are visible across all of a user's
/// sessions within the app.
pub const USER_FILENAME_PREFIX: &str = "user:";

/// Sentinel session id backing `user:`-scoped artifacts.
pub const USER_ARTIFACT_SESSION_ID: &str = "user";

/// Artifact service failures.
#[derive(Debug, Clone, Error)]
pub enum ArtifactServiceError {
    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("invalid artifact filename: {0}")]
    InvalidFilename(String),

    #[error("artifact service not configured")]
    NotConfigured,
}

/// Reject filenames containing path separators.
pub fn validate_filename(filename: &str) -> Result<(), ArtifactServiceError> {
    if filename.contains('/') || filename.contains('\\') {
        return Err(ArtifactServiceError::InvalidFilename(filename.to_string()));
    }
    Ok(())
}

/// Versioned blob storage keyed by `(app_name, user_id, session_id,
/// filename, version)`. Versions are 1-based; `None` or `Some(0)` on load
/// means "latest".
#[async_trait]
pub trait ArtifactService: Send + Sync {
    /// Store a new version; returns the version number assigned.
    async fn save_artifact(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        filename: &str,
        part: Part,
    ) -> Result<u64, ArtifactServiceError>;

    /// Load a version (or the latest). `Ok(None)` when the artifact or the
    /// requested version does not exist.
    async fn load_artifact(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        filename: &str,
        version: Option<u64>,
    ) -> Result<Option<Part>, ArtifactServiceError>;

    /// Remove an artifact and all its versions. Idempotent.
    async fn delete_artifact(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        filename: &str,
    ) -> Result<(), ArtifactServiceError>;

    /// Filenames visible to the session, including `user:`-scoped ones.
    async fn list_artifact_keys(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<Vec<String>, ArtifactServiceError>;

    /// Version numbers stored for a filename, ascending.
    async fn list_versions(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        filename: &str,
    ) -> Result<Vec<u64>, ArtifactServiceError>;
}
