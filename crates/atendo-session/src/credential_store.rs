use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use atendo_core::{sanitize_for_path, write_text_atomic};

pub const CREDENTIAL_METADATA_FILE_NAME: &str = "metadata.json";
pub const CREDENTIAL_ARTIFACT_FILE_NAME: &str = "credentials.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Small metadata record persisted next to each session's credential
/// artifact and loaded at startup for recovery.
pub struct SessionCredentialMetadata {
    pub owner_account_id: String,
    pub tenant_id: String,
    #[serde(default)]
    pub outbound_auth_token: Option<String>,
}

/// Key-value persistence for per-session authentication material.
///
/// Abstracted so the session manager works unchanged against disk, object
/// storage, or a database. `delete_artifact` removes only the credential
/// artifact; metadata and the session directory are left for audit.
pub trait CredentialStore: Send + Sync {
    fn save_metadata(&self, session_id: &str, metadata: &SessionCredentialMetadata) -> Result<()>;
    fn load_metadata(&self, session_id: &str) -> Result<Option<SessionCredentialMetadata>>;
    fn list_session_ids(&self) -> Result<Vec<String>>;
    fn write_artifact(&self, session_id: &str, contents: &str) -> Result<()>;
    fn read_artifact(&self, session_id: &str) -> Result<Option<String>>;
    fn delete_artifact(&self, session_id: &str) -> Result<()>;
}

/// Public struct `FileCredentialStore` used across Atendo components.
pub struct FileCredentialStore {
    sessions_dir: PathBuf,
}

impl FileCredentialStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            sessions_dir: state_dir.join("sessions"),
        }
    }

    fn session_dir(&self, session_id: &str) -> PathBuf {
        self.sessions_dir.join(sanitize_for_path(session_id))
    }

    fn read_optional(&self, path: &Path) -> Result<Option<String>> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Ok(Some(raw))
    }
}

impl CredentialStore for FileCredentialStore {
    fn save_metadata(&self, session_id: &str, metadata: &SessionCredentialMetadata) -> Result<()> {
        let path = self.session_dir(session_id).join(CREDENTIAL_METADATA_FILE_NAME);
        let serialized = serde_json::to_string_pretty(metadata)
            .context("failed to serialize session credential metadata")?;
        write_text_atomic(&path, &serialized)
    }

    fn load_metadata(&self, session_id: &str) -> Result<Option<SessionCredentialMetadata>> {
        let path = self.session_dir(session_id).join(CREDENTIAL_METADATA_FILE_NAME);
        let Some(raw) = self.read_optional(&path)? else {
            return Ok(None);
        };
        let metadata: SessionCredentialMetadata = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse session metadata {}", path.display()))?;
        Ok(Some(metadata))
    }

    fn list_session_ids(&self) -> Result<Vec<String>> {
        if !self.sessions_dir.exists() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&self.sessions_dir)
            .with_context(|| format!("failed to list {}", self.sessions_dir.display()))?;
        let mut session_ids = Vec::new();
        for entry in entries {
            let entry = entry.context("failed to read sessions directory entry")?;
            if !entry.path().is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                session_ids.push(name.to_string());
            }
        }
        session_ids.sort();
        Ok(session_ids)
    }

    fn write_artifact(&self, session_id: &str, contents: &str) -> Result<()> {
        let path = self.session_dir(session_id).join(CREDENTIAL_ARTIFACT_FILE_NAME);
        write_text_atomic(&path, contents)
    }

    fn read_artifact(&self, session_id: &str) -> Result<Option<String>> {
        let path = self.session_dir(session_id).join(CREDENTIAL_ARTIFACT_FILE_NAME);
        self.read_optional(&path)
    }

    fn delete_artifact(&self, session_id: &str) -> Result<()> {
        let path = self.session_dir(session_id).join(CREDENTIAL_ARTIFACT_FILE_NAME);
        if !path.exists() {
            return Ok(());
        }
        std::fs::remove_file(&path)
            .with_context(|| format!("failed to delete credential artifact {}", path.display()))
    }
}
