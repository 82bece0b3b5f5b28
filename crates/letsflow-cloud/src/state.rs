//! Local state for managed resources
//!
//! Manages the `.letsflow/state.json` file, which remembers the last
//! observed document of every resource a project manages. Lifecycle
//! operations take their prior document from here and write the result
//! back.

use crate::error::{CloudError, Result};
use crate::instance::InstanceDocument;
use crate::sshkey::SshKeyDocument;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

const STATE_VERSION: u32 = 1;
pub const STATE_DIR: &str = ".letsflow";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const LOCK_FILE: &str = "lock.json";

/// All resources tracked for one project, keyed by resource name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectState {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub instances: BTreeMap<String, Tracked<InstanceDocument>>,

    #[serde(default)]
    pub ssh_keys: BTreeMap<String, Tracked<SshKeyDocument>>,
}

impl Default for ProjectState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            instances: BTreeMap::new(),
            ssh_keys: BTreeMap::new(),
        }
    }
}

impl ProjectState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty() && self.ssh_keys.is_empty()
    }

    pub fn instance(&self, name: &str) -> Option<&InstanceDocument> {
        self.instances.get(name).map(|t| &t.document)
    }

    pub fn ssh_key(&self, name: &str) -> Option<&SshKeyDocument> {
        self.ssh_keys.get(name).map(|t| &t.document)
    }

    /// Record an instance document, keeping the original creation time.
    pub fn set_instance(&mut self, name: impl Into<String>, document: InstanceDocument) {
        upsert(&mut self.instances, name.into(), document);
        self.updated_at = Utc::now();
    }

    pub fn set_ssh_key(&mut self, name: impl Into<String>, document: SshKeyDocument) {
        upsert(&mut self.ssh_keys, name.into(), document);
        self.updated_at = Utc::now();
    }

    pub fn remove_instance(&mut self, name: &str) -> Option<InstanceDocument> {
        let removed = self.instances.remove(name).map(|t| t.document);
        if removed.is_some() {
            self.updated_at = Utc::now();
        }
        removed
    }

    pub fn remove_ssh_key(&mut self, name: &str) -> Option<SshKeyDocument> {
        let removed = self.ssh_keys.remove(name).map(|t| t.document);
        if removed.is_some() {
            self.updated_at = Utc::now();
        }
        removed
    }

    /// Identifier of the SSH key tracked under `name`, if any
    pub fn ssh_key_id(&self, name: &str) -> Option<&str> {
        self.ssh_key(name)
            .map(|k| k.id.as_str())
            .filter(|id| !id.is_empty())
    }
}

fn upsert<D>(map: &mut BTreeMap<String, Tracked<D>>, name: String, document: D) {
    let now = Utc::now();
    match map.get_mut(&name) {
        Some(tracked) => {
            tracked.document = document;
            tracked.updated_at = now;
        }
        None => {
            map.insert(
                name,
                Tracked {
                    document,
                    created_at: now,
                    updated_at: now,
                },
            );
        }
    }
}

/// A resource document with bookkeeping timestamps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tracked<D> {
    #[serde(flatten)]
    pub document: D,

    /// When the resource was first recorded
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// State manager for reading/writing state files
pub struct StateManager {
    /// Project root directory
    project_root: PathBuf,
}

impl StateManager {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
        }
    }

    fn state_dir(&self) -> PathBuf {
        self.project_root.join(STATE_DIR)
    }

    /// Get the state file path
    pub fn state_path(&self) -> PathBuf {
        self.state_dir().join(STATE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.state_dir().join(STATE_BACKUP)
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir().join(LOCK_FILE)
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!("Created state directory: {}", dir.display());
        }
        Ok(())
    }

    /// Load the current state
    pub async fn load(&self) -> Result<ProjectState> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!("State file not found, returning empty state");
            return Ok(ProjectState::new());
        }

        let content = fs::read_to_string(&path).await?;
        let state: ProjectState = serde_json::from_str(&content)?;

        if state.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "State file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }

        tracing::debug!(
            instances = state.instances.len(),
            ssh_keys = state.ssh_keys.len(),
            "Loaded state"
        );
        Ok(state)
    }

    /// Save the state, keeping the previous file as a backup
    pub async fn save(&self, state: &ProjectState) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        let backup = self.backup_path();

        if path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
            tracing::debug!("Created state backup");
        }

        let content = serde_json::to_string_pretty(state)?;
        fs::write(&path, content).await?;

        tracing::debug!(
            instances = state.instances.len(),
            ssh_keys = state.ssh_keys.len(),
            "Saved state"
        );
        Ok(())
    }

    /// Acquire a lock for exclusive access
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();

        if lock_path.exists() {
            let content = fs::read_to_string(&lock_path).await?;
            let lock_info: LockInfo = serde_json::from_str(&content)?;

            // Locks older than an hour are considered abandoned
            let age = Utc::now().signed_duration_since(lock_info.acquired_at);
            if age.num_hours() < 1 {
                return Err(CloudError::LockError(format!(
                    "State is locked by {} since {}",
                    lock_info.holder, lock_info.acquired_at
                )));
            }

            tracing::warn!("Removing stale lock from {}", lock_info.holder);
        }

        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            acquired_at: Utc::now(),
        };

        let content = serde_json::to_string_pretty(&lock_info)?;
        fs::write(&lock_path, content).await?;

        tracing::debug!("Acquired state lock");
        Ok(StateLock {
            lock_path,
            released: false,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for state lock
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    /// Release the lock
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released state lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}
