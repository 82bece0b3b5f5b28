//! Manifest and state file of the current project

use anyhow::Context;
use letsflow_cloud::{InstanceDocument, SshKeyDocument, StateManager};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Desired resources keyed by resource name (letsflow.yaml)
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub ssh_keys: BTreeMap<String, SshKeyDocument>,

    #[serde(default)]
    pub instances: BTreeMap<String, InstanceDocument>,
}

impl Manifest {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("マニフェストを読み込めません: {}", path.display()))?;
        let manifest = Self::parse(&content)
            .with_context(|| format!("マニフェストの形式が不正です: {}", path.display()))?;
        Ok(manifest)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let manifest: Manifest = serde_yaml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> anyhow::Result<()> {
        for (name, instance) in &self.instances {
            if !instance.id.is_empty() || instance.state.is_some() {
                anyhow::bail!(
                    "インスタンス '{}': id と state は自動で設定されるため指定できません",
                    name
                );
            }
        }
        for (name, key) in &self.ssh_keys {
            if !key.id.is_empty() {
                anyhow::bail!(
                    "SSHキー '{}': id は自動で設定されるため指定できません",
                    name
                );
            }
        }
        Ok(())
    }
}

/// Project root, manifest and state file
pub struct Project {
    pub root: PathBuf,
    pub manifest: Manifest,
    pub state: StateManager,
}

impl Project {
    /// Locate the manifest; required for commands that reconcile it.
    pub fn discover() -> anyhow::Result<Self> {
        let manifest_path = letsflow_config::find_manifest_file()?;
        let root = project_root_of(&manifest_path)?;
        tracing::debug!(manifest = %manifest_path.display(), root = %root.display(), "Loaded project");

        Ok(Self {
            manifest: Manifest::load(&manifest_path)?,
            state: StateManager::new(&root),
            root,
        })
    }

    /// Like [`Project::discover`], but falls back to the current directory
    /// with an empty manifest when there is none.
    pub fn discover_for_state() -> anyhow::Result<Self> {
        match letsflow_config::find_manifest_file() {
            Ok(_) => Self::discover(),
            Err(letsflow_config::ConfigError::ManifestNotFound) => {
                let root = std::env::current_dir()?;
                Ok(Self {
                    manifest: Manifest::default(),
                    state: StateManager::new(&root),
                    root,
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Directory holding `.letsflow/` for a manifest path
fn project_root_of(manifest_path: &Path) -> anyhow::Result<PathBuf> {
    let parent = manifest_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or(std::env::current_dir()?);

    if parent.file_name().is_some_and(|n| n == letsflow_cloud::state::STATE_DIR) {
        if let Some(root) = parent.parent() {
            return Ok(root.to_path_buf());
        }
    }
    Ok(parent)
}
