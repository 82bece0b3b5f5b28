//! SSH key lifecycle controller and lookups
//!
//! SSH keys have no build or boot phase: create returns the identifier
//! directly, and the key material is write-only.

use crate::error::{CloudError, Result};
use crate::gateway::Gateway;
use crate::guard;
use crate::model::{ResourceKind, SshKey};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const KIND: ResourceKind = ResourceKind::SshKey;

const KEY_PREFIXES: &[&str] = &["ssh-rsa ", "ssh-ed25519 "];

/// Desired or observed attributes of one SSH key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshKeyDocument {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub label: String,
    /// Public key material; empty after import
    #[serde(skip_serializing_if = "String::is_empty")]
    pub key: String,
}

/// How a single key is looked up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SshKeySelector {
    Id(String),
    Label(String),
}

impl SshKeySelector {
    /// Build a selector from optional inputs; the identifier wins when both are set.
    pub fn from_parts(id: Option<&str>, label: Option<&str>) -> Result<Self> {
        let id = id.filter(|s| !s.is_empty());
        let label = label.filter(|s| !s.is_empty());
        match (id, label) {
            (Some(id), Some(_)) => {
                tracing::warn!("Both 'id' and 'label' provided, using 'id' to identify SSH key");
                Ok(SshKeySelector::Id(id.to_string()))
            }
            (Some(id), None) => Ok(SshKeySelector::Id(id.to_string())),
            (None, Some(label)) => Ok(SshKeySelector::Label(label.to_string())),
            (None, None) => Err(CloudError::Validation(
                "Either 'id' or 'label' must be specified to identify the SSH key".to_string(),
            )),
        }
    }
}

/// Check the key prefix and keep only the type and key body, dropping any comment.
pub fn normalize_public_key(key: &str) -> Result<String> {
    let key = key.trim();
    if !KEY_PREFIXES.iter().any(|p| key.starts_with(p)) {
        return Err(CloudError::Validation(
            "SSH key must start with 'ssh-rsa ' or 'ssh-ed25519 '".to_string(),
        ));
    }

    let mut parts = key.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(kind), Some(body)) => Ok(format!("{} {}", kind, body)),
        _ => Err(CloudError::Validation("Invalid SSH key format".to_string())),
    }
}

/// Short, non-secret prefix of key material for logs
fn key_preview(key: &str) -> String {
    let preview: String = key.chars().take(24).collect();
    if preview.len() < key.len() {
        format!("{}...", preview)
    } else {
        preview
    }
}

impl SshKeyDocument {
    fn observed(&self, key: &SshKey) -> SshKeyDocument {
        SshKeyDocument {
            id: key.slug.clone(),
            label: key.title.clone(),
            key: self.key.clone(),
        }
    }

    fn require_id(&self, operation: &'static str) -> Result<&str> {
        if self.id.is_empty() {
            return Err(CloudError::Validation("SSH key id is required".to_string())
                .during(KIND, operation, "validation"));
        }
        Ok(&self.id)
    }
}

/// Lifecycle controller for SSH keys
pub struct SshKeyController {
    gateway: Arc<dyn Gateway>,
}

impl SshKeyController {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }

    /// Validate, normalize and register a public key.
    pub async fn create(&self, desired: &SshKeyDocument) -> Result<SshKeyDocument> {
        let key = normalize_public_key(&desired.key)
            .map_err(|e| e.during(KIND, "create", "validation"))?;
        if desired.label.trim().is_empty() {
            return Err(CloudError::Validation("Label is required".to_string())
                .during(KIND, "create", "validation"));
        }

        tracing::info!(
            label = %desired.label,
            key_prefix = %key_preview(&key),
            "Creating SSH key"
        );

        guard::ensure_unique_ssh_key_title(self.gateway.as_ref(), &desired.label)
            .await
            .map_err(|e| e.during(KIND, "create", "duplicate check"))?;

        let created = self
            .gateway
            .create_ssh_key(&desired.label, &key)
            .await
            .map_err(|e| e.during(KIND, "create", "create request"))?;

        if created.slug.is_empty() {
            return Err(CloudError::InvalidResponse(format!(
                "SSH key '{}' created without an identifier",
                desired.label
            ))
            .during(KIND, "create", "create request"));
        }

        tracing::info!(ssh_key_id = %created.slug, label = %created.title, "SSH key created");
        Ok(SshKeyDocument {
            id: created.slug,
            label: created.title,
            key,
        })
    }

    /// Refresh the label; the key material is kept from `prior`.
    pub async fn read(&self, prior: &SshKeyDocument) -> Result<SshKeyDocument> {
        let id = prior.require_id("read")?;
        let key = self
            .gateway
            .get_ssh_key(id)
            .await
            .map_err(|e| e.during(KIND, "read", "fetch"))?;
        Ok(prior.observed(&key))
    }

    /// SSH keys cannot change in place.
    pub async fn update(
        &self,
        _prior: &SshKeyDocument,
        _desired: &SshKeyDocument,
    ) -> Result<SshKeyDocument> {
        Err(CloudError::UnsupportedOperation(
            "SSH keys cannot be updated. Please delete and recreate the SSH key".to_string(),
        )
        .during(KIND, "update", "validation"))
    }

    pub async fn delete(&self, prior: &SshKeyDocument) -> Result<()> {
        let id = prior.require_id("delete")?;
        self.gateway
            .delete_ssh_key(id)
            .await
            .map_err(|e| e.during(KIND, "delete", "delete request"))?;
        tracing::info!(ssh_key_id = %id, label = %prior.label, "SSH key deleted");
        Ok(())
    }

    /// Adopt an existing key by identifier. The key material stays empty.
    pub async fn import(&self, id: &str) -> Result<SshKeyDocument> {
        if id.trim().is_empty() {
            return Err(CloudError::Validation("SSH key id is required".to_string())
                .during(KIND, "import", "validation"));
        }
        let key = self
            .gateway
            .get_ssh_key(id)
            .await
            .map_err(|e| e.during(KIND, "import", "fetch"))?;
        Ok(SshKeyDocument::default().observed(&key))
    }

    /// Find one key by identifier or by exact label.
    pub async fn lookup(&self, selector: &SshKeySelector) -> Result<SshKeyDocument> {
        let found = match selector {
            SshKeySelector::Id(id) => self
                .gateway
                .get_ssh_key(id)
                .await
                .map_err(|e| e.during(KIND, "look up", "fetch by id"))?,
            SshKeySelector::Label(label) => {
                let keys = self
                    .gateway
                    .list_ssh_keys()
                    .await
                    .map_err(|e| e.during(KIND, "look up", "list"))?;
                keys.into_iter()
                    .find(|k| &k.title == label)
                    .ok_or_else(|| {
                        CloudError::NotFound(format!("No SSH key found with label '{}'", label))
                    })?
            }
        };
        Ok(SshKeyDocument::default().observed(&found))
    }

    /// All keys as (id, label) documents.
    pub async fn list(&self) -> Result<Vec<SshKeyDocument>> {
        let keys = self
            .gateway
            .list_ssh_keys()
            .await
            .map_err(|e| e.during(KIND, "list", "list"))?;
        tracing::debug!(count = keys.len(), "Listed SSH keys");
        Ok(keys
            .iter()
            .map(|k| SshKeyDocument::default().observed(k))
            .collect())
    }
}
