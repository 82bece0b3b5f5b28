//! Label uniqueness check before create
//!
//! Lists the live resources of a kind and refuses a create whose label is
//! already taken. The check and the subsequent create are separate remote
//! round-trips, so two concurrent creates with the same label can both pass.

use crate::error::{CloudError, Result};
use crate::gateway::Gateway;
use crate::model::{Labeled, ResourceKind};

/// Fail with `DuplicateLabel` if any resource in `existing` carries `label`.
pub fn ensure_unique<T: Labeled>(kind: ResourceKind, label: &str, existing: &[T]) -> Result<()> {
    match existing.iter().find(|r| r.label() == label) {
        Some(found) => {
            tracing::warn!(
                kind = %kind,
                label,
                existing_id = found.identifier(),
                "Label already in use"
            );
            Err(CloudError::DuplicateLabel {
                kind,
                label: label.to_string(),
                existing_id: found.identifier().to_string(),
            })
        }
        None => Ok(()),
    }
}

pub async fn ensure_unique_instance_label(gateway: &dyn Gateway, label: &str) -> Result<()> {
    let instances = gateway.list_instances().await?;
    tracing::debug!(label, count = instances.len(), "Checking instance labels");
    ensure_unique(ResourceKind::Instance, label, &instances)
}

pub async fn ensure_unique_ssh_key_title(gateway: &dyn Gateway, title: &str) -> Result<()> {
    let keys = gateway.list_ssh_keys().await?;
    tracing::debug!(label = title, count = keys.len(), "Checking SSH key labels");
    ensure_unique(ResourceKind::SshKey, title, &keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeGateway;
    use crate::model::{Instance, SshKey};

    #[test]
    fn test_exact_match_only() {
        let keys = vec![SshKey {
            slug: "k1".into(),
            title: "deploy".into(),
            public_key: String::new(),
        }];

        assert!(ensure_unique(ResourceKind::SshKey, "deploy-2", &keys).is_ok());
        assert!(ensure_unique(ResourceKind::SshKey, "Deploy", &keys).is_ok());

        let err = ensure_unique(ResourceKind::SshKey, "deploy", &keys).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Label 'deploy' already exists for SSH key k1. Please choose a different label."
        );
    }

    #[tokio::test]
    async fn test_instance_label_taken() {
        let fake = FakeGateway::new();
        fake.insert_instance(Instance {
            identifier: "abc".into(),
            label: "t1".into(),
            hostname: "t1.example.com".into(),
            ..Default::default()
        })
        .await;

        let err = ensure_unique_instance_label(&fake, "t1").await.unwrap_err();
        assert!(matches!(
            err,
            CloudError::DuplicateLabel { ref existing_id, .. } if existing_id == "abc"
        ));
        assert!(ensure_unique_instance_label(&fake, "t2").await.is_ok());
        assert_eq!(fake.create_instance_calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_listing_passes() {
        let fake = FakeGateway::new();
        assert!(ensure_unique_ssh_key_title(&fake, "deploy").await.is_ok());
        assert_eq!(fake.list_ssh_key_calls(), 1);
    }
}
