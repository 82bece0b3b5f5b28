//! Instance lifecycle controller
//!
//! Orchestrates create, read, update, delete and import for instances on
//! top of a [`Gateway`]. Create is the only long-running operation:
//!
//! ```text
//! validate ─▶ duplicate guard ─▶ create (retried) ─▶ readiness poll ─▶ document
//! ```

use crate::context::OperationContext;
use crate::error::{CloudError, Result};
use crate::gateway::Gateway;
use crate::guard;
use crate::model::{CreateInstanceRequest, Instance, InstanceState, Plan, ResourceKind};
use crate::poller::{MatchKey, PollProfile, ReadinessPoller};
use crate::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const KIND: ResourceKind = ResourceKind::Instance;

/// Desired or observed attributes of one instance
///
/// The same document is the input to every operation and the output of
/// every successful one. `id`, `state`, `ipv4` and `ipv6` are computed;
/// `password` is write-only and never read back from the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceDocument {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub label: String,
    pub hostname: String,
    #[serde(rename = "location")]
    pub location_slug: String,
    #[serde(rename = "plan")]
    pub plan_slug: String,
    #[serde(rename = "image")]
    pub image_slug: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ssh_keys: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<InstanceState>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub ipv4: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub ipv6: String,
}

impl InstanceDocument {
    /// Desired attributes that cannot change in place, compared with `other`
    pub fn immutable_changes(&self, other: &InstanceDocument) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.label != other.label {
            changed.push("label");
        }
        if self.hostname != other.hostname {
            changed.push("hostname");
        }
        if self.location_slug != other.location_slug {
            changed.push("location");
        }
        if self.plan_slug != other.plan_slug {
            changed.push("plan");
        }
        if self.image_slug != other.image_slug {
            changed.push("image");
        }
        if self.ssh_keys != other.ssh_keys {
            changed.push("ssh_keys");
        }
        changed
    }

    /// Whether applying `desired` on top of this document resets the password
    ///
    /// A desired password of `None` never triggers a reset, even when one is recorded.
    pub fn password_changed(&self, desired: &InstanceDocument) -> bool {
        match desired.password.as_deref() {
            Some(password) => self.password.as_deref() != Some(password),
            None => false,
        }
    }

    fn validate_for_create(&self) -> Result<()> {
        let required = [
            ("label", &self.label),
            ("location", &self.location_slug),
            ("plan", &self.plan_slug),
            ("image", &self.image_slug),
            ("hostname", &self.hostname),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(CloudError::Validation(format!("{} is required", field)));
            }
        }
        Ok(())
    }

    fn create_request(&self) -> CreateInstanceRequest {
        if self.ssh_keys.len() > 1 {
            tracing::warn!(
                label = %self.label,
                ignored = self.ssh_keys.len() - 1,
                "Only the first SSH key is attached at create time"
            );
        }

        CreateInstanceRequest {
            location_slug: self.location_slug.clone(),
            plan_slug: self.plan_slug.clone(),
            image_slug: self.image_slug.clone(),
            ssh_slug: self.ssh_keys.first().cloned().unwrap_or_default(),
            password: self.password.clone().unwrap_or_default(),
            label: self.label.clone(),
            hostname: self.hostname.clone(),
        }
    }

    /// Merge an observation into this document.
    ///
    /// Plan and image slugs, SSH key references and the password are never
    /// returned by the API and are carried forward from `self`.
    fn observed(&self, instance: &Instance) -> InstanceDocument {
        let location_slug = if instance.location.slug.is_empty() {
            self.location_slug.clone()
        } else {
            instance.location.slug.clone()
        };

        InstanceDocument {
            id: instance.identifier.clone(),
            label: instance.label.clone(),
            hostname: instance.hostname.clone(),
            location_slug,
            plan_slug: self.plan_slug.clone(),
            image_slug: self.image_slug.clone(),
            ssh_keys: self.ssh_keys.clone(),
            password: self.password.clone(),
            state: Some(instance.state()),
            ipv4: instance.ipv4(),
            ipv6: instance.ipv6(),
        }
    }

    fn require_id(&self, operation: &'static str) -> Result<&str> {
        if self.id.is_empty() {
            return Err(CloudError::Validation("instance id is required".to_string())
                .during(KIND, operation, "validation"));
        }
        Ok(&self.id)
    }
}

/// Plan and image slugs backfilled on import, since the API never reports them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportDefaults {
    pub plan_slug: String,
    pub image_slug: String,
}

impl Default for ImportDefaults {
    fn default() -> Self {
        Self {
            plan_slug: "plan-1".to_string(),
            image_slug: "ubuntu-20-04".to_string(),
        }
    }
}

/// Lifecycle controller for instances
pub struct InstanceController {
    gateway: Arc<dyn Gateway>,
    /// Poll used when create does not report the new identifier
    discovery: PollProfile,
    /// Poll used when the identifier is known
    tracking: PollProfile,
    retry: RetryConfig,
    import_defaults: ImportDefaults,
}

impl InstanceController {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self {
            gateway,
            discovery: PollProfile::long(),
            tracking: PollProfile::short(),
            retry: RetryConfig::default(),
            import_defaults: ImportDefaults::default(),
        }
    }

    pub fn with_poll_profiles(mut self, discovery: PollProfile, tracking: PollProfile) -> Self {
        self.discovery = discovery;
        self.tracking = tracking;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_import_defaults(mut self, defaults: ImportDefaults) -> Self {
        self.import_defaults = defaults;
        self
    }

    /// Create an instance and wait until it is ready.
    pub async fn create(
        &self,
        desired: &InstanceDocument,
        ctx: &OperationContext,
    ) -> Result<InstanceDocument> {
        desired
            .validate_for_create()
            .map_err(|e| e.during(KIND, "create", "validation"))?;

        tracing::info!(
            label = %desired.label,
            hostname = %desired.hostname,
            location = %desired.location_slug,
            plan = %desired.plan_slug,
            image = %desired.image_slug,
            gateway = self.gateway.name(),
            "Creating instance"
        );

        guard::ensure_unique_instance_label(self.gateway.as_ref(), &desired.label)
            .await
            .map_err(|e| e.during(KIND, "create", "duplicate check"))?;

        let request = desired.create_request();
        tracing::debug!(request = %request, "Instance create request");

        let reported_id = self
            .retry
            .run(ctx, &desired.label, || self.gateway.create_instance(&request))
            .await
            .map_err(|e| e.during(KIND, "create", "create request"))?;

        let (key, profile) = match reported_id {
            Some(id) if !id.is_empty() => (MatchKey::Identifier(id), self.tracking),
            _ => (
                MatchKey::LabelHostname {
                    label: desired.label.clone(),
                    hostname: desired.hostname.clone(),
                },
                self.discovery,
            ),
        };

        tracing::info!(
            label = %desired.label,
            max_attempts = profile.max_attempts,
            interval_secs = profile.interval.as_secs(),
            "Waiting for instance to be ready"
        );

        let instance = ReadinessPoller::new(self.gateway.as_ref(), profile)
            .wait_until_ready(&key, ctx)
            .await
            .map_err(|e| e.during(KIND, "create", "readiness wait"))?;

        if instance.identifier.is_empty() {
            return Err(CloudError::InvalidResponse(format!(
                "instance '{}' became ready without an identifier",
                desired.label
            ))
            .during(KIND, "create", "readiness wait"));
        }

        let document = desired.observed(&instance);
        tracing::info!(
            instance_id = %document.id,
            label = %document.label,
            ipv4 = %document.ipv4,
            ipv6 = %document.ipv6,
            "Instance created"
        );
        Ok(document)
    }

    /// Refresh a document from the remote resource.
    pub async fn read(&self, prior: &InstanceDocument) -> Result<InstanceDocument> {
        let id = prior.require_id("read")?;
        let instance = self
            .gateway
            .get_instance(id)
            .await
            .map_err(|e| e.during(KIND, "read", "fetch"))?;

        tracing::debug!(
            instance_id = %instance.identifier,
            state = %instance.state(),
            "Read instance"
        );
        Ok(prior.observed(&instance))
    }

    /// Apply the mutable subset of `desired` (the password) and re-read.
    pub async fn update(
        &self,
        prior: &InstanceDocument,
        desired: &InstanceDocument,
    ) -> Result<InstanceDocument> {
        let id = prior.require_id("update")?;

        let changes = prior.immutable_changes(desired);
        if !changes.is_empty() {
            tracing::warn!(
                instance_id = %id,
                fields = ?changes,
                "Ignoring changes to attributes that cannot be updated in place"
            );
        }

        let mut next = prior.clone();
        if prior.password_changed(desired) {
            if let Some(password) = desired.password.as_deref() {
                tracing::info!(instance_id = %id, "Resetting instance password");
                self.gateway
                    .reset_instance_password(id, password)
                    .await
                    .map_err(|e| e.during(KIND, "update", "password reset"))?;
                next.password = Some(password.to_string());
            }
        } else if desired.password.is_none() && prior.password.is_some() {
            tracing::debug!(instance_id = %id, "No desired password; keeping the current one");
        }

        self.read(&next)
            .await
            .map_err(|e| e.during(KIND, "update", "refresh"))
    }

    /// Delete the instance. An already missing instance counts as deleted.
    pub async fn delete(&self, prior: &InstanceDocument) -> Result<()> {
        let id = prior.require_id("delete")?;
        match self.gateway.delete_instance(id).await {
            Ok(()) => {
                tracing::info!(instance_id = %id, label = %prior.label, "Instance deleted");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                tracing::info!(instance_id = %id, "Instance already gone");
                Ok(())
            }
            Err(e) => Err(e.during(KIND, "delete", "delete request")),
        }
    }

    /// Adopt an existing instance by identifier.
    pub async fn import(&self, id: &str) -> Result<InstanceDocument> {
        if id.trim().is_empty() {
            return Err(CloudError::Validation("instance id is required".to_string())
                .during(KIND, "import", "validation"));
        }

        let instance = self
            .gateway
            .get_instance(id)
            .await
            .map_err(|e| e.during(KIND, "import", "fetch"))?;

        let seed = InstanceDocument {
            plan_slug: self.import_defaults.plan_slug.clone(),
            image_slug: self.import_defaults.image_slug.clone(),
            ..Default::default()
        };

        tracing::info!(
            instance_id = %instance.identifier,
            label = %instance.label,
            plan = %seed.plan_slug,
            image = %seed.image_slug,
            "Imported instance with placeholder plan and image"
        );
        Ok(seed.observed(&instance))
    }

    /// Plans offered in a location.
    pub async fn location_plans(&self, location: &str) -> Result<Vec<Plan>> {
        if location.trim().is_empty() {
            return Err(CloudError::Validation("location is required".to_string())
                .during(KIND, "list plans for", "validation"));
        }
        self.gateway
            .location_plans(location)
            .await
            .map_err(|e| e.during(KIND, "list plans for", "plans lookup"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;
    use crate::fake::{BootBehavior, FakeGateway};
    use std::time::Duration;
    use tokio::time::Instant;

    fn desired(label: &str) -> InstanceDocument {
        InstanceDocument {
            label: label.to_string(),
            hostname: format!("{}.example.com", label),
            location_slug: "us-east-1".to_string(),
            plan_slug: "plan-1".to_string(),
            image_slug: "ubuntu-20-04".to_string(),
            password: Some("initial-password".to_string()),
            ..Default::default()
        }
    }

    fn controller(fake: &Arc<FakeGateway>) -> InstanceController {
        InstanceController::new(fake.clone())
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_ready_on_first_read() {
        let fake = Arc::new(FakeGateway::new());
        let created = controller(&fake)
            .create(&desired("t1"), &OperationContext::new())
            .await
            .unwrap();

        assert_eq!(created.id, "mock-instance-1");
        assert_eq!(created.state, Some(InstanceState::Running));
        assert_eq!(created.ipv4, "192.168.1.1");
        assert_eq!(created.ipv6, "2001:db8::1");
        assert_eq!(created.plan_slug, "plan-1");
        assert_eq!(created.image_slug, "ubuntu-20-04");
        assert_eq!(fake.create_instance_calls(), 1);
        assert_eq!(
            fake.password_of("mock-instance-1").await.as_deref(),
            Some("initial-password")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_with_reported_identifier_uses_tracking_poll() {
        let fake = Arc::new(
            FakeGateway::new()
                .with_boot(BootBehavior::Gradual)
                .echo_identifier(),
        );
        let start = Instant::now();
        let created = controller(&fake)
            .create(&desired("t1"), &OperationContext::new())
            .await
            .unwrap();

        assert_eq!(created.state, Some(InstanceState::Running));
        // one list for the duplicate guard, none while polling
        assert_eq!(fake.list_instance_calls(), 1);
        assert_eq!(fake.get_instance_calls(), 2);
        assert_eq!(start.elapsed(), PollProfile::short().interval);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_ready_without_identifier_is_invalid_response() {
        let fake = Arc::new(FakeGateway::new().anonymous_listings(u32::MAX));

        let err = controller(&fake)
            .create(&desired("t1"), &OperationContext::new())
            .await
            .unwrap_err();

        assert!(matches!(err.root(), CloudError::InvalidResponse(_)), "{err:?}");
        assert!(err.to_string().contains("'t1'"), "{err}");
        assert_eq!(fake.create_instance_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_rejects_missing_fields_before_any_call() {
        let fake = Arc::new(FakeGateway::new());
        let mut doc = desired("t1");
        doc.hostname = String::new();

        let err = controller(&fake)
            .create(&doc, &OperationContext::new())
            .await
            .unwrap_err();

        assert!(matches!(err.root(), CloudError::Validation(msg) if msg.contains("hostname")));
        assert_eq!(fake.list_instance_calls(), 0);
        assert_eq!(fake.create_instance_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_rejects_duplicate_label() {
        let fake = Arc::new(FakeGateway::new());
        let controller = controller(&fake);
        controller
            .create(&desired("t1"), &OperationContext::new())
            .await
            .unwrap();

        let err = controller
            .create(&desired("t1"), &OperationContext::new())
            .await
            .unwrap_err();

        assert!(matches!(err.root(), CloudError::DuplicateLabel { .. }));
        assert!(err.to_string().contains("duplicate check"));
        assert_eq!(fake.create_instance_calls(), 1);
        assert_eq!(fake.instance_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_retries_then_returns_last_error() {
        let fake = Arc::new(FakeGateway::new());
        fake.fail_creates(5, ErrorClass::Permanent, "The plan slug field is invalid")
            .await;
        let start = Instant::now();

        let err = controller(&fake)
            .create(&desired("t1"), &OperationContext::new())
            .await
            .unwrap_err();

        assert_eq!(fake.create_instance_calls(), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
        assert!(matches!(err.root(), CloudError::Permanent(msg) if msg.contains("plan slug")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_recovers_after_transient_failures() {
        let fake = Arc::new(FakeGateway::new());
        fake.fail_creates(2, ErrorClass::Transient, "503 Service Unavailable")
            .await;

        let created = controller(&fake)
            .create(&desired("t1"), &OperationContext::new())
            .await
            .unwrap();

        assert_eq!(fake.create_instance_calls(), 3);
        assert_eq!(created.state, Some(InstanceState::Running));
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_fails_fast_on_suspension() {
        let fake = Arc::new(FakeGateway::new().suspend_on_create());
        let err = controller(&fake)
            .create(&desired("t1"), &OperationContext::new())
            .await
            .unwrap_err();

        match err.root() {
            CloudError::Suspended {
                label, attempt, ..
            } => {
                assert_eq!(label, "t1");
                assert_eq!(*attempt, 1);
            }
            other => panic!("expected Suspended, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_times_out_with_short_profiles() {
        let fake = Arc::new(FakeGateway::new().with_boot(BootBehavior::Never));
        let controller = controller(&fake).with_poll_profiles(
            PollProfile::new(5, Duration::from_secs(3)),
            PollProfile::short(),
        );

        let err = controller
            .create(&desired("t1"), &OperationContext::new())
            .await
            .unwrap_err();

        assert!(matches!(err.root(), CloudError::TimedOut { attempts: 5, .. }));
    }

    #[tokio::test]
    async fn test_read_is_idempotent_and_preserves_slugs() {
        let fake = Arc::new(FakeGateway::new());
        let controller = controller(&fake);
        let created = controller
            .create(&desired("t1"), &OperationContext::new())
            .await
            .unwrap();

        let first = controller.read(&created).await.unwrap();
        let second = controller.read(&first).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second.state, created.state);
        assert_eq!(second.plan_slug, "plan-1");
        assert_eq!(second.image_slug, "ubuntu-20-04");
    }

    #[tokio::test]
    async fn test_read_reflects_remote_flags() {
        let fake = Arc::new(FakeGateway::new());
        let controller = controller(&fake);
        let created = controller
            .create(&desired("t1"), &OperationContext::new())
            .await
            .unwrap();

        fake.set_flags(&created.id, true, false, false).await.unwrap();
        let read = controller.read(&created).await.unwrap();
        assert_eq!(read.state, Some(InstanceState::Stopped));
    }

    #[tokio::test]
    async fn test_read_missing_instance_is_not_found() {
        let fake = Arc::new(FakeGateway::new());
        let prior = InstanceDocument {
            id: "gone".into(),
            ..desired("t1")
        };
        let err = controller(&fake).read(&prior).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_password_only() {
        let fake = Arc::new(FakeGateway::new());
        let controller = controller(&fake);
        let created = controller
            .create(&desired("t1"), &OperationContext::new())
            .await
            .unwrap();

        let mut wanted = desired("t1");
        wanted.password = Some("rotated-password".into());
        let updated = controller.update(&created, &wanted).await.unwrap();

        assert_eq!(fake.reset_password_calls(), 1);
        assert_eq!(
            fake.password_of(&created.id).await.as_deref(),
            Some("rotated-password")
        );
        assert_eq!(updated.password.as_deref(), Some("rotated-password"));
        assert_eq!(updated.plan_slug, created.plan_slug);
        assert_eq!(updated.image_slug, created.image_slug);
        assert_eq!(updated.id, created.id);
    }

    #[tokio::test]
    async fn test_update_without_changes_skips_reset() {
        let fake = Arc::new(FakeGateway::new());
        let controller = controller(&fake);
        let created = controller
            .create(&desired("t1"), &OperationContext::new())
            .await
            .unwrap();

        controller.update(&created, &desired("t1")).await.unwrap();

        let mut no_password = desired("t1");
        no_password.password = None;
        let updated = controller.update(&created, &no_password).await.unwrap();

        assert_eq!(fake.reset_password_calls(), 0);
        assert_eq!(updated.password.as_deref(), Some("initial-password"));
    }

    #[tokio::test]
    async fn test_update_keeps_immutable_fields_from_prior() {
        let fake = Arc::new(FakeGateway::new());
        let controller = controller(&fake);
        let created = controller
            .create(&desired("t1"), &OperationContext::new())
            .await
            .unwrap();

        let mut wanted = desired("t1");
        wanted.plan_slug = "plan-2".into();
        assert_eq!(created.immutable_changes(&wanted), vec!["plan"]);

        let updated = controller.update(&created, &wanted).await.unwrap();
        assert_eq!(updated.plan_slug, "plan-1");
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let fake = Arc::new(FakeGateway::new());
        let controller = controller(&fake);
        let created = controller
            .create(&desired("t1"), &OperationContext::new())
            .await
            .unwrap();

        controller.delete(&created).await.unwrap();
        assert_eq!(fake.instance_count().await, 0);
        controller.delete(&created).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_requires_identifier() {
        let fake = Arc::new(FakeGateway::new());
        let err = controller(&fake).delete(&desired("t1")).await.unwrap_err();
        assert!(matches!(err.root(), CloudError::Validation(_)));
    }

    #[tokio::test]
    async fn test_import_backfills_placeholders() {
        let fake = Arc::new(FakeGateway::new());
        fake.insert_instance(Instance {
            identifier: "abc123".into(),
            label: "legacy".into(),
            hostname: "legacy.example.com".into(),
            built: true,
            booted: false,
            ..Default::default()
        })
        .await;

        let imported = controller(&fake).import("abc123").await.unwrap();
        assert_eq!(imported.id, "abc123");
        assert_eq!(imported.label, "legacy");
        assert_eq!(imported.plan_slug, "plan-1");
        assert_eq!(imported.image_slug, "ubuntu-20-04");
        assert_eq!(imported.state, Some(InstanceState::Stopped));
        assert_eq!(imported.password, None);

        let custom = controller(&fake)
            .with_import_defaults(ImportDefaults {
                plan_slug: "unknown".into(),
                image_slug: "unknown".into(),
            })
            .import("abc123")
            .await
            .unwrap();
        assert_eq!(custom.plan_slug, "unknown");
    }

    #[tokio::test]
    async fn test_location_plans() {
        let fake = Arc::new(FakeGateway::new());
        let plans = controller(&fake).location_plans("MIA1").await.unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].slug, "plan-1");
        assert_eq!(plans[0].memory, 1024);

        assert!(controller(&fake).location_plans(" ").await.is_err());
    }

    #[test]
    fn test_document_yaml_shape() {
        let yaml = r#"
label: web-1
hostname: web-1.example.com
location: MIA1
plan: plan-1
image: ubuntu-22-04
ssh_keys: [deploy]
"#;
        let doc: InstanceDocument = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(doc.location_slug, "MIA1");
        assert_eq!(doc.ssh_keys, vec!["deploy".to_string()]);
        assert!(doc.id.is_empty());
        assert!(doc.password.is_none());
    }
}
