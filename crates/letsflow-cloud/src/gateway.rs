//! Remote resource gateway trait definition

use crate::error::Result;
use crate::model::{CreateInstanceRequest, Instance, Plan, SshKey};
use async_trait::async_trait;

/// Thin client over the remote control-plane API
///
/// Every method maps 1:1 onto a remote call. Implementations classify
/// failures as `NotFound`, `Transient` or `Permanent` and never retry,
/// poll, or validate business rules; that is the lifecycle controllers' job.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Short name used in logs (e.g. "letscloud", "fake")
    fn name(&self) -> &str;

    /// Request a new instance.
    ///
    /// The control plane acknowledges the request but may not report the
    /// new identifier; `None` means the caller has to discover it.
    async fn create_instance(&self, request: &CreateInstanceRequest) -> Result<Option<String>>;

    async fn get_instance(&self, id: &str) -> Result<Instance>;

    async fn list_instances(&self) -> Result<Vec<Instance>>;

    async fn delete_instance(&self, id: &str) -> Result<()>;

    async fn reset_instance_password(&self, id: &str, password: &str) -> Result<()>;

    async fn location_plans(&self, location: &str) -> Result<Vec<Plan>>;

    async fn get_ssh_key(&self, id: &str) -> Result<SshKey>;

    async fn list_ssh_keys(&self) -> Result<Vec<SshKey>>;

    async fn create_ssh_key(&self, title: &str, public_key: &str) -> Result<SshKey>;

    async fn delete_ssh_key(&self, id: &str) -> Result<()>;
}
