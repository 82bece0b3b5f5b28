//! In-memory gateway
//!
//! Selected by the sentinel API token and used by tests. It implements the
//! same [`Gateway`] trait as the HTTP client, so controllers never know which
//! one they talk to. Knobs that shape its behavior are builder methods; the
//! helpers that poke at its state are inherent methods the owner of the
//! concrete handle calls directly.

use crate::error::{CloudError, ErrorClass, Result};
use crate::gateway::Gateway;
use crate::model::{CreateInstanceRequest, Instance, IpAddress, Location, Plan, SshKey};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::Mutex;

/// How a freshly created instance reaches the ready state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootBehavior {
    /// Built and booted as soon as it exists
    Immediate,
    /// Built on the first observation, booted on the second
    Gradual,
    /// Stays in `building` forever
    Never,
}

#[derive(Debug, Default)]
struct FakeState {
    instances: BTreeMap<String, Instance>,
    ssh_keys: BTreeMap<String, SshKey>,
    passwords: HashMap<String, String>,
    next_instance: u32,
    next_ssh_key: u32,
    create_failures: Option<InjectedFailure>,
}

#[derive(Debug)]
struct InjectedFailure {
    remaining: u32,
    class: ErrorClass,
    message: String,
}

#[derive(Debug, Default)]
struct CallCounters {
    create_instance: AtomicU32,
    get_instance: AtomicU32,
    list_instances: AtomicU32,
    reset_password: AtomicU32,
    create_ssh_key: AtomicU32,
    list_ssh_keys: AtomicU32,
}

/// In-memory gateway
pub struct FakeGateway {
    state: Mutex<FakeState>,
    boot: BootBehavior,
    suspend_on_create: bool,
    echo_identifier: bool,
    anonymous_listings: u32,
    addresses: Vec<String>,
    calls: CallCounters,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            boot: BootBehavior::Immediate,
            suspend_on_create: false,
            echo_identifier: false,
            anonymous_listings: 0,
            addresses: vec!["192.168.1.1".to_string(), "2001:db8::1".to_string()],
            calls: CallCounters::default(),
        }
    }

    pub fn with_boot(mut self, boot: BootBehavior) -> Self {
        self.boot = boot;
        self
    }

    pub fn suspend_on_create(mut self) -> Self {
        self.suspend_on_create = true;
        self
    }

    /// Report the new identifier from `create_instance` instead of `None`.
    pub fn echo_identifier(mut self) -> Self {
        self.echo_identifier = true;
        self
    }

    /// Blank the identifier of every listed instance for the first `calls`
    /// listings, like a control plane that has not assigned it yet.
    pub fn anonymous_listings(mut self, calls: u32) -> Self {
        self.anonymous_listings = calls;
        self
    }

    pub fn with_addresses(mut self, addresses: &[&str]) -> Self {
        self.addresses = addresses.iter().map(|a| a.to_string()).collect();
        self
    }

    /// Make the next `times` instance create calls fail with `class`.
    pub async fn fail_creates(&self, times: u32, class: ErrorClass, message: impl Into<String>) {
        self.state.lock().await.create_failures = Some(InjectedFailure {
            remaining: times,
            class,
            message: message.into(),
        });
    }

    pub async fn insert_instance(&self, instance: Instance) {
        let mut state = self.state.lock().await;
        state.instances.insert(instance.identifier.clone(), instance);
    }

    pub async fn insert_ssh_key(&self, key: SshKey) {
        let mut state = self.state.lock().await;
        state.ssh_keys.insert(key.slug.clone(), key);
    }

    /// Overwrite the remote flags of an instance.
    pub async fn set_flags(&self, id: &str, built: bool, booted: bool, suspended: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        let instance = state
            .instances
            .get_mut(id)
            .ok_or_else(|| CloudError::NotFound(format!("Instance not found: {}", id)))?;
        instance.built = built;
        instance.booted = booted;
        instance.suspended = suspended;
        Ok(())
    }

    /// Peek without advancing the simulated boot.
    pub async fn instance(&self, id: &str) -> Option<Instance> {
        self.state.lock().await.instances.get(id).cloned()
    }

    pub async fn password_of(&self, id: &str) -> Option<String> {
        self.state.lock().await.passwords.get(id).cloned()
    }

    pub async fn instance_count(&self) -> usize {
        self.state.lock().await.instances.len()
    }

    pub fn create_instance_calls(&self) -> u32 {
        self.calls.create_instance.load(Ordering::SeqCst)
    }

    pub fn get_instance_calls(&self) -> u32 {
        self.calls.get_instance.load(Ordering::SeqCst)
    }

    pub fn list_instance_calls(&self) -> u32 {
        self.calls.list_instances.load(Ordering::SeqCst)
    }

    pub fn reset_password_calls(&self) -> u32 {
        self.calls.reset_password.load(Ordering::SeqCst)
    }

    pub fn create_ssh_key_calls(&self) -> u32 {
        self.calls.create_ssh_key.load(Ordering::SeqCst)
    }

    pub fn list_ssh_key_calls(&self) -> u32 {
        self.calls.list_ssh_keys.load(Ordering::SeqCst)
    }

    fn advance(&self, instance: &mut Instance) {
        if self.boot != BootBehavior::Gradual || instance.suspended {
            return;
        }
        if !instance.built {
            instance.built = true;
        } else if !instance.booted {
            instance.booted = true;
        }
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    fn name(&self) -> &str {
        "fake"
    }

    async fn create_instance(&self, request: &CreateInstanceRequest) -> Result<Option<String>> {
        self.calls.create_instance.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().await;

        if let Some(failure) = state.create_failures.as_mut() {
            if failure.remaining > 0 {
                failure.remaining -= 1;
                return Err(failure.class.into_error(failure.message.clone()));
            }
        }

        state.next_instance += 1;
        let id = format!("mock-instance-{}", state.next_instance);
        let ready = self.boot == BootBehavior::Immediate;
        let instance = Instance {
            identifier: id.clone(),
            label: request.label.clone(),
            hostname: request.hostname.clone(),
            built: ready,
            booted: ready,
            suspended: self.suspend_on_create,
            location: Location {
                slug: request.location_slug.clone(),
                ..Default::default()
            },
            ip_addresses: self.addresses.iter().map(IpAddress::new).collect(),
        };
        state.instances.insert(id.clone(), instance);
        if !request.password.is_empty() {
            state.passwords.insert(id.clone(), request.password.clone());
        }

        Ok(self.echo_identifier.then_some(id))
    }

    async fn get_instance(&self, id: &str) -> Result<Instance> {
        self.calls.get_instance.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().await;
        let instance = state
            .instances
            .get_mut(id)
            .ok_or_else(|| CloudError::NotFound(format!("Instance not found: {}", id)))?;
        self.advance(instance);
        Ok(instance.clone())
    }

    async fn list_instances(&self) -> Result<Vec<Instance>> {
        let call = self.calls.list_instances.fetch_add(1, Ordering::SeqCst) + 1;
        let anonymous = call <= self.anonymous_listings;
        let mut state = self.state.lock().await;
        let mut instances = Vec::with_capacity(state.instances.len());
        for instance in state.instances.values_mut() {
            self.advance(instance);
            let mut listed = instance.clone();
            if anonymous {
                listed.identifier.clear();
            }
            instances.push(listed);
        }
        Ok(instances)
    }

    async fn delete_instance(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.passwords.remove(id);
        state
            .instances
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| CloudError::NotFound(format!("Instance not found: {}", id)))
    }

    async fn reset_instance_password(&self, id: &str, password: &str) -> Result<()> {
        self.calls.reset_password.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().await;
        if !state.instances.contains_key(id) {
            return Err(CloudError::NotFound(format!("Instance not found: {}", id)));
        }
        state.passwords.insert(id.to_string(), password.to_string());
        Ok(())
    }

    async fn location_plans(&self, _location: &str) -> Result<Vec<Plan>> {
        Ok(vec![Plan {
            slug: "plan-1".to_string(),
            shortcode: "Basic Plan".to_string(),
            core: 1,
            memory: 1024,
            disk: 10,
            bandwidth: 1000,
            monthly_value: "10.00".to_string(),
            currency_code: "USD".to_string(),
        }])
    }

    async fn get_ssh_key(&self, id: &str) -> Result<SshKey> {
        let state = self.state.lock().await;
        state
            .ssh_keys
            .get(id)
            .cloned()
            .ok_or_else(|| CloudError::NotFound(format!("SSH key not found: {}", id)))
    }

    async fn list_ssh_keys(&self) -> Result<Vec<SshKey>> {
        self.calls.list_ssh_keys.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().await;
        Ok(state.ssh_keys.values().cloned().collect())
    }

    async fn create_ssh_key(&self, title: &str, public_key: &str) -> Result<SshKey> {
        self.calls.create_ssh_key.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().await;

        if state.ssh_keys.values().any(|k| k.title == title) {
            return Err(CloudError::Permanent(format!(
                "SSH key with label '{}' already exists",
                title
            )));
        }

        state.next_ssh_key += 1;
        let key = SshKey {
            slug: format!("mock-ssh-key-{}", state.next_ssh_key),
            title: title.to_string(),
            public_key: public_key.to_string(),
        };
        state.ssh_keys.insert(key.slug.clone(), key.clone());
        Ok(key)
    }

    async fn delete_ssh_key(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .ssh_keys
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| CloudError::NotFound(format!("SSH key not found: {}", id)))
    }
}
