//! Remote resource types as observed through a gateway

use serde::{Deserialize, Serialize};

/// Kind of resource a lifecycle operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Instance,
    SshKey,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Instance => write!(f, "instance"),
            ResourceKind::SshKey => write!(f, "SSH key"),
        }
    }
}

/// Derived lifecycle state of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Suspended,
    Building,
    Running,
    Stopped,
}

impl InstanceState {
    /// Derive the state from the three remote flags.
    ///
    /// Precedence is suspended, then not built, then booted.
    pub fn derive(suspended: bool, built: bool, booted: bool) -> Self {
        if suspended {
            InstanceState::Suspended
        } else if !built {
            InstanceState::Building
        } else if booted {
            InstanceState::Running
        } else {
            InstanceState::Stopped
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceState::Suspended => "suspended",
            InstanceState::Building => "building",
            InstanceState::Running => "running",
            InstanceState::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpAddress {
    pub address: String,
}

impl IpAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    pub fn is_v6(&self) -> bool {
        self.address.contains(':')
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub city: String,
}

/// Instance as returned by the control plane
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub built: bool,
    #[serde(default)]
    pub booted: bool,
    #[serde(default)]
    pub suspended: bool,
    #[serde(default)]
    pub location: Location,
    #[serde(default)]
    pub ip_addresses: Vec<IpAddress>,
}

impl Instance {
    /// State recomputed from the current flags
    pub fn state(&self) -> InstanceState {
        InstanceState::derive(self.suspended, self.built, self.booted)
    }

    /// First address without a colon, or an empty string
    pub fn ipv4(&self) -> String {
        self.ip_addresses
            .iter()
            .find(|ip| !ip.is_v6())
            .map(|ip| ip.address.clone())
            .unwrap_or_default()
    }

    /// First address containing a colon, or an empty string
    pub fn ipv6(&self) -> String {
        self.ip_addresses
            .iter()
            .find(|ip| ip.is_v6())
            .map(|ip| ip.address.clone())
            .unwrap_or_default()
    }

    /// Built, booted and reachable on at least one address family
    pub fn is_ready(&self) -> bool {
        self.built && self.booted && (!self.ipv4().is_empty() || !self.ipv6().is_empty())
    }

    pub fn matches(&self, label: &str, hostname: &str) -> bool {
        self.label == label && self.hostname == hostname
    }

    /// Compact diagnostic line used in poll logs and timeout errors
    pub fn describe_ips(&self) -> String {
        format!("IPv4: {}, IPv6: {}", self.ipv4(), self.ipv6())
    }
}

/// Payload for an instance create call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateInstanceRequest {
    pub location_slug: String,
    pub plan_slug: String,
    pub image_slug: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub ssh_slug: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub password: String,
    pub label: String,
    pub hostname: String,
}

/// Password is write-only; keep it out of logs.
impl std::fmt::Display for CreateInstanceRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "label={} hostname={} location={} plan={} image={} has_ssh_key={} has_password={}",
            self.label,
            self.hostname,
            self.location_slug,
            self.plan_slug,
            self.image_slug,
            !self.ssh_slug.is_empty(),
            !self.password.is_empty()
        )
    }
}

/// Plan offered in a location
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub shortcode: String,
    #[serde(default)]
    pub core: u32,
    #[serde(default)]
    pub memory: u32,
    #[serde(default)]
    pub disk: u32,
    #[serde(default)]
    pub bandwidth: u32,
    #[serde(default)]
    pub monthly_value: String,
    #[serde(default)]
    pub currency_code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshKey {
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub public_key: String,
}

/// Anything the duplicate guard can compare by label
pub trait Labeled {
    fn label(&self) -> &str;
    fn identifier(&self) -> &str;
}

impl Labeled for Instance {
    fn label(&self) -> &str {
        &self.label
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

impl Labeled for SshKey {
    fn label(&self) -> &str {
        &self.title
    }

    fn identifier(&self) -> &str {
        &self.slug
    }
}
