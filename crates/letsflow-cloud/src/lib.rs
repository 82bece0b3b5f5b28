//! LetsFlow Cloud Engine
//!
//! Reconciles declared LetsCloud resources (instances and SSH keys) with
//! what the control plane reports. The engine is transport-agnostic: every
//! remote call goes through the [`Gateway`] trait, implemented over HTTP by
//! `letsflow-cloud-letscloud` and in memory by [`FakeGateway`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  LetsFlow CLI                    │
//! │           (letsflow apply / destroy)             │
//! └─────────────────┬───────────────────────────────┘
//!                   │ documents
//! ┌─────────────────▼───────────────────────────────┐
//! │               letsflow-cloud                     │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │   InstanceController / SshKeyController   │   │
//! │  └───┬──────────────┬──────────────┬────────┘   │
//! │  ┌───▼────┐  ┌──────▼─────┐  ┌─────▼──────┐     │
//! │  │ Guard  │  │ RetryConfig│  │   Poller   │     │
//! │  └───┬────┘  └──────┬─────┘  └─────┬──────┘     │
//! │  ┌───▼──────────────▼──────────────▼────────┐   │
//! │  │           trait Gateway { ... }           │   │
//! │  └──────────────────────────────────────────┘   │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │   letscloud   │ │     fake      │
//! │  (HTTP API)   │ │  (in-memory)  │
//! └───────────────┘ └───────────────┘
//! ```

pub mod context;
pub mod error;
pub mod fake;
pub mod gateway;
pub mod guard;
pub mod instance;
pub mod model;
pub mod poller;
pub mod retry;
mod serde_secs;
pub mod sshkey;
pub mod state;

// Re-exports
pub use context::OperationContext;
pub use error::{CloudError, ErrorClass, Result};
pub use fake::{BootBehavior, FakeGateway};
pub use gateway::Gateway;
pub use instance::{ImportDefaults, InstanceController, InstanceDocument};
pub use model::{
    CreateInstanceRequest, Instance, InstanceState, IpAddress, Location, Plan, ResourceKind,
    SshKey,
};
pub use poller::{MatchKey, PollProfile, ReadinessPoller};
pub use retry::{RetryConfig, RetryScope};
pub use sshkey::{SshKeyController, SshKeyDocument, SshKeySelector, normalize_public_key};
pub use state::{ProjectState, StateLock, StateManager, Tracked};
