//! Readiness polling for instances
//!
//! Waits for an instance to become usable after a create request, in the
//! spirit of a readiness probe. One poller serves both ways of finding the
//! instance: by identifier when it is known, or by label and hostname while
//! the control plane has not told us the identifier yet.

use crate::context::OperationContext;
use crate::error::{CloudError, Result};
use crate::gateway::Gateway;
use crate::model::Instance;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Attempt budget and interval for one poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollProfile {
    pub max_attempts: u32,
    #[serde(with = "crate::serde_secs")]
    pub interval: Duration,
}

impl PollProfile {
    pub const fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// 400 × 3s ≈ 20 minutes, used while the identifier is unknown
    pub const fn long() -> Self {
        Self::new(400, Duration::from_secs(3))
    }

    /// 10 × 60s ≈ 10 minutes, used when the identifier is known
    pub const fn short() -> Self {
        Self::new(10, Duration::from_secs(60))
    }

    /// Worst-case wait, ignoring request latency
    pub fn budget(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts)
    }
}

/// How the poller correlates remote instances with the one it waits for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchKey {
    Identifier(String),
    LabelHostname { label: String, hostname: String },
}

impl std::fmt::Display for MatchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchKey::Identifier(id) => write!(f, "instance {}", id),
            MatchKey::LabelHostname { label, hostname } => {
                write!(f, "instance with label {} and hostname {}", label, hostname)
            }
        }
    }
}

/// Where the poll stands between ticks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollPhase {
    /// Identity not known yet
    Searching,
    /// Identity captured, resource fetched at least once
    Observed { instance_id: String },
}

/// Outcome of a single tick
#[derive(Debug)]
enum Tick {
    Ready(Instance),
    Pending,
}

/// Diagnostics kept across ticks for the timeout message
#[derive(Debug, Default)]
struct LastSeen {
    state: String,
    error: String,
    ips: String,
    response: String,
}

/// Bounded poller waiting for an instance to be built, booted and addressed
pub struct ReadinessPoller<'a> {
    gateway: &'a dyn Gateway,
    profile: PollProfile,
}

impl<'a> ReadinessPoller<'a> {
    pub fn new(gateway: &'a dyn Gateway, profile: PollProfile) -> Self {
        Self { gateway, profile }
    }

    /// Poll until the instance is ready, suspended, or the budget runs out.
    ///
    /// Makes exactly `max_attempts` gateway observations before giving up
    /// with `TimedOut`, and does not sleep after the last one.
    pub async fn wait_until_ready(&self, key: &MatchKey, ctx: &OperationContext) -> Result<Instance> {
        let max_attempts = self.profile.max_attempts;
        let interval = self.profile.interval;
        let mut phase = match key {
            MatchKey::Identifier(id) => PollPhase::Observed {
                instance_id: id.clone(),
            },
            MatchKey::LabelHostname { .. } => PollPhase::Searching,
        };
        let mut last = LastSeen::default();

        for attempt in 1..=max_attempts {
            ctx.check()?;
            let seconds_elapsed = interval.as_secs() * u64::from(attempt - 1);

            tracing::info!(
                target_instance = %key,
                attempt,
                max_attempts,
                seconds_elapsed,
                last_error = %last.error,
                last_state = %last.state,
                last_ips = %last.ips,
                "Checking instance status"
            );

            match self.tick(key, &mut phase, &mut last, attempt).await? {
                Tick::Ready(instance) => {
                    tracing::info!(
                        instance_id = %instance.identifier,
                        state = %instance.state(),
                        ipv4 = %instance.ipv4(),
                        ipv6 = %instance.ipv6(),
                        attempt,
                        "Instance is ready"
                    );
                    return Ok(instance);
                }
                Tick::Pending => {}
            }

            if attempt < max_attempts {
                ctx.sleep(interval).await?;
            }
        }

        Err(CloudError::TimedOut {
            target: key.to_string(),
            attempts: max_attempts,
            waited_secs: self.profile.budget().as_secs(),
            last_state: last.state,
            last_error: last.error,
            last_ips: last.ips,
            last_response: last.response,
        })
    }

    async fn tick(
        &self,
        key: &MatchKey,
        phase: &mut PollPhase,
        last: &mut LastSeen,
        attempt: u32,
    ) -> Result<Tick> {
        let found = match self.observe(key, phase).await {
            Ok(found) => found,
            Err(e) if e.is_not_found() => {
                tracing::info!(
                    target_instance = %key,
                    attempt,
                    max_attempts = self.profile.max_attempts,
                    "Instance not found yet, waiting..."
                );
                last.error = e.to_string();
                return Ok(Tick::Pending);
            }
            Err(e) => {
                tracing::warn!(
                    target_instance = %key,
                    attempt,
                    max_attempts = self.profile.max_attempts,
                    error = %e,
                    "Error observing instance"
                );
                last.error = e.to_string();
                return Ok(Tick::Pending);
            }
        };

        let Some(instance) = found else {
            tracing::info!(
                target_instance = %key,
                attempt,
                max_attempts = self.profile.max_attempts,
                "Instance not found yet, waiting..."
            );
            return Ok(Tick::Pending);
        };

        // A listed candidate may not carry its identifier yet; keep searching
        // by label and hostname until it does.
        if *phase == PollPhase::Searching && !instance.identifier.is_empty() {
            tracing::debug!(instance_id = %instance.identifier, "Discovered instance identifier");
            *phase = PollPhase::Observed {
                instance_id: instance.identifier.clone(),
            };
        }

        let state = instance.state();
        last.state = state.to_string();
        last.ips = instance.describe_ips();
        last.response = format!("{:?}", instance);

        tracing::info!(
            instance_id = %instance.identifier,
            built = instance.built,
            booted = instance.booted,
            suspended = instance.suspended,
            state = %state,
            ipv4 = %instance.ipv4(),
            ipv6 = %instance.ipv6(),
            attempt,
            "Current instance state"
        );

        if instance.suspended {
            return Err(CloudError::Suspended {
                instance_id: instance.identifier,
                label: instance.label,
                hostname: instance.hostname,
                attempt,
                built: instance.built,
                booted: instance.booted,
            });
        }

        if instance.is_ready() {
            return Ok(Tick::Ready(instance));
        }

        Ok(Tick::Pending)
    }

    /// One gateway observation; `None` while no listed instance matches.
    async fn observe(&self, key: &MatchKey, phase: &PollPhase) -> Result<Option<Instance>> {
        match (key, phase) {
            (_, PollPhase::Observed { instance_id }) => {
                self.gateway.get_instance(instance_id).await.map(Some)
            }
            (MatchKey::LabelHostname { label, hostname }, PollPhase::Searching) => {
                let instances = self.gateway.list_instances().await?;
                Ok(instances.into_iter().find(|i| i.matches(label, hostname)))
            }
            (MatchKey::Identifier(id), PollPhase::Searching) => {
                // Not reachable: identifier keys start Observed.
                Err(CloudError::InvalidResponse(format!(
                    "instance {} polled without an identity",
                    id
                )))
            }
        }
    }
}
