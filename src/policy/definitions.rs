//! Per-policy rate-limit and escalation parameters.

use super::{EscalationScope, PolicyTag};
use crate::config::{MAX_ESCALATION_COUNT, MAX_RATE_LIMIT, MAX_WINDOW};
use std::time::Duration;

/// Immutable bundle of rate-limit and escalation parameters for one policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyDefinition {
    /// Max requests allowed inside the rolling window.
    pub requests: u32,
    /// Length of the rolling window.
    pub window: Duration,
    /// Breaches within the window before a block is installed; 0 disables
    /// escalation entirely.
    pub escalate_after: u32,
    /// Identity dimension strikes and blocks are keyed on.
    pub escalation_scope: EscalationScope,
    /// Whether the client fingerprint header participates in identity.
    pub fingerprint_required: bool,
    /// Whether an escalation installs a permanent block instead of a
    /// window-bounded one.
    pub global_block: bool,
}

/// A policy table that exceeds the compiled-in safety caps.
///
/// Surfaced at startup; the process refuses to serve traffic under a table
/// that could let a single policy overwhelm the server.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("policy {policy}: {requests} requests per window exceeds the cap of {max}")]
    RequestsAboveCap {
        policy: PolicyTag,
        requests: u32,
        max: u32,
    },
    #[error("policy {policy}: window of {window_secs}s exceeds the cap of {max_secs}s")]
    WindowAboveCap {
        policy: PolicyTag,
        window_secs: u64,
        max_secs: u64,
    },
    #[error("policy {policy}: escalate_after of {escalate_after} exceeds the cap of {max}")]
    EscalationAboveCap {
        policy: PolicyTag,
        escalate_after: u32,
        max: u32,
    },
}

/// The full policy table, one definition per tag.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    pub public: PolicyDefinition,
    pub auth: PolicyDefinition,
    pub registration: PolicyDefinition,
    pub otp: PolicyDefinition,
    pub user: PolicyDefinition,
    pub admin: PolicyDefinition,
    pub internal: PolicyDefinition,
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PolicyTable {
    /// The built-in policy table.
    pub fn builtin() -> Self {
        Self {
            public: PolicyDefinition {
                requests: 120,
                window: Duration::from_secs(60),
                escalate_after: 10,
                escalation_scope: EscalationScope::Route,
                fingerprint_required: false,
                global_block: false,
            },
            auth: PolicyDefinition {
                requests: 30,
                window: Duration::from_secs(60),
                escalate_after: 5,
                escalation_scope: EscalationScope::Ip,
                fingerprint_required: false,
                global_block: true,
            },
            registration: PolicyDefinition {
                requests: 5,
                window: Duration::from_secs(30 * 60),
                escalate_after: 10,
                escalation_scope: EscalationScope::IpFingerprint,
                fingerprint_required: true,
                global_block: true,
            },
            otp: PolicyDefinition {
                requests: 5,
                window: Duration::from_secs(10 * 60),
                escalate_after: 2,
                escalation_scope: EscalationScope::IpFingerprint,
                fingerprint_required: true,
                global_block: false,
            },
            user: PolicyDefinition {
                requests: 120,
                window: Duration::from_secs(60),
                escalate_after: 10,
                escalation_scope: EscalationScope::Route,
                fingerprint_required: false,
                global_block: false,
            },
            admin: PolicyDefinition {
                requests: 20,
                window: Duration::from_secs(60),
                escalate_after: 3,
                escalation_scope: EscalationScope::Ip,
                fingerprint_required: true,
                global_block: true,
            },
            internal: PolicyDefinition {
                requests: 1000,
                window: Duration::from_secs(60),
                escalate_after: 0,
                escalation_scope: EscalationScope::IpFingerprint,
                fingerprint_required: false,
                global_block: false,
            },
        }
    }

    pub fn get(&self, tag: PolicyTag) -> &PolicyDefinition {
        match tag {
            PolicyTag::Public => &self.public,
            PolicyTag::Auth => &self.auth,
            PolicyTag::Registration => &self.registration,
            PolicyTag::Otp => &self.otp,
            PolicyTag::User => &self.user,
            PolicyTag::Admin => &self.admin,
            PolicyTag::Internal => &self.internal,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (PolicyTag, &PolicyDefinition)> {
        [
            (PolicyTag::Public, &self.public),
            (PolicyTag::Auth, &self.auth),
            (PolicyTag::Registration, &self.registration),
            (PolicyTag::Otp, &self.otp),
            (PolicyTag::User, &self.user),
            (PolicyTag::Admin, &self.admin),
            (PolicyTag::Internal, &self.internal),
        ]
        .into_iter()
    }

    /// Check every definition against the compiled-in safety caps.
    pub fn validate(&self) -> Result<(), PolicyError> {
        for (policy, def) in self.iter() {
            if def.requests > MAX_RATE_LIMIT {
                return Err(PolicyError::RequestsAboveCap {
                    policy,
                    requests: def.requests,
                    max: MAX_RATE_LIMIT,
                });
            }
            if def.window > MAX_WINDOW {
                return Err(PolicyError::WindowAboveCap {
                    policy,
                    window_secs: def.window.as_secs(),
                    max_secs: MAX_WINDOW.as_secs(),
                });
            }
            if def.escalate_after > MAX_ESCALATION_COUNT {
                return Err(PolicyError::EscalationAboveCap {
                    policy,
                    escalate_after: def.escalate_after,
                    max: MAX_ESCALATION_COUNT,
                });
            }
        }
        Ok(())
    }
}
