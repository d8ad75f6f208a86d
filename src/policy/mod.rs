//! Policy model: tags, definitions, domain mapping, and path resolution.

pub mod definitions;
pub mod domains;
pub mod resolver;

pub use definitions::{PolicyDefinition, PolicyError, PolicyTable};
pub use resolver::PolicyResolver;

use std::fmt;

/// Named rate-limit policy classes, one per route family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyTag {
    Public,
    Auth,
    Registration,
    Otp,
    User,
    Admin,
    Internal,
}

impl PolicyTag {
    pub fn as_str(self) -> &'static str {
        match self {
            PolicyTag::Public => "PUBLIC",
            PolicyTag::Auth => "AUTH",
            PolicyTag::Registration => "REGISTRATION",
            PolicyTag::Otp => "OTP",
            PolicyTag::User => "USER",
            PolicyTag::Admin => "ADMIN",
            PolicyTag::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for PolicyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dimension along which requests are aggregated for limiting and escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EscalationScope {
    /// Per route, per IP.
    Route,
    /// Per IP across all routes of the policy.
    Ip,
    /// Per IP and client-supplied fingerprint token.
    IpFingerprint,
    /// Per IP; a promotion at this scope is always permanent.
    Global,
}

impl EscalationScope {
    pub fn as_str(self) -> &'static str {
        match self {
            EscalationScope::Route => "ROUTE",
            EscalationScope::Ip => "IP",
            EscalationScope::IpFingerprint => "IP_FINGERPRINT",
            EscalationScope::Global => "GLOBAL",
        }
    }
}

impl fmt::Display for EscalationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
