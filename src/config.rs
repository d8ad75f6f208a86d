//! Infrastructure-level configuration.
//!
//! Rate limits and escalation thresholds are policy-driven (see
//! [`crate::policy::definitions`]); this module only carries the environment
//! settings and the absolute safety caps that stop a misconfigured policy
//! table from taking the server down.

use figment::Figment;
use figment::providers::Env;
use serde::Deserialize;
use std::time::Duration;

/// Hard upper bound on `requests` per window for any policy.
pub const MAX_RATE_LIMIT: u32 = 5000;

/// Longest rolling window any policy may configure (1 hour).
pub const MAX_WINDOW: Duration = Duration::from_secs(3600);

/// Absolute ceiling for a policy's `escalate_after` threshold.
pub const MAX_ESCALATION_COUNT: u32 = 100;

fn default_security_db() -> String {
    "sqlite://system_security.db?mode=rwc".to_owned()
}

fn default_fingerprint_header() -> String {
    "X-Client-Fingerprint".to_owned()
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_owned()
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Connection string for the security database (`SECURITY_DB`).
    #[serde(default = "default_security_db")]
    pub security_db: String,

    /// Header carrying the client-supplied fingerprint token
    /// (`FINGERPRINT_HEADER`).
    #[serde(default = "default_fingerprint_header")]
    pub fingerprint_header: String,

    /// Address the demo server binds to (`LISTEN_ADDR`).
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Base log level for the crate's own targets (`LOG_LEVEL`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            security_db: default_security_db(),
            fingerprint_header: default_fingerprint_header(),
            listen_addr: default_listen_addr(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self, figment::Error> {
        Figment::new().merge(Env::raw()).extract()
    }
}
