//! Seam for an adaptive threat observer.
//!
//! The firewall emits one [`ThreatEvent`] before producing a verdict (status
//! and latency zeroed) and one after forwarding (real values), and asks the
//! observer for a [`Decision`] per client key. The observer engine itself
//! lives elsewhere; the pipeline never depends on it for baseline safety and
//! treats any absent or failed decision as [`Decision::Allow`].

use std::hash::{Hash, Hasher};

/// Verdict the observer may return for a client key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Decision {
    #[default]
    Allow,
    Throttle,
    Challenge,
    Kill,
}

/// One request observation.
///
/// Identity components are pre-hashed so the observer never sees raw client
/// data. `status` and `latency_us` are zero on the pre-response emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreatEvent {
    pub ts_us: u64,
    pub ip: u64,
    pub path_hash: u64,
    pub method: u64,
    pub status: u16,
    pub latency_us: u64,
    pub fingerprint: u64,
    pub user_id: u64,
}

/// Client identity triple the observer keys its verdicts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreatKey {
    pub ip: u64,
    pub fingerprint: u64,
    pub user_id: u64,
}

/// External decision source that may veto or degrade a request.
///
/// Implementations must not block: the pipeline calls both methods inline and
/// imposes no timeout of its own, so any I/O behind `decide` needs its own
/// deadline.
pub trait AdaptiveObserver: Send + Sync {
    /// Record an observation. Called once pre-response and once post-response.
    fn observe(&self, event: ThreatEvent);

    /// Current verdict for a client key.
    fn decide(&self, key: ThreatKey) -> Decision;
}

/// Hash an identity component into the observer's key space.
pub fn identity_hash(value: &str) -> u64 {
    let mut hasher = ahash::AHasher::default();
    value.hash(&mut hasher);
    hasher.finish()
}
