//! The firewall core: shared state and its maintenance tasks.

pub mod blacklist;
pub mod escalation;
pub mod exemptions;
pub mod identity;
pub mod middleware;
pub mod rate_limit;
pub mod store;
pub mod strikes;

use crate::adaptive::AdaptiveObserver;
use crate::config::MAX_WINDOW;
use crate::policy::{PolicyResolver, PolicyTable};
use blacklist::Blacklist;
use exemptions::Exemptions;
use rate_limit::RateLimiter;
use std::sync::Arc;
use std::time::Duration;
use strikes::StrikeEngine;
use tracing::debug;

/// Cadence of the idle-eviction sweepers.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Shared firewall state: policy table and resolver, exemptions, the rolling
/// window rate limiter, the strike engine, and the blacklist.
///
/// One instance is shared (via `Arc`) by every in-flight request.
pub struct Firewall {
    pub(crate) policies: PolicyTable,
    pub(crate) resolver: PolicyResolver,
    pub(crate) exemptions: Exemptions,
    pub(crate) fingerprint_header: String,
    pub(crate) rate_limiter: RateLimiter,
    pub(crate) strikes: StrikeEngine,
    pub(crate) blacklist: Blacklist,
    pub(crate) observer: Option<Arc<dyn AdaptiveObserver>>,
}

impl Firewall {
    pub fn new(
        policies: PolicyTable,
        exemptions: Exemptions,
        fingerprint_header: String,
        blacklist: Blacklist,
    ) -> Self {
        Self {
            policies,
            resolver: PolicyResolver::new(),
            exemptions,
            fingerprint_header,
            rate_limiter: RateLimiter::new(),
            strikes: StrikeEngine::new(),
            blacklist,
            observer: None,
        }
    }

    /// Attach an adaptive observer; its verdicts are applied after the
    /// blacklist and rate-limit checks.
    pub fn with_observer(mut self, observer: Arc<dyn AdaptiveObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn blacklist(&self) -> &Blacklist {
        &self.blacklist
    }

    /// Spawn the background sweepers that bound memory under adversarial key
    /// cardinality: idle rate buckets and strike records older than the
    /// largest permitted window, and blacklist entries past the idle TTL or
    /// the cache capacity. Runs until the process exits.
    pub fn spawn_sweepers(self: &Arc<Self>) {
        let firewall = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.tick().await; // skip the immediate first tick
            loop {
                ticker.tick().await;
                firewall.rate_limiter.sweep_idle(MAX_WINDOW);
                firewall.strikes.sweep_idle(MAX_WINDOW);
                firewall.blacklist.sweep_cache();
                debug!(
                    rate_buckets = firewall.rate_limiter.len(),
                    strike_records = firewall.strikes.len(),
                    cached_blocks = firewall.blacklist.cached_len(),
                    "firewall sweep complete"
                );
            }
        });
    }
}
