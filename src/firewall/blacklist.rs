//! In-memory authority for active blocks, with write-through persistence.
//!
//! The cache, not the database, answers at request time: installing a block
//! inserts into the cache synchronously and hands the row to a background
//! writer, so the next probe sees the block before any durable write
//! completes. Startup preload re-hydrates the cache from storage.

use super::store;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::TryStreamExt;
use sqlx::SqlitePool;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Fingerprint slot of a cache key when the block covers the whole IP.
const WILDCARD_FINGERPRINT: &str = "*";

/// Max entries held in the block cache.
pub const BLOCK_CACHE_CAPACITY: usize = 50_000;

/// Entries untouched for this long are evicted by the sweeper.
pub const BLOCK_CACHE_IDLE_TTL: Duration = Duration::from_secs(24 * 3600);

/// Policy name recorded on blocks installed by the adaptive observer path.
pub const ADAPTIVE_POLICY_NAME: &str = "CERBERUS";

/// A block as persisted in `security_blocks`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BlockEntry {
    pub ip_address: String,
    pub fingerprint_hash: Option<String>,
    pub route: Option<String>,
    pub policy_name: String,
    pub scope: String,
    pub reason: String,
    pub is_permanent: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct CachedBlock {
    reason: String,
    is_permanent: bool,
    expires_at: Option<DateTime<Utc>>,
    /// Last insert or probe hit; drives the idle TTL.
    touched: Instant,
}

impl CachedBlock {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        !self.is_permanent && self.expires_at.is_none_or(|expires_at| expires_at <= now)
    }
}

fn cache_key(ip: &str, fingerprint: Option<&str>) -> (String, String) {
    (
        ip.to_owned(),
        fingerprint.unwrap_or(WILDCARD_FINGERPRINT).to_owned(),
    )
}

/// Outcome of a single-key probe. An absent key and an expired entry are
/// distinct: only absence lets the lookup fall through to the wildcard key.
enum Probe {
    Hit(String),
    Expired,
    Miss,
}

/// TTL-bounded cache keyed by `(ip, fingerprint-or-wildcard)`.
#[derive(Debug, Default)]
pub struct BlockCache {
    entries: DashMap<(String, String), CachedBlock>,
}

impl BlockCache {
    pub fn insert(&self, entry: &BlockEntry) {
        let key = cache_key(&entry.ip_address, entry.fingerprint_hash.as_deref());
        self.entries.insert(
            key,
            CachedBlock {
                reason: entry.reason.clone(),
                is_permanent: entry.is_permanent,
                expires_at: entry.expires_at,
                touched: Instant::now(),
            },
        );
        debug!(ip = %entry.ip_address, policy = %entry.policy_name, "block cached");
    }

    /// Probe `(ip, fingerprint)`, then the wildcard `(ip, "*")`.
    ///
    /// Returns the block reason while the entry is unexpired. The exact
    /// probe must run first: an IP-wide block shadows every fingerprint of
    /// that IP. The wildcard is consulted only when the exact key is absent
    /// entirely; an expired exact entry settles the probe as unblocked (and
    /// is evicted), it does not fall through.
    pub fn probe(&self, ip: &str, fingerprint: Option<&str>) -> Option<String> {
        let exact = cache_key(ip, fingerprint);
        match self.probe_key(&exact) {
            Probe::Hit(reason) => Some(reason),
            Probe::Expired => None,
            Probe::Miss => {
                let wildcard = cache_key(ip, None);
                if wildcard == exact {
                    return None;
                }
                match self.probe_key(&wildcard) {
                    Probe::Hit(reason) => Some(reason),
                    Probe::Expired | Probe::Miss => None,
                }
            }
        }
    }

    fn probe_key(&self, key: &(String, String)) -> Probe {
        let now = Utc::now();
        {
            let Some(mut entry) = self.entries.get_mut(key) else {
                return Probe::Miss;
            };
            if !entry.is_expired(now) {
                entry.touched = Instant::now();
                return Probe::Hit(entry.reason.clone());
            }
        }
        // The guard is released before evicting; re-check the expiry so a
        // fresh insert racing this probe survives.
        self.entries.remove_if(key, |_, cached| cached.is_expired(now));
        Probe::Expired
    }

    /// Evict idle entries, then the oldest entries beyond `capacity`.
    pub fn sweep(&self, capacity: usize, idle_ttl: Duration) {
        let now = Instant::now();
        self.entries
            .retain(|_, cached| now.duration_since(cached.touched) < idle_ttl);

        let excess = self.entries.len().saturating_sub(capacity);
        if excess == 0 {
            return;
        }
        let mut by_age: Vec<((String, String), Instant)> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().touched))
            .collect();
        by_age.sort_by_key(|(_, touched)| *touched);
        for (key, _) in by_age.into_iter().take(excess) {
            self.entries.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Write-through block authority: synchronous cache inserts, fire-and-forget
/// durable writes.
pub struct Blacklist {
    cache: BlockCache,
    writer: Option<mpsc::Sender<BlockEntry>>,
}

impl Blacklist {
    /// Cache-only instance; installed blocks are not persisted.
    pub fn detached() -> Self {
        Self {
            cache: BlockCache::default(),
            writer: None,
        }
    }

    /// Blocks are handed to `writer` for background persistence after the
    /// cache insert.
    pub fn with_writer(writer: mpsc::Sender<BlockEntry>) -> Self {
        Self {
            cache: BlockCache::default(),
            writer: Some(writer),
        }
    }

    /// Is this client currently blocked? Returns the block reason if so.
    pub fn is_blocked(&self, ip: &str, fingerprint: Option<&str>) -> Option<String> {
        self.cache.probe(ip, fingerprint)
    }

    /// Install a block: cache insert first, then the durable write is
    /// queued. A full queue drops the write, never the request; the
    /// in-memory block stays effective either way.
    pub fn install(&self, entry: BlockEntry) {
        self.cache.insert(&entry);
        if let Some(writer) = &self.writer
            && let Err(err) = writer.try_send(entry)
        {
            warn!(error = %err, "block write queue unavailable, durable write dropped");
        }
    }

    /// Permanently block a client on behalf of the adaptive observer.
    pub fn promote_permanent(&self, ip: &str, fingerprint: Option<&str>, reason: &str) {
        let scope = if fingerprint.is_some() {
            crate::policy::EscalationScope::IpFingerprint
        } else {
            crate::policy::EscalationScope::Ip
        };
        warn!(ip = %ip, fingerprint = fingerprint.unwrap_or(""), "permanent block promoted");
        self.install(BlockEntry {
            ip_address: ip.to_owned(),
            fingerprint_hash: fingerprint.map(str::to_owned),
            route: None,
            policy_name: ADAPTIVE_POLICY_NAME.to_owned(),
            scope: scope.as_str().to_owned(),
            reason: reason.to_owned(),
            is_permanent: true,
            is_active: true,
            created_at: Utc::now(),
            expires_at: None,
        });
    }

    /// Load every active block from durable storage into the cache.
    ///
    /// Runs before the firewall accepts traffic; a failure here is fatal to
    /// startup, since durable blocks would otherwise silently disappear.
    pub async fn preload(&self, pool: &SqlitePool) -> Result<usize, sqlx::Error> {
        let mut rows = store::active_blocks(pool);
        let mut count = 0usize;
        while let Some(entry) = rows.try_next().await? {
            self.cache.insert(&entry);
            count += 1;
        }
        Ok(count)
    }

    pub(crate) fn sweep_cache(&self) {
        self.cache.sweep(BLOCK_CACHE_CAPACITY, BLOCK_CACHE_IDLE_TTL);
    }

    pub(crate) fn cached_len(&self) -> usize {
        self.cache.len()
    }
}
