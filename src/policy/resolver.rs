//! Path to policy resolution, memoised per raw path.

use super::PolicyTag;
use super::domains::policy_for_domain;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};

/// Entries kept in the path-resolution memo.
const MEMO_CAPACITY: usize = 1024;

/// Map a path to its domain tag by ordered, case-insensitive substring
/// inspection. First match wins.
pub fn resolve_domain(path: &str) -> &'static str {
    let path = path.to_ascii_lowercase();

    if path.contains("/health") {
        return "health";
    }
    if path.contains("/auth") {
        if path.contains("register") {
            return "auth.register";
        }
        if path.contains("otp") {
            return "auth.otp";
        }
        return "auth";
    }
    if path.contains("/admin") {
        return "admin";
    }
    if path.contains("/users") {
        return "users";
    }

    "public"
}

/// Memoised `path -> PolicyTag` resolution.
///
/// Resolution is a pure string scan; the memo just skips it on hot paths.
/// Keyed by the raw path, bounded LRU.
pub struct PolicyResolver {
    memo: Mutex<LruCache<String, PolicyTag>>,
}

impl Default for PolicyResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyResolver {
    pub fn new() -> Self {
        Self::with_capacity(MEMO_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            memo: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn resolve(&self, path: &str) -> PolicyTag {
        let mut memo = self.memo.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tag) = memo.get(path) {
            return *tag;
        }
        let tag = policy_for_domain(resolve_domain(path));
        memo.put(path.to_owned(), tag);
        tag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_resolve_to_domains_in_order() {
        assert_eq!(resolve_domain("/health"), "health");
        assert_eq!(resolve_domain("/api/health/live"), "health");
        assert_eq!(resolve_domain("/auth/login"), "auth");
        assert_eq!(resolve_domain("/auth/register"), "auth.register");
        assert_eq!(resolve_domain("/auth/otp/verify"), "auth.otp");
        assert_eq!(resolve_domain("/admin/users"), "admin");
        assert_eq!(resolve_domain("/users/me"), "users");
        assert_eq!(resolve_domain("/catalog/items"), "public");
    }

    #[test]
    fn resolution_is_case_insensitive() {
        assert_eq!(resolve_domain("/AUTH/Register"), "auth.register");
        assert_eq!(resolve_domain("/Admin"), "admin");
    }

    #[test]
    fn health_wins_over_auth() {
        // Ordered inspection: the health check fires before the auth check.
        assert_eq!(resolve_domain("/auth/health"), "health");
    }

    #[test]
    fn resolver_memoises_and_evicts() {
        let resolver = PolicyResolver::with_capacity(2);
        assert_eq!(resolver.resolve("/auth/login"), PolicyTag::Auth);
        assert_eq!(resolver.resolve("/users/me"), PolicyTag::User);
        // Same answers from the memo.
        assert_eq!(resolver.resolve("/auth/login"), PolicyTag::Auth);
        // A third path evicts the least-recently-used entry without
        // changing any answer.
        assert_eq!(resolver.resolve("/admin"), PolicyTag::Admin);
        assert_eq!(resolver.resolve("/users/me"), PolicyTag::User);
    }
}
