//! Escalation from repeated breaches to installed blocks.

use super::blacklist::{Blacklist, BlockEntry};
use super::strikes::StrikeEngine;
use crate::policy::{EscalationScope, PolicyTag};
use chrono::Utc;
use std::time::Duration;
use tracing::warn;

/// Strike identity key for `scope`.
pub(crate) fn identity_key(
    scope: EscalationScope,
    ip: &str,
    path: Option<&str>,
    fingerprint: Option<&str>,
) -> String {
    match scope {
        EscalationScope::Route => format!("ROUTE:{}:{ip}", path.unwrap_or("")),
        EscalationScope::Ip => format!("IP:{ip}"),
        EscalationScope::IpFingerprint => {
            format!("IP_FP:{ip}:{}", fingerprint.unwrap_or("no-fp"))
        }
        EscalationScope::Global => format!("GLOBAL:{ip}"),
    }
}

/// One breach worth of escalation context.
pub(crate) struct Escalation<'a> {
    pub ip: &'a str,
    pub policy: PolicyTag,
    pub scope: EscalationScope,
    pub window: Duration,
    pub threshold: u32,
    pub path: Option<&'a str>,
    pub fingerprint: Option<&'a str>,
    pub promote_to_permanent: bool,
}

/// Register a strike for the breach; on promotion install the block.
///
/// Returns `(promoted, message)`. The block is permanent when the policy
/// demands it or the scope is GLOBAL; otherwise it expires one window from
/// now. Purely in-memory: the durable write is queued by the blacklist.
pub(crate) fn escalate_if_needed(
    strikes: &StrikeEngine,
    blacklist: &Blacklist,
    escalation: Escalation<'_>,
) -> (bool, Option<String>) {
    let key = identity_key(
        escalation.scope,
        escalation.ip,
        escalation.path,
        escalation.fingerprint,
    );

    if !strikes.register_strike(&key, escalation.window, escalation.threshold) {
        return (false, None);
    }

    let now = Utc::now();
    let permanent = escalation.promote_to_permanent || escalation.scope == EscalationScope::Global;
    let mut entry = BlockEntry {
        ip_address: escalation.ip.to_owned(),
        fingerprint_hash: escalation.fingerprint.map(str::to_owned),
        route: escalation.path.map(str::to_owned),
        policy_name: escalation.policy.to_string(),
        scope: escalation.scope.to_string(),
        reason: format!(
            r#"Policy "{}" triggered escalation at scope "{}"."#,
            escalation.policy, escalation.scope
        ),
        is_permanent: permanent,
        is_active: true,
        created_at: now,
        expires_at: None,
    };

    let message = if permanent {
        format!(r#"Permanent block applied by policy "{}"."#, escalation.policy)
    } else {
        let expires_at = now + escalation.window;
        entry.expires_at = Some(expires_at);
        format!(
            r#"Temporary block applied by policy "{}" until "{}"."#,
            escalation.policy,
            expires_at.to_rfc3339()
        )
    };

    warn!(
        ip = %escalation.ip,
        policy = %escalation.policy,
        scope = %escalation.scope,
        permanent = permanent,
        "escalation promoted to block"
    );
    blacklist.install(entry);
    (true, Some(message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_keys_follow_the_scope() {
        assert_eq!(
            identity_key(
                EscalationScope::Route,
                "1.2.3.4",
                Some("/auth/login"),
                None
            ),
            "ROUTE:/auth/login:1.2.3.4"
        );
        assert_eq!(
            identity_key(EscalationScope::Ip, "1.2.3.4", None, None),
            "IP:1.2.3.4"
        );
        assert_eq!(
            identity_key(
                EscalationScope::IpFingerprint,
                "1.2.3.4",
                None,
                Some("abcd")
            ),
            "IP_FP:1.2.3.4:abcd"
        );
        assert_eq!(
            identity_key(EscalationScope::IpFingerprint, "1.2.3.4", None, None),
            "IP_FP:1.2.3.4:no-fp"
        );
        assert_eq!(
            identity_key(EscalationScope::Global, "1.2.3.4", None, None),
            "GLOBAL:1.2.3.4"
        );
    }

    fn escalation<'a>(scope: EscalationScope, threshold: u32, permanent: bool) -> Escalation<'a> {
        Escalation {
            ip: "1.2.3.4",
            policy: PolicyTag::Auth,
            scope,
            window: Duration::from_secs(60),
            threshold,
            path: Some("/auth/login"),
            fingerprint: None,
            promote_to_permanent: permanent,
        }
    }

    #[test]
    fn below_threshold_installs_nothing() {
        let strikes = StrikeEngine::new();
        let blacklist = Blacklist::detached();

        let (promoted, message) =
            escalate_if_needed(&strikes, &blacklist, escalation(EscalationScope::Ip, 3, false));
        assert!(!promoted);
        assert!(message.is_none());
        assert!(blacklist.is_blocked("1.2.3.4", None).is_none());
    }

    #[test]
    fn reaching_the_threshold_installs_a_temporary_block() {
        let strikes = StrikeEngine::new();
        let blacklist = Blacklist::detached();

        escalate_if_needed(&strikes, &blacklist, escalation(EscalationScope::Ip, 2, false));
        let (promoted, message) =
            escalate_if_needed(&strikes, &blacklist, escalation(EscalationScope::Ip, 2, false));

        assert!(promoted);
        assert!(message.is_some_and(|m| m.contains(r#"Temporary block applied by policy "AUTH""#)));
        assert!(blacklist.is_blocked("1.2.3.4", None).is_some());
    }

    #[test]
    fn permanent_flag_installs_a_permanent_block() {
        let strikes = StrikeEngine::new();
        let blacklist = Blacklist::detached();

        let (promoted, message) =
            escalate_if_needed(&strikes, &blacklist, escalation(EscalationScope::Ip, 1, true));
        assert!(promoted);
        assert_eq!(
            message.as_deref(),
            Some(r#"Permanent block applied by policy "AUTH"."#)
        );
    }

    #[test]
    fn global_scope_is_always_permanent() {
        let strikes = StrikeEngine::new();
        let blacklist = Blacklist::detached();

        let (promoted, message) = escalate_if_needed(
            &strikes,
            &blacklist,
            escalation(EscalationScope::Global, 1, false),
        );
        assert!(promoted);
        assert_eq!(
            message.as_deref(),
            Some(r#"Permanent block applied by policy "AUTH"."#)
        );
        assert!(blacklist.is_blocked("1.2.3.4", None).is_some());
    }

    #[test]
    fn fingerprint_scopes_the_installed_block() {
        let strikes = StrikeEngine::new();
        let blacklist = Blacklist::detached();

        let mut escalation = escalation(EscalationScope::IpFingerprint, 1, false);
        escalation.fingerprint = Some("A");
        escalate_if_needed(&strikes, &blacklist, escalation);

        assert!(blacklist.is_blocked("1.2.3.4", Some("A")).is_some());
        assert!(blacklist.is_blocked("1.2.3.4", Some("B")).is_none());
    }
}
