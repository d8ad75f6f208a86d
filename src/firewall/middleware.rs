//! The request-time decision pipeline as a tower middleware.
//!
//! Per non-exempt request, in order: resolve the policy, identify the
//! client, emit the adaptive pre-event and fetch a verdict, probe the
//! blacklist, take a rolling-window rate-limit slot, escalate on breach,
//! apply the adaptive verdict, forward, emit the post-event. The verdict is
//! applied only after the blacklist and rate-limit checks; that ordering is
//! load-bearing.

use super::Firewall;
use super::escalation::{Escalation, escalate_if_needed, identity_key};
use super::identity::{client_ip, header_str};
use crate::adaptive::{Decision, ThreatEvent, ThreatKey, identity_hash};
use crate::utils::now_us;
use axum::body::Body;
use axum::extract::{ConnectInfo, Request};
use axum::http::{HeaderValue, StatusCode};
use axum::response::Response;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tower::{Layer, Service};
use tracing::{debug, info, warn};

/// Fixed delay applied to throttled clients.
const THROTTLE_DELAY: Duration = Duration::from_millis(250);

#[derive(Clone)]
pub struct FirewallLayer {
    firewall: Arc<Firewall>,
}

impl FirewallLayer {
    pub fn new(firewall: Arc<Firewall>) -> Self {
        Self { firewall }
    }
}

impl<S> Layer<S> for FirewallLayer {
    type Service = FirewallService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        FirewallService {
            inner,
            firewall: self.firewall.clone(),
        }
    }
}

#[derive(Clone)]
pub struct FirewallService<S> {
    inner: S,
    firewall: Arc<Firewall>,
}

impl<S, ResBody> Service<Request> for FirewallService<S>
where
    S: Service<Request, Response = Response<ResBody>> + Send + Clone + 'static,
    S::Future: Send + 'static,
    S::Error: std::fmt::Debug + Send,
    ResBody: Send + 'static,
    Body: Into<ResBody>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let firewall = Arc::clone(&self.firewall);

        // Swap the inner service out so the pipeline can await before
        // forwarding.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let path = req.uri().path().to_string();
        let method = req.method().clone();

        if firewall.exemptions.is_exempt(&path, &method) {
            debug!(method = %method, path = %path, "exempt request");
            return Box::pin(async move { inner.call(req).await });
        }

        Box::pin(async move {
            let start = Instant::now();
            let start_us = now_us();

            let policy = firewall.resolver.resolve(&path);
            let def = *firewall.policies.get(policy);
            debug!(method = %method, path = %path, policy = %policy, "firewall check");

            let peer = req
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| *addr);
            let ip = client_ip(req.headers(), peer);

            let fingerprint = if def.fingerprint_required {
                header_str(req.headers(), &firewall.fingerprint_header).map(str::to_owned)
            } else {
                None
            };

            // Pre-event: the observer sees every non-exempt request, blocked
            // or not, before any verdict is applied.
            let ip_key = identity_hash(&ip);
            let fp_key = fingerprint.as_deref().map(identity_hash).unwrap_or(0);
            let mut event = ThreatEvent {
                ts_us: start_us,
                ip: ip_key,
                path_hash: identity_hash(&path),
                method: identity_hash(method.as_str()),
                status: 0,
                latency_us: 0,
                fingerprint: fp_key,
                user_id: 0,
            };
            let decision = match &firewall.observer {
                Some(observer) => {
                    observer.observe(event);
                    observer.decide(ThreatKey {
                        ip: ip_key,
                        fingerprint: fp_key,
                        user_id: 0,
                    })
                }
                None => Decision::Allow,
            };

            if let Some(reason) = firewall.blacklist.is_blocked(&ip, fingerprint.as_deref()) {
                warn!(ip = %ip, reason = %reason, "blocked client refused");
                let resp = json_response(
                    StatusCode::FORBIDDEN,
                    json!({"error": "Access blocked", "reason": reason}),
                );
                return Ok(resp.map(Into::into));
            }

            let rate_key = format!(
                "{policy}:{}",
                identity_key(
                    def.escalation_scope,
                    &ip,
                    Some(&path),
                    fingerprint.as_deref()
                )
            );

            if !firewall
                .rate_limiter
                .hit(&rate_key, def.requests, def.window)
            {
                warn!(ip = %ip, policy = %policy, path = %path, "rate limit exceeded");

                let (promoted, reason) = escalate_if_needed(
                    &firewall.strikes,
                    &firewall.blacklist,
                    Escalation {
                        ip: &ip,
                        policy,
                        scope: def.escalation_scope,
                        window: def.window,
                        threshold: def.escalate_after,
                        path: Some(&path),
                        fingerprint: fingerprint.as_deref(),
                        promote_to_permanent: def.global_block,
                    },
                );

                if promoted && def.global_block {
                    let resp = json_response(
                        StatusCode::FORBIDDEN,
                        json!({"error": "Permanently blocked", "reason": reason}),
                    );
                    return Ok(resp.map(Into::into));
                }

                let resp = json_response(
                    StatusCode::TOO_MANY_REQUESTS,
                    json!({
                        "error": "Too many requests",
                        "message": "You are temporarily blocked. Continued abuse will escalate.",
                    }),
                );
                return Ok(resp.map(Into::into));
            }

            match decision {
                Decision::Kill => {
                    warn!(ip = %ip, "adaptive kill");
                    firewall.blacklist.promote_permanent(
                        &ip,
                        fingerprint.as_deref(),
                        "Cerberus autonomous termination",
                    );
                    let resp = json_response(
                        StatusCode::FORBIDDEN,
                        json!({"error": "Access permanently blocked by adaptive security"}),
                    );
                    return Ok(resp.map(Into::into));
                }
                Decision::Challenge => {
                    info!(ip = %ip, "adaptive challenge");
                    let resp = json_response(
                        StatusCode::UNAUTHORIZED,
                        json!({"error": "Additional verification required"}),
                    );
                    return Ok(resp.map(Into::into));
                }
                Decision::Throttle => {
                    info!(ip = %ip, "adaptive throttle");
                    tokio::time::sleep(THROTTLE_DELAY).await;
                }
                Decision::Allow => {}
            }

            let response = inner.call(req).await?;

            if let Some(observer) = &firewall.observer {
                event.status = response.status().as_u16();
                event.latency_us = start.elapsed().as_micros() as u64;
                observer.observe(event);
            }

            Ok(response)
        })
    }
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response<Body> {
    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}
