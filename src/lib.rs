//! Policy-driven HTTP firewall.
//!
//! Fronts an axum router and decides, per request, whether to admit, delay,
//! challenge, or reject the caller: per-route rolling-window rate limits,
//! strike-based escalation, and an in-memory blacklist with background
//! persistence. Wire [`firewall::middleware::FirewallLayer`] in front of any
//! router, or run the bundled binary.

pub mod adaptive;
pub mod app;
pub mod cli;
pub mod config;
pub mod firewall;
pub mod logging;
pub mod policy;
pub mod utils;
pub mod web;
