//! Application bootstrap: configuration, database, firewall assembly,
//! serving.

use crate::config::Config;
use crate::firewall::blacklist::Blacklist;
use crate::firewall::exemptions::Exemptions;
use crate::firewall::middleware::FirewallLayer;
use crate::firewall::{Firewall, store};
use crate::policy::PolicyTable;
use crate::utils::fmt_duration;
use crate::web;
use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Depth of the block persistence queue. When full, writes are dropped in
/// favor of keeping requests flowing.
const BLOCK_WRITER_QUEUE: usize = 1024;

/// Main application struct containing all necessary components.
pub struct App {
    config: Config,
    db_pool: sqlx::SqlitePool,
    firewall: Arc<Firewall>,
}

impl App {
    /// Create a new App instance with all necessary components initialized.
    ///
    /// Fatal conditions: a policy table that exceeds the safety caps, an
    /// unreachable security database, and a failed blacklist preload.
    pub async fn new(config: Config) -> Result<Self, anyhow::Error> {
        let policies = PolicyTable::builtin();
        policies
            .validate()
            .context("policy table exceeds safety caps, refusing to serve")?;

        let connect_options = SqliteConnectOptions::from_str(&config.security_db)
            .context("Failed to parse SECURITY_DB")?
            .create_if_missing(true);

        let db_pool = SqlitePoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(4))
            .connect_with(connect_options)
            .await
            .context("Failed to open security database")?;

        info!(
            db = %config.security_db,
            max_connections = 4,
            acquire_timeout = "4s",
            "security database opened"
        );

        sqlx::migrate!("./migrations")
            .run(&db_pool)
            .await
            .context("Failed to run database migrations")?;

        let (writer_tx, writer_rx) = mpsc::channel(BLOCK_WRITER_QUEUE);
        store::spawn_writer(db_pool.clone(), writer_rx);

        let firewall = Arc::new(Firewall::new(
            policies,
            Exemptions::default(),
            config.fingerprint_header.clone(),
            Blacklist::with_writer(writer_tx),
        ));

        // Durable blocks must be in the cache before the first request.
        let start = Instant::now();
        let preloaded = firewall
            .blacklist()
            .preload(&db_pool)
            .await
            .context("Failed to preload security blocks")?;
        info!(
            blocks = preloaded,
            elapsed = fmt_duration(start.elapsed()),
            "blacklist cache preloaded"
        );

        firewall.spawn_sweepers();

        Ok(Self {
            config,
            db_pool,
            firewall,
        })
    }

    /// Serve the firewalled demo router until shutdown.
    pub async fn run(self) -> Result<(), anyhow::Error> {
        let router = web::router()
            .layer(FirewallLayer::new(Arc::clone(&self.firewall)))
            .layer(TraceLayer::new_for_http());

        let listener = tokio::net::TcpListener::bind(&self.config.listen_addr)
            .await
            .with_context(|| format!("Failed to bind {}", self.config.listen_addr))?;
        info!(addr = %self.config.listen_addr, "rampart listening");

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

        self.db_pool.close().await;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
