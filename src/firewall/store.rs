//! Durable persistence for security blocks.
//!
//! Best-effort by design: the in-memory cache is the request-time authority,
//! and a lost write costs only durability across restarts.

use super::blacklist::BlockEntry;
use futures::stream::BoxStream;
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

const ACTIVE_BLOCKS_QUERY: &str = r#"
SELECT ip_address, fingerprint_hash, route, policy_name, scope, reason,
       is_permanent, is_active, created_at, expires_at
FROM security_blocks
WHERE is_active = 1
"#;

const INSERT_BLOCK_QUERY: &str = r#"
INSERT INTO security_blocks
    (ip_address, fingerprint_hash, route, policy_name, scope, reason,
     is_permanent, is_active, created_at, expires_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
"#;

/// Stream every active block row.
pub fn active_blocks(pool: &SqlitePool) -> BoxStream<'_, Result<BlockEntry, sqlx::Error>> {
    sqlx::query_as::<_, BlockEntry>(ACTIVE_BLOCKS_QUERY).fetch(pool)
}

/// Write one block row.
pub async fn insert_block(pool: &SqlitePool, entry: &BlockEntry) -> Result<(), sqlx::Error> {
    sqlx::query(INSERT_BLOCK_QUERY)
        .bind(&entry.ip_address)
        .bind(&entry.fingerprint_hash)
        .bind(&entry.route)
        .bind(&entry.policy_name)
        .bind(&entry.scope)
        .bind(&entry.reason)
        .bind(entry.is_permanent)
        .bind(entry.is_active)
        .bind(entry.created_at)
        .bind(entry.expires_at)
        .execute(pool)
        .await?;
    Ok(())
}

/// Drain the block writer queue until every sender is dropped.
///
/// Failures are logged and the entry is discarded; the corresponding
/// in-memory block stays effective until cache eviction.
pub fn spawn_writer(pool: SqlitePool, mut rx: mpsc::Receiver<BlockEntry>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(entry) = rx.recv().await {
            match insert_block(&pool, &entry).await {
                Ok(()) => {
                    debug!(ip = %entry.ip_address, policy = %entry.policy_name, "block persisted")
                }
                Err(err) => {
                    error!(error = %err, ip = %entry.ip_address, "failed to persist block")
                }
            }
        }
    })
}
