//! Durable round-trips for security blocks.

use chrono::Utc;
use rampart::firewall::blacklist::{Blacklist, BlockEntry};
use rampart::firewall::store;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use std::time::Duration;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// A single-connection pool over one in-memory database.
async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    MIGRATOR.run(&pool).await.unwrap();
    pool
}

fn block(ip: &str, is_active: bool) -> BlockEntry {
    BlockEntry {
        ip_address: ip.to_owned(),
        fingerprint_hash: None,
        route: Some("/auth/login".to_owned()),
        policy_name: "AUTH".to_owned(),
        scope: "IP".to_owned(),
        reason: format!("block for {ip}"),
        is_permanent: true,
        is_active,
        created_at: Utc::now(),
        expires_at: None,
    }
}

#[tokio::test]
async fn preload_restores_every_active_block() {
    let pool = memory_pool().await;
    store::insert_block(&pool, &block("1.1.1.1", true))
        .await
        .unwrap();
    store::insert_block(&pool, &block("2.2.2.2", true))
        .await
        .unwrap();
    store::insert_block(&pool, &block("3.3.3.3", false))
        .await
        .unwrap();

    let blacklist = Blacklist::detached();
    let loaded = blacklist.preload(&pool).await.unwrap();

    assert_eq!(loaded, 2);
    assert_eq!(
        blacklist.is_blocked("1.1.1.1", None).as_deref(),
        Some("block for 1.1.1.1")
    );
    assert!(blacklist.is_blocked("2.2.2.2", None).is_some());
    // Inactive rows are not re-hydrated.
    assert!(blacklist.is_blocked("3.3.3.3", None).is_none());
}

#[tokio::test]
async fn preload_keeps_fingerprint_scoping() {
    let pool = memory_pool().await;
    let mut entry = block("4.4.4.4", true);
    entry.fingerprint_hash = Some("abcd".to_owned());
    entry.scope = "IP_FINGERPRINT".to_owned();
    store::insert_block(&pool, &entry).await.unwrap();

    let blacklist = Blacklist::detached();
    blacklist.preload(&pool).await.unwrap();

    assert!(blacklist.is_blocked("4.4.4.4", Some("abcd")).is_some());
    assert!(blacklist.is_blocked("4.4.4.4", Some("other")).is_none());
    assert!(blacklist.is_blocked("4.4.4.4", None).is_none());
}

#[tokio::test]
async fn temporary_blocks_round_trip_their_expiry() {
    let pool = memory_pool().await;
    let mut entry = block("5.5.5.5", true);
    entry.is_permanent = false;
    entry.expires_at = Some(Utc::now() + Duration::from_secs(600));
    store::insert_block(&pool, &entry).await.unwrap();

    let mut expired = block("5.5.5.6", true);
    expired.is_permanent = false;
    expired.expires_at = Some(Utc::now() - Duration::from_secs(600));
    store::insert_block(&pool, &expired).await.unwrap();

    let blacklist = Blacklist::detached();
    assert_eq!(blacklist.preload(&pool).await.unwrap(), 2);

    assert!(blacklist.is_blocked("5.5.5.5", None).is_some());
    // Rows past their expiry load but read as unblocked.
    assert!(blacklist.is_blocked("5.5.5.6", None).is_none());
}

#[tokio::test]
async fn writer_persists_installed_blocks_in_the_background() {
    let pool = memory_pool().await;
    let (tx, rx) = tokio::sync::mpsc::channel(16);
    store::spawn_writer(pool.clone(), rx);

    let blacklist = Blacklist::with_writer(tx);
    blacklist.install(block("6.6.6.6", true));

    // The cache answers before the durable write lands.
    assert!(blacklist.is_blocked("6.6.6.6", None).is_some());

    let mut rows: i64 = 0;
    for _ in 0..50 {
        rows = sqlx::query_scalar("SELECT COUNT(*) FROM security_blocks")
            .fetch_one(&pool)
            .await
            .unwrap();
        if rows == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(rows, 1);

    let ip: String = sqlx::query_scalar("SELECT ip_address FROM security_blocks")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(ip, "6.6.6.6");
}
