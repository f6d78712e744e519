use std::{path::Path, str::FromStr, time::Duration};

use anyhow::Result;
use sqlx::{
    query,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions},
};

pub mod listings;
pub mod message_log;
pub mod settings;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS message_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        listing_id TEXT NOT NULL,
        listing_url TEXT NOT NULL,
        address TEXT,
        owner_name TEXT,
        message_text TEXT NOT NULL,
        status TEXT NOT NULL,
        reason TEXT,
        meta TEXT,
        created_at INTEGER NOT NULL,
        sent_at INTEGER
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_message_log_dup
        ON message_log (listing_id, status, created_at)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS listing_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        listing_id TEXT NOT NULL,
        url TEXT NOT NULL,
        address TEXT,
        price INTEGER,
        bedrooms INTEGER,
        owner_name TEXT,
        owner_confidence REAL NOT NULL,
        is_likely_company INTEGER NOT NULL,
        exclude_reason TEXT,
        source_signals TEXT NOT NULL,
        status TEXT NOT NULL,
        ts TEXT NOT NULL,
        logged_at DATETIME DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
    )
    "#,
];

pub async fn init_pool(db_path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(5))
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    migrate(&pool).await?;
    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        query(statement).execute(pool).await?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) async fn test_pool() -> (SqlitePool, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("temp dir");
    let pool = init_pool(&dir.path().join("test.db"))
        .await
        .expect("sqlite pool");
    (pool, dir)
}
