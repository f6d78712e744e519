use anyhow::{ensure, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{
    query, query_as,
    sqlite::{SqlitePool, SqliteRow},
    FromRow, Row,
};

use crate::domain::{MessageLogEntry, MessageStatus};

#[async_trait]
pub trait MessageLog: Send + Sync {
    async fn append(&self, entry: &MessageLogEntry) -> Result<i64>;

    async fn has_sent_since(&self, listing_id: &str, since: DateTime<Utc>) -> Result<bool>;
}

#[derive(Clone)]
pub struct MessageLogRepository {
    pool: SqlitePool,
}

impl MessageLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn recent(&self, limit: u32) -> Result<Vec<MessageLogEntry>> {
        let rows = query_as::<_, MessageLogRow>(
            r#"SELECT listing_id, listing_url, address, owner_name, message_text, status, reason, meta, created_at
               FROM message_log ORDER BY id DESC LIMIT ?1"#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|row| row.0).collect())
    }
}

#[async_trait]
impl MessageLog for MessageLogRepository {
    async fn append(&self, entry: &MessageLogEntry) -> Result<i64> {
        ensure!(
            entry.has_absolute_url(),
            "listing_url must be an absolute http(s) url, got {:?}",
            entry.listing_url
        );
        let meta = entry.meta.as_ref().map(|m| m.to_string());
        let id = query(
            r#"INSERT INTO message_log
                (listing_id, listing_url, address, owner_name, message_text, status, reason, meta, created_at, sent_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
        )
        .bind(&entry.listing_id)
        .bind(&entry.listing_url)
        .bind(&entry.address)
        .bind(&entry.owner_name)
        .bind(&entry.message_text)
        .bind(entry.status.as_str())
        .bind(&entry.reason)
        .bind(meta)
        .bind(entry.created_at.timestamp_millis())
        .bind(entry.sent_at().map(|ts| ts.timestamp_millis()))
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        tracing::debug!(
            target: "db",
            id,
            listing_id = %entry.listing_id,
            status = %entry.status,
            "message log entry appended"
        );
        Ok(id)
    }

    async fn has_sent_since(&self, listing_id: &str, since: DateTime<Utc>) -> Result<bool> {
        let found: Option<(i64,)> = query_as(
            r#"SELECT id FROM message_log
               WHERE listing_id = ?1 AND status = ?2 AND created_at >= ?3
               LIMIT 1"#,
        )
        .bind(listing_id)
        .bind(MessageStatus::Sent.as_str())
        .bind(since.timestamp_millis())
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }
}

struct MessageLogRow(MessageLogEntry);

impl<'r> FromRow<'r, SqliteRow> for MessageLogRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<MessageStatus>()
            .map_err(|err| sqlx::Error::Decode(err.into()))?;
        let meta: Option<String> = row.try_get("meta")?;
        let created_at: i64 = row.try_get("created_at")?;
        Ok(Self(MessageLogEntry {
            listing_id: row.try_get("listing_id")?,
            listing_url: row.try_get("listing_url")?,
            address: row.try_get("address")?,
            owner_name: row.try_get("owner_name")?,
            message_text: row.try_get("message_text")?,
            status,
            reason: row.try_get("reason")?,
            meta: meta.and_then(|raw| serde_json::from_str(&raw).ok()),
            created_at: Utc
                .timestamp_millis_opt(created_at)
                .single()
                .unwrap_or_default(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn append_is_pure_insert() {
        let (pool, _dir) = test_pool().await;
        let repo = MessageLogRepository::new(pool);

        let first = MessageLogEntry::new("A", "https://x.test/A", "hi", MessageStatus::Failed)
            .with_reason("timeout");
        let second = MessageLogEntry::new("A", "https://x.test/A", "hi", MessageStatus::Sent);
        let id1 = repo.append(&first).await.unwrap();
        let id2 = repo.append(&second).await.unwrap();
        assert!(id2 > id1);

        let recent = repo.recent(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].status, MessageStatus::Sent);
        assert_eq!(recent[1].reason.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn append_rejects_relative_urls() {
        let (pool, _dir) = test_pool().await;
        let repo = MessageLogRepository::new(pool);

        let entry = MessageLogEntry::new("A", "/homedetails/A", "hi", MessageStatus::Sent);
        assert!(repo.append(&entry).await.is_err());
        assert!(repo.recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sent_lookup_respects_status_and_time() {
        let (pool, _dir) = test_pool().await;
        let repo = MessageLogRepository::new(pool);

        let mut old = MessageLogEntry::new("A", "https://x.test/A", "hi", MessageStatus::Sent);
        old.created_at = Utc::now() - Duration::days(40);
        repo.append(&old).await.unwrap();
        repo.append(&MessageLogEntry::new(
            "B",
            "https://x.test/B",
            "hi",
            MessageStatus::Failed,
        ))
        .await
        .unwrap();

        let since = Utc::now() - Duration::days(30);
        assert!(!repo.has_sent_since("A", since).await.unwrap());
        assert!(!repo.has_sent_since("B", since).await.unwrap());
        assert!(repo
            .has_sent_since("A", Utc::now() - Duration::days(41))
            .await
            .unwrap());
    }
}
