use anyhow::Result;
use serde_json::json;
use sqlx::{query, query_as, sqlite::SqlitePool};

use crate::domain::{BatchResult, Listing};

#[derive(Clone)]
pub struct ListingLogRepository {
    pool: SqlitePool,
}

impl ListingLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn record_batch(&self, batch: &BatchResult) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let rows = batch
            .included
            .iter()
            .map(|l| (l, "KEPT"))
            .chain(batch.excluded.iter().map(|l| (l, "DROPPED")));

        let mut written = 0;
        for (listing, status) in rows {
            query(
                r#"INSERT INTO listing_log
                    (listing_id, url, address, price, bedrooms, owner_name, owner_confidence,
                     is_likely_company, exclude_reason, source_signals, status, ts)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"#,
            )
            .bind(&listing.id)
            .bind(&listing.url)
            .bind(&listing.address)
            .bind(listing.price)
            .bind(listing.bedrooms)
            .bind(&listing.classification.owner_name)
            .bind(listing.classification.owner_confidence)
            .bind(listing.classification.is_likely_company)
            .bind(&listing.exclude_reason)
            .bind(source_signals(listing).to_string())
            .bind(status)
            .bind(&listing.timestamp)
            .execute(&mut *tx)
            .await?;
            written += 1;
        }
        tx.commit().await?;
        Ok(written)
    }

    pub async fn count_by_status(&self, status: &str) -> Result<i64> {
        let (count,): (i64,) = query_as(r#"SELECT COUNT(*) FROM listing_log WHERE status = ?1"#)
            .bind(status)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn source_signals(listing: &Listing) -> serde_json::Value {
    let class = &listing.classification;
    json!({
        "has_agent_badge": class.dom_marker_hits.iter().any(|m| m == "agent"),
        "keyword_hits": class.keyword_hits,
        "apartment_signal_hits": class.apartment_signal_hits,
        "dom_marker_hits": class.dom_marker_hits,
        "candidates": class.candidates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        classify::{BatchCollector, Decision, ExcludeReason},
        db::test_pool,
        domain::ClassificationResult,
    };

    fn listing(id: &str) -> Listing {
        Listing {
            id: id.into(),
            url: format!("https://www.zillow.com/homedetails/{id}/"),
            address: Some("12 Elm St".into()),
            price: Some(1995),
            bedrooms: Some(3),
            description: None,
            listed_by_raw: None,
            classification: ClassificationResult::default(),
            exclude_reason: None,
            timestamp: "2026-01-01T00:00:00Z".into(),
        }
    }

    #[tokio::test]
    async fn records_kept_and_dropped_rows() {
        let (pool, _dir) = test_pool().await;
        let repo = ListingLogRepository::new(pool);

        let mut collector = BatchCollector::new();
        collector.record(listing("a"), Decision::Kept);
        collector.record(
            listing("b"),
            Decision::Dropped(ExcludeReason::NoConfidentOwnerName),
        );
        let batch = collector.finish();

        assert_eq!(repo.record_batch(&batch).await.unwrap(), 2);
        assert_eq!(repo.count_by_status("KEPT").await.unwrap(), 1);
        assert_eq!(repo.count_by_status("DROPPED").await.unwrap(), 1);
    }
}
