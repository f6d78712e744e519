use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use reqwest::Client;
use serde_json::{json, Value};

use crate::domain::{BatchResult, Listing};

pub struct SheetExporter {
    client: Client,
    endpoint: String,
    timezone: Tz,
    timeout: Duration,
}

impl SheetExporter {
    pub fn new(client: Client, endpoint: impl Into<String>, timezone: Tz, timeout: Duration) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            timezone,
            timeout,
        }
    }

    pub async fn export_batch(&self, batch: &BatchResult) {
        let now = Utc::now();
        let mut rows = sheet_rows(&batch.included, "KEPT", now, self.timezone);
        rows.extend(sheet_rows(&batch.excluded, "DROPPED", now, self.timezone));
        if rows.is_empty() {
            return;
        }

        let count = rows.len();
        match self.post(rows).await {
            Ok(()) => tracing::info!(target: "export", rows = count, "exported scrape rows"),
            Err(err) => tracing::warn!(target: "export", rows = count, error = %err, "export failed"),
        }
    }

    async fn post(&self, rows: Vec<Vec<Value>>) -> Result<()> {
        self.client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&json!({ "values": rows }))
            .send()
            .await
            .with_context(|| format!("failed to reach {}", self.endpoint))?
            .error_for_status()
            .context("export endpoint rejected rows")?;
        Ok(())
    }
}

pub fn sheet_rows(listings: &[Listing], status: &str, now: DateTime<Utc>, timezone: Tz) -> Vec<Vec<Value>> {
    let stamp = now.with_timezone(&timezone).to_rfc3339();
    listings
        .iter()
        .map(|listing| {
            let class = &listing.classification;
            vec![
                json!(stamp),
                json!(status),
                json!(listing.id),
                json!(listing.url),
                json!(listing.address.as_deref().unwrap_or_default()),
                listing.price.map_or_else(|| json!(""), |price| json!(price)),
                listing.bedrooms.map_or_else(|| json!(""), |beds| json!(beds)),
                json!(class.owner_name.as_deref().unwrap_or_default()),
                json!(class.owner_confidence),
                json!(if class.is_likely_company { "YES" } else { "NO" }),
                json!(listing.exclude_reason.as_deref().unwrap_or_default()),
                json!(class.keyword_hits.join("|")),
                json!(class.dom_marker_hits.join("|")),
            ]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::domain::ClassificationResult;

    #[test]
    fn rows_use_local_time_and_blank_missing_fields() {
        let listing = Listing {
            id: "9_zpid".into(),
            url: "https://www.zillow.com/homedetails/9_zpid/".into(),
            address: Some("9 Ash Ct".into()),
            price: Some(1_500),
            bedrooms: None,
            description: None,
            listed_by_raw: None,
            classification: ClassificationResult {
                owner_name: Some("Ann Lee".into()),
                owner_confidence: 0.7,
                keyword_hits: vec!["realty".into(), "group".into()],
                ..Default::default()
            },
            exclude_reason: Some("company_or_agent_detected".into()),
            timestamp: "2026-07-01T12:00:00.000Z".into(),
        };
        let now = Utc.with_ymd_and_hms(2026, 7, 1, 17, 0, 0).unwrap();

        let rows = sheet_rows(&[listing], "DROPPED", now, chrono_tz::America::Chicago);

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.len(), 13);
        assert_eq!(row[0], json!("2026-07-01T12:00:00-05:00"));
        assert_eq!(row[1], json!("DROPPED"));
        assert_eq!(row[5], json!(1500));
        assert_eq!(row[6], json!(""));
        assert_eq!(row[9], json!("NO"));
        assert_eq!(row[11], json!("realty|group"));
    }
}
