use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::{
    classify::{self, BatchCollector, Decision, ExcludeReason, HeuristicTables, InclusionPolicy},
    config::ScrapeConfig,
    domain::{BatchResult, Listing},
};

use super::{
    extractor::{PageSignalExtractor, PageSignals},
    renderer::NavigationError,
};

pub const MAX_BATCH_LIMIT: usize = 60;

static ZIP_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{5}$").expect("valid zip regex"));

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("invalid scrape request: {0}")]
    Validation(String),
    #[error("no search page could be rendered: {0}")]
    Unavailable(#[source] NavigationError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeRequest {
    pub city_query: Option<String>,
    pub zip_codes: Vec<String>,
    pub max_price: Option<u32>,
    pub min_bedrooms: Option<u32>,
    pub owners_only: bool,
    pub limit: usize,
}

impl Default for ScrapeRequest {
    fn default() -> Self {
        Self {
            city_query: None,
            zip_codes: Vec::new(),
            max_price: None,
            min_bedrooms: None,
            owners_only: true,
            limit: 40,
        }
    }
}

impl ScrapeRequest {
    pub fn from_config(config: &ScrapeConfig) -> Self {
        Self {
            city_query: config.city_query.clone(),
            zip_codes: config.zip_codes.clone(),
            max_price: config.max_price,
            min_bedrooms: config.min_bedrooms,
            owners_only: config.owners_only,
            limit: config.limit,
        }
    }

    pub fn validate(&self) -> Result<(), ScrapeError> {
        if !(1..=MAX_BATCH_LIMIT).contains(&self.limit) {
            return Err(ScrapeError::Validation(format!(
                "limit must be between 1 and {MAX_BATCH_LIMIT}, got {}",
                self.limit
            )));
        }
        if let Some(zip) = self.zip_codes.iter().find(|zip| !ZIP_REGEX.is_match(zip)) {
            return Err(ScrapeError::Validation(format!("zip code {zip:?} is not 5 digits")));
        }
        if self.max_price == Some(0) {
            return Err(ScrapeError::Validation("max_price must be positive".into()));
        }
        let has_city = self
            .city_query
            .as_deref()
            .is_some_and(|city| !city.trim().is_empty());
        if !has_city && self.zip_codes.is_empty() {
            return Err(ScrapeError::Validation(
                "either a city query or zip codes are required".into(),
            ));
        }
        Ok(())
    }

    pub fn search_urls(&self, base_url: &str) -> Vec<String> {
        let base = base_url.trim_end_matches('/');
        self.city_query
            .iter()
            .map(|city| slugify(city))
            .filter(|slug| !slug.is_empty())
            .chain(self.zip_codes.iter().cloned())
            .map(|area| format!("{base}/{area}/rent-houses/"))
            .collect()
    }

    fn outside_filters(&self, signals: &PageSignals) -> bool {
        let over_price = matches!(
            (self.max_price, signals.price),
            (Some(max), Some(price)) if price > max
        );
        let too_small = matches!(
            (self.min_bedrooms, signals.bedrooms),
            (Some(min), Some(beds)) if beds < min
        );
        over_price || too_small
    }
}

fn slugify(city: &str) -> String {
    city.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

pub struct ScrapePipeline {
    extractor: PageSignalExtractor,
    tables: Arc<HeuristicTables>,
    search_base_url: String,
}

impl ScrapePipeline {
    pub fn new(
        extractor: PageSignalExtractor,
        tables: Arc<HeuristicTables>,
        search_base_url: impl Into<String>,
    ) -> Self {
        Self {
            extractor,
            tables,
            search_base_url: search_base_url.into(),
        }
    }

    pub async fn run_batch(&self, request: &ScrapeRequest) -> Result<BatchResult, ScrapeError> {
        request.validate()?;

        let links = self.discover(request).await?;
        tracing::info!(
            target: "scrape",
            links = links.len(),
            limit = request.limit,
            "listing links discovered"
        );

        let policy = InclusionPolicy::new(request.owners_only);
        let mut collector = BatchCollector::new();
        for url in links.into_iter().take(request.limit) {
            let signals = match self.extractor.extract(&url).await {
                Ok(signals) => signals,
                Err(err) => {
                    tracing::warn!(target: "scrape", url = %url, error = %err, "skipping listing");
                    continue;
                }
            };

            let within_filters = !request.outside_filters(&signals);
            let listing = self.build_listing(&url, signals);
            let decision = if within_filters {
                policy.decide(&listing)
            } else {
                Decision::Dropped(ExcludeReason::OutsideSearchFilters)
            };

            tracing::debug!(
                target: "scrape",
                listing_id = %listing.id,
                owner = ?listing.classification.owner_name,
                confidence = listing.classification.owner_confidence,
                decision = ?decision,
                "listing evaluated"
            );
            collector.record(listing, decision);
        }

        let result = collector.finish();
        tracing::info!(
            target: "scrape",
            total = result.summary.total,
            kept = result.summary.kept,
            dropped = result.summary.dropped,
            reasons = ?result.summary.reasons,
            "scrape batch finished"
        );
        Ok(result)
    }

    async fn discover(&self, request: &ScrapeRequest) -> Result<Vec<String>, ScrapeError> {
        let mut links: Vec<String> = Vec::new();
        let mut last_error = None;
        let mut rendered_any = false;

        for search_url in request.search_urls(&self.search_base_url) {
            match self.extractor.discover_listing_links(&search_url).await {
                Ok(found) => {
                    rendered_any = true;
                    for link in found {
                        if !links.contains(&link) {
                            links.push(link);
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(target: "scrape", url = %search_url, error = %err, "search page failed");
                    last_error = Some(err);
                }
            }
        }

        match (rendered_any, last_error) {
            (false, Some(err)) => Err(ScrapeError::Unavailable(err)),
            _ => Ok(links),
        }
    }

    fn build_listing(&self, url: &str, signals: PageSignals) -> Listing {
        let classification = classify::classify(&signals.bundle, &self.tables);
        let PageSignals {
            bundle,
            price,
            bedrooms,
        } = signals;

        Listing {
            id: Listing::id_from_url(url),
            url: url.to_string(),
            address: bundle.address,
            price,
            bedrooms,
            description: bundle.description,
            listed_by_raw: bundle.listed_by_text,
            classification,
            exclude_reason: None,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}
