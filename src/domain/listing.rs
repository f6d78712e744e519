use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::ClassificationResult;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalBundle {
    pub address: Option<String>,
    pub description: Option<String>,
    pub listed_by_text: Option<String>,
    pub full_text: String,
}

impl SignalBundle {
    pub fn scoped_texts(&self) -> Vec<&str> {
        [&self.address, &self.description, &self.listed_by_text]
            .into_iter()
            .map(|field| field.as_deref().unwrap_or(""))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: String,
    pub url: String,
    pub address: Option<String>,
    pub price: Option<u32>,
    pub bedrooms: Option<u32>,
    pub description: Option<String>,
    pub listed_by_raw: Option<String>,
    #[serde(flatten)]
    pub classification: ClassificationResult,
    pub exclude_reason: Option<String>,
    pub timestamp: String,
}

impl Listing {
    pub fn id_from_url(url: &str) -> String {
        url.split('/')
            .filter(|segment| !segment.is_empty())
            .last()
            .map(str::to_string)
            .unwrap_or_else(|| url.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub kept: usize,
    pub dropped: usize,
    pub reasons: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub included: Vec<Listing>,
    pub excluded: Vec<Listing>,
    pub summary: BatchSummary,
}
