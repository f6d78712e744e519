use std::{collections::BTreeMap, fmt};

use crate::domain::{BatchResult, BatchSummary, Listing};

pub const MIN_OWNER_CONFIDENCE: f64 = 0.55;
const AGENT_MARKER: &str = "agent";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExcludeReason {
    NoConfidentOwnerName,
    CompanyOrAgentDetected,
    OutsideSearchFilters,
}

impl ExcludeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExcludeReason::NoConfidentOwnerName => "no_confident_owner_name",
            ExcludeReason::CompanyOrAgentDetected => "company_or_agent_detected",
            ExcludeReason::OutsideSearchFilters => "outside_search_filters",
        }
    }
}

impl fmt::Display for ExcludeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Kept,
    Dropped(ExcludeReason),
}

#[derive(Debug, Clone, Copy)]
pub struct InclusionPolicy {
    pub owners_only: bool,
}

impl InclusionPolicy {
    pub fn new(owners_only: bool) -> Self {
        Self { owners_only }
    }

    pub fn decide(&self, listing: &Listing) -> Decision {
        if !self.owners_only {
            return Decision::Kept;
        }

        let class = &listing.classification;
        if class.owner_name.is_none() || class.owner_confidence < MIN_OWNER_CONFIDENCE {
            return Decision::Dropped(ExcludeReason::NoConfidentOwnerName);
        }

        let agent_marked = class.dom_marker_hits.iter().any(|hit| hit == AGENT_MARKER);
        if class.is_likely_company || !class.apartment_signal_hits.is_empty() || agent_marked {
            return Decision::Dropped(ExcludeReason::CompanyOrAgentDetected);
        }

        Decision::Kept
    }
}

#[derive(Debug, Default)]
pub struct BatchCollector {
    included: Vec<Listing>,
    excluded: Vec<Listing>,
    reasons: BTreeMap<String, usize>,
}

impl BatchCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, mut listing: Listing, decision: Decision) {
        match decision {
            Decision::Kept => {
                listing.exclude_reason = None;
                self.included.push(listing);
            }
            Decision::Dropped(reason) => {
                *self.reasons.entry(reason.as_str().to_string()).or_default() += 1;
                listing.exclude_reason = Some(reason.as_str().to_string());
                self.excluded.push(listing);
            }
        }
    }

    pub fn finish(self) -> BatchResult {
        let summary = BatchSummary {
            total: self.included.len() + self.excluded.len(),
            kept: self.included.len(),
            dropped: self.excluded.len(),
            reasons: self.reasons,
        };
        BatchResult {
            included: self.included,
            excluded: self.excluded,
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ClassificationResult;

    fn listing(name: Option<&str>, confidence: f64) -> Listing {
        Listing {
            id: "1_zpid".into(),
            url: "https://www.zillow.com/homedetails/1_zpid/".into(),
            address: None,
            price: None,
            bedrooms: None,
            description: None,
            listed_by_raw: None,
            classification: ClassificationResult {
                owner_name: name.map(str::to_string),
                owner_confidence: confidence,
                ..Default::default()
            },
            exclude_reason: None,
            timestamp: "2026-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn everything_is_kept_without_owners_only() {
        let policy = InclusionPolicy::new(false);
        let mut l = listing(None, 0.0);
        l.classification.is_likely_company = true;
        assert_eq!(policy.decide(&l), Decision::Kept);
    }

    #[test]
    fn confidence_boundary() {
        let policy = InclusionPolicy::new(true);
        assert_eq!(
            policy.decide(&listing(Some("Jane Doe"), 0.54)),
            Decision::Dropped(ExcludeReason::NoConfidentOwnerName)
        );
        assert_eq!(policy.decide(&listing(Some("Jane Doe"), 0.55)), Decision::Kept);
        assert_eq!(
            policy.decide(&listing(None, 0.9)),
            Decision::Dropped(ExcludeReason::NoConfidentOwnerName)
        );
    }

    #[test]
    fn company_signals_drop_confident_names() {
        let policy = InclusionPolicy::new(true);

        let mut company = listing(Some("Jane Doe"), 0.9);
        company.classification.is_likely_company = true;
        let mut apartments = listing(Some("Jane Doe"), 0.9);
        apartments.classification.apartment_signal_hits = vec!["amenities".into()];
        let mut agent = listing(Some("Jane Doe"), 0.9);
        agent.classification.dom_marker_hits = vec!["agent".into()];

        for l in [company, apartments, agent] {
            assert_eq!(
                policy.decide(&l),
                Decision::Dropped(ExcludeReason::CompanyOrAgentDetected)
            );
        }
    }

    #[test]
    fn other_dom_markers_alone_do_not_drop() {
        let policy = InclusionPolicy::new(true);
        let mut l = listing(Some("Jane Doe"), 0.9);
        l.classification.dom_marker_hits = vec!["tour".into()];
        assert_eq!(policy.decide(&l), Decision::Kept);
    }

    #[test]
    fn histogram_counts_only_dropped() {
        let mut collector = BatchCollector::new();
        collector.record(listing(Some("Jane Doe"), 0.9), Decision::Kept);
        collector.record(
            listing(None, 0.0),
            Decision::Dropped(ExcludeReason::NoConfidentOwnerName),
        );
        collector.record(
            listing(None, 0.0),
            Decision::Dropped(ExcludeReason::NoConfidentOwnerName),
        );
        collector.record(
            listing(Some("Jane Doe"), 0.9),
            Decision::Dropped(ExcludeReason::CompanyOrAgentDetected),
        );

        let result = collector.finish();
        assert_eq!(result.summary.total, 4);
        assert_eq!(result.summary.kept, 1);
        assert_eq!(result.summary.dropped, 3);
        assert_eq!(result.summary.reasons.get("no_confident_owner_name"), Some(&2));
        assert_eq!(result.summary.reasons.get("company_or_agent_detected"), Some(&1));
        assert_eq!(result.summary.reasons.len(), 2);
        assert_eq!(
            result.excluded[0].exclude_reason.as_deref(),
            Some("no_confident_owner_name")
        );
        assert!(result.included[0].exclude_reason.is_none());
    }
}
