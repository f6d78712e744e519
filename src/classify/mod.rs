pub mod company;
pub mod names;
pub mod policy;
pub mod tables;

pub use company::classify_company_signals;
pub use names::{extract_human_name_candidates, pick_best_candidate};
pub use policy::{BatchCollector, Decision, ExcludeReason, InclusionPolicy};
pub use tables::HeuristicTables;

use crate::domain::{ClassificationResult, SignalBundle};

pub fn classify(bundle: &SignalBundle, tables: &HeuristicTables) -> ClassificationResult {
    let texts = bundle.scoped_texts();
    let candidates = extract_human_name_candidates(&texts, tables);
    let choice = pick_best_candidate(&candidates, &bundle.full_text);
    let signals = classify_company_signals(&texts, tables);

    tracing::debug!(
        target: "classify",
        candidates = candidates.len(),
        owner = ?choice.name,
        confidence = choice.confidence,
        company = signals.is_likely_company,
        "classified listing signals"
    );

    ClassificationResult::from_parts(candidates, choice, signals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Listing;

    fn listing_for(bundle: &SignalBundle) -> Listing {
        Listing {
            id: "e2e".into(),
            url: "https://www.zillow.com/homedetails/e2e/".into(),
            address: bundle.address.clone(),
            price: None,
            bedrooms: None,
            description: bundle.description.clone(),
            listed_by_raw: bundle.listed_by_text.clone(),
            classification: classify(bundle, &HeuristicTables::default()),
            exclude_reason: None,
            timestamp: "2026-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn owner_posted_listing_is_kept() {
        let bundle = SignalBundle {
            description: Some("Owner John Smith here, call anytime.".into()),
            full_text: "Nice house. Posted by owner John Smith. Call anytime.".into(),
            ..Default::default()
        };
        let listing = listing_for(&bundle);
        let class = &listing.classification;

        assert_eq!(class.candidates, vec!["John Smith".to_string()]);
        assert_eq!(class.owner_name.as_deref(), Some("John Smith"));
        assert!((class.owner_confidence - 0.9).abs() < 1e-9);
        assert!(!class.is_likely_company);
        assert_eq!(InclusionPolicy::new(true).decide(&listing), Decision::Kept);
    }

    #[test]
    fn company_wording_elsewhere_still_drops_confident_owner() {
        let bundle = SignalBundle {
            address: Some("12 Elm St".into()),
            description: Some(
                "Owner John Smith here, call anytime. Formerly handled by property management."
                    .into(),
            ),
            full_text: "Posted by owner John Smith. Formerly property management.".into(),
            ..Default::default()
        };
        let listing = listing_for(&bundle);

        assert!((listing.classification.owner_confidence - 0.9).abs() < 1e-9);
        assert!(listing.classification.is_likely_company);
        assert_eq!(
            InclusionPolicy::new(true).decide(&listing),
            Decision::Dropped(ExcludeReason::CompanyOrAgentDetected)
        );
    }

    #[test]
    fn confidence_stays_in_range() {
        let bundle = SignalBundle {
            listed_by_text: Some("Listed by agent Kim Lee".into()),
            full_text: "agent agent listed by Kim Lee agent".into(),
            ..Default::default()
        };
        let class = classify(&bundle, &HeuristicTables::default());
        assert!((0.0..=1.0).contains(&class.owner_confidence));
    }
}
