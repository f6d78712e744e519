use crate::domain::CompanySignals;

use super::tables::HeuristicTables;

const JOIN_SEPARATOR: &str = " · ";

pub fn classify_company_signals(texts: &[&str], tables: &HeuristicTables) -> CompanySignals {
    let joined = texts
        .iter()
        .filter(|t| !t.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(JOIN_SEPARATOR)
        .to_lowercase();

    let keyword_hits = tables.company_hits(&joined);
    CompanySignals {
        is_likely_company: !keyword_hits.is_empty(),
        keyword_hits,
        dom_marker_hits: tables.dom_marker_hits(&joined),
        apartment_signal_hits: tables.apartment_hits(&joined),
    }
}
