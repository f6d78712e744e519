use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NameChoice {
    pub name: Option<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanySignals {
    pub is_likely_company: bool,
    pub keyword_hits: Vec<String>,
    pub dom_marker_hits: Vec<String>,
    pub apartment_signal_hits: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub candidates: Vec<String>,
    pub owner_name: Option<String>,
    pub owner_confidence: f64,
    pub is_likely_company: bool,
    pub keyword_hits: Vec<String>,
    pub dom_marker_hits: Vec<String>,
    pub apartment_signal_hits: Vec<String>,
}

impl ClassificationResult {
    pub fn from_parts(candidates: Vec<String>, choice: NameChoice, signals: CompanySignals) -> Self {
        Self {
            candidates,
            owner_name: choice.name,
            owner_confidence: choice.confidence.clamp(0.0, 1.0),
            is_likely_company: signals.is_likely_company,
            keyword_hits: signals.keyword_hits,
            dom_marker_hits: signals.dom_marker_hits,
            apartment_signal_hits: signals.apartment_signal_hits,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueSnapshot {
    pub queued: usize,
    pub paused: bool,
    pub processing: bool,
    pub hour_count: u32,
    pub day_count: u32,
    pub cap_hour: u32,
    pub cap_day: u32,
    pub total_dispatched: u64,
}
