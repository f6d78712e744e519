use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const TABLES_VERSION: u32 = 1;

const COMPANY_KEYWORDS: &[&str] = &[
    "property management",
    "management",
    "mgmt",
    "realty",
    "realtors",
    "realtor",
    "real estate",
    "apartments",
    "apartment",
    "leasing",
    "lease",
    "rentals",
    "homes llc",
    "llc",
    "llp",
    "inc",
    "corp",
    "company",
    "broker",
    "brokerage",
    "team",
    "group",
    "holdings",
    "partners",
    "associates",
    "pm",
    "residential",
    "commercial",
    "leasing office",
    "office",
    "community",
    "complex",
    "apartments llc",
];

const DOM_MARKERS: &[&str] = &[
    "listed by",
    "brokered by",
    "agent",
    "leasing office",
    "apartment community",
    "property manager",
    "managed by",
    "office hours",
    "tour",
    "apply now",
];

const APARTMENT_SIGNALS: &[&str] = &["apply now", "availability", "floor plans", "amenities"];

// Capitalized words that introduce a name rather than belong to it
// ("Owner John Smith", "Call Jane Doe").
const NAME_STOP_WORDS: &[&str] = &[
    "owner", "owners", "landlord", "contact", "call", "text", "email", "listed", "by", "agent",
    "hi", "hello", "please", "welcome", "the", "this", "for", "rent", "sale", "available", "now",
    "managed",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeuristicTables {
    pub version: u32,
    pub company_keywords: Vec<String>,
    pub dom_markers: Vec<String>,
    pub apartment_signals: Vec<String>,
    #[serde(default = "default_stop_words")]
    pub name_stop_words: Vec<String>,
}

impl Default for HeuristicTables {
    fn default() -> Self {
        Self {
            version: TABLES_VERSION,
            company_keywords: owned(COMPANY_KEYWORDS),
            dom_markers: owned(DOM_MARKERS),
            apartment_signals: owned(APARTMENT_SIGNALS),
            name_stop_words: default_stop_words(),
        }
    }
}

impl HeuristicTables {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read heuristic tables {}", path.display()))?;
        let mut tables: Self = serde_json::from_str(&raw)
            .with_context(|| format!("invalid heuristic tables in {}", path.display()))?;
        tables.lowercase_all();
        Ok(tables)
    }

    /// Lists that contain a hit for `haystack`, which must already be lowercase.
    pub fn company_hits(&self, haystack: &str) -> Vec<String> {
        hits(&self.company_keywords, haystack)
    }

    pub fn dom_marker_hits(&self, haystack: &str) -> Vec<String> {
        hits(&self.dom_markers, haystack)
    }

    pub fn apartment_hits(&self, haystack: &str) -> Vec<String> {
        hits(&self.apartment_signals, haystack)
    }

    pub fn is_stop_word(&self, token: &str) -> bool {
        let lower = token.to_lowercase();
        self.name_stop_words.iter().any(|word| *word == lower)
    }

    fn lowercase_all(&mut self) {
        for list in [
            &mut self.company_keywords,
            &mut self.dom_markers,
            &mut self.apartment_signals,
            &mut self.name_stop_words,
        ] {
            for entry in list.iter_mut() {
                *entry = entry.to_lowercase();
            }
        }
    }
}

fn hits(list: &[String], haystack: &str) -> Vec<String> {
    list.iter()
        .filter(|needle| haystack.contains(needle.as_str()))
        .cloned()
        .collect()
}

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn default_stop_words() -> Vec<String> {
    owned(NAME_STOP_WORDS)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn default_tables_are_current_version() {
        let tables = HeuristicTables::default();
        assert_eq!(tables.version, TABLES_VERSION);
        assert_eq!(tables.company_keywords.len(), 33);
        assert!(tables.dom_markers.contains(&"agent".to_string()));
    }

    #[test]
    fn load_lowercases_and_defaults_stop_words() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"version":2,"company_keywords":["Realty"],"dom_markers":["Agent"],"apartment_signals":[]}}"#
        )
        .unwrap();

        let tables = HeuristicTables::load(file.path()).unwrap();
        assert_eq!(tables.version, 2);
        assert_eq!(tables.company_keywords, vec!["realty".to_string()]);
        assert_eq!(tables.dom_markers, vec!["agent".to_string()]);
        assert!(tables.is_stop_word("Owner"));
    }
}
