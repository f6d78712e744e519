use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::NameChoice;

use super::tables::HeuristicTables;

static WORD_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z][A-Za-z'\-]*").expect("valid word regex"));
static SEPARATOR_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[|,;:/#()]").expect("valid separator regex"));
static WHITESPACE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

const BASE_SCORE: f64 = 0.5;
const OWNER_PRESENT_BONUS: f64 = 0.2;
const OWNER_NEARBY_BONUS: f64 = 0.2;
const INTERMEDIARY_NEARBY_PENALTY: f64 = 0.2;
const PROXIMITY_CHARS: usize = 40;

pub fn extract_human_name_candidates(texts: &[&str], tables: &HeuristicTables) -> Vec<String> {
    let mut pool: Vec<String> = Vec::new();
    for text in texts.iter().filter(|t| !t.is_empty()) {
        for phrase in capitalized_phrases(text, tables) {
            if is_company_phrase(phrase, tables) {
                continue;
            }
            let cleaned = normalize_phrase(phrase);
            if !cleaned.is_empty() && !pool.contains(&cleaned) {
                pool.push(cleaned);
            }
        }
    }
    pool
}

pub fn is_company_phrase(phrase: &str, tables: &HeuristicTables) -> bool {
    !tables.company_hits(&phrase.to_lowercase()).is_empty()
}

/// Scores each candidate by how close it sits to "owner" versus intermediary
/// wording in `full_text`. Ties keep the earlier candidate.
pub fn pick_best_candidate(candidates: &[String], full_text: &str) -> NameChoice {
    let Some(first) = candidates.first() else {
        return NameChoice {
            name: None,
            confidence: 0.0,
        };
    };

    let lower = full_text.to_lowercase();
    let owner_anywhere = lower.contains("owner");

    let mut best = first;
    let mut best_score = BASE_SCORE;
    for candidate in candidates {
        let score = score_candidate(candidate, &lower, owner_anywhere);
        if score > best_score {
            best_score = score;
            best = candidate;
        }
    }

    NameChoice {
        name: Some(best.clone()),
        confidence: best_score.clamp(0.0, 1.0),
    }
}

fn score_candidate(candidate: &str, lower_text: &str, owner_anywhere: bool) -> f64 {
    let mut score = BASE_SCORE;
    if owner_anywhere {
        score += OWNER_PRESENT_BONUS;
    }
    let needle = candidate.to_lowercase();
    if let Some(window) = proximity_window(lower_text, &needle) {
        if window.contains("owner") {
            score += OWNER_NEARBY_BONUS;
        }
        if window.contains("listed by") || window.contains("agent") {
            score -= INTERMEDIARY_NEARBY_PENALTY;
        }
    }
    score
}

fn proximity_window<'a>(haystack: &'a str, needle: &str) -> Option<&'a str> {
    let start = haystack.find(needle)?;
    let end = start + needle.len();
    let from = haystack[..start]
        .char_indices()
        .rev()
        .nth(PROXIMITY_CHARS - 1)
        .map(|(idx, _)| idx)
        .unwrap_or(0);
    let to = haystack[end..]
        .char_indices()
        .nth(PROXIMITY_CHARS)
        .map(|(idx, _)| end + idx)
        .unwrap_or(haystack.len());
    Some(&haystack[from..to])
}

fn capitalized_phrases<'a>(text: &'a str, tables: &HeuristicTables) -> Vec<&'a str> {
    let mut phrases = Vec::new();
    let mut run: Vec<(usize, usize)> = Vec::new();
    let mut last_end: Option<usize> = None;

    for word in WORD_REGEX.find_iter(text) {
        let joined = last_end.is_some_and(|end| {
            let gap = &text[end..word.start()];
            !gap.is_empty() && gap.chars().all(char::is_whitespace)
        });
        if !joined {
            flush_run(text, &mut run, &mut phrases);
        }
        if is_capitalized(word.as_str()) && !tables.is_stop_word(word.as_str()) {
            run.push((word.start(), word.end()));
        } else {
            flush_run(text, &mut run, &mut phrases);
        }
        last_end = Some(word.end());
    }
    flush_run(text, &mut run, &mut phrases);
    phrases
}

fn flush_run<'a>(text: &'a str, run: &mut Vec<(usize, usize)>, phrases: &mut Vec<&'a str>) {
    for chunk in run.chunks(3) {
        if chunk.len() >= 2 {
            let (start, _) = chunk[0];
            let (_, end) = chunk[chunk.len() - 1];
            phrases.push(&text[start..end]);
        }
    }
    run.clear();
}

fn is_capitalized(token: &str) -> bool {
    token.chars().next().is_some_and(|c| c.is_ascii_uppercase())
}

fn normalize_phrase(phrase: &str) -> String {
    let stripped = SEPARATOR_REGEX.replace_all(phrase, " ");
    WHITESPACE_REGEX.replace_all(&stripped, " ").trim().to_string()
}
