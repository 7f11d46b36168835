//! Address candidate selection.
//!
//! Supplier address lists mix houses with flats, commercial units and
//! placeholders. Houses are far more likely to get a dual-fuel quote, so the
//! journey tries those first.

use crate::config::AddressConfig;
use serde::Serialize;
use std::collections::BTreeSet;

/// Words that mark an address as part of a shared building.
pub const SKIP_WORDS: &[&str] = &[
    "flat",
    "floor",
    "apartment",
    "apt",
    "unit",
    "suite",
    "room",
    "basement",
    "1st",
    "2nd",
    "3rd",
    "4th",
    "5th",
];

/// One option of an address list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressCandidate {
    /// Position in the `<select>`.
    pub index: usize,
    pub raw_text: String,
    /// False for fallback candidates taken without the residential filter.
    pub is_residential: bool,
    pub tried: bool,
}

#[derive(Debug, Clone)]
pub struct CandidatePolicy {
    /// Lower-case.
    pub skip_words: Vec<String>,
    pub fallback_width: usize,
}

impl Default for CandidatePolicy {
    fn default() -> Self {
        Self {
            skip_words: SKIP_WORDS.iter().map(|w| w.to_string()).collect(),
            fallback_width: 10,
        }
    }
}

impl CandidatePolicy {
    pub fn from_config(config: &AddressConfig) -> Self {
        let mut policy = Self {
            fallback_width: config.fallback_width,
            ..Self::default()
        };
        policy.skip_words.extend(
            config
                .extra_skip_words
                .iter()
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty()),
        );
        policy
    }

    /// Starts with a house number and mentions no skip word.
    pub fn is_residential(&self, text: &str) -> bool {
        let text = text.trim();
        if !text.starts_with(|c: char| c.is_ascii_digit()) {
            return false;
        }
        let lower = text.to_lowercase();
        !self.skip_words.iter().any(|w| lower.contains(w.as_str()))
    }
}

/// Untried candidates from `start` onwards, in index order.
///
/// When nothing passes the residential filter, the first
/// `policy.fallback_width` untried options from `start` are returned
/// unfiltered so the caller still has something to try.
pub fn candidates(
    options: &[String],
    start: usize,
    tried: &BTreeSet<usize>,
    policy: &CandidatePolicy,
) -> Vec<AddressCandidate> {
    let in_range = || {
        options
            .iter()
            .enumerate()
            .skip(start)
            .filter(|(index, _)| !tried.contains(index))
    };

    let residential: Vec<AddressCandidate> = in_range()
        .filter(|(_, text)| policy.is_residential(text))
        .map(|(index, text)| AddressCandidate {
            index,
            raw_text: text.clone(),
            is_residential: true,
            tried: false,
        })
        .collect();

    if !residential.is_empty() {
        return residential;
    }

    let end = start.saturating_add(policy.fallback_width);
    in_range()
        .take_while(|(index, _)| *index < end)
        .map(|(index, text)| AddressCandidate {
            index,
            raw_text: text.clone(),
            is_residential: false,
            tried: false,
        })
        .collect()
}
