//! Alternate spellings for city names.
//!
//! Lookups run against search-normalized names, so accent, punctuation and
//! hyphenation differences are already covered by the index itself. What
//! remains are toponym abbreviations ("St" for "Saint", "Mt" for "Mount").

use crate::normalize::normalize_for_search;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Upper bound on generated variants per input.
pub const MAX_VARIANTS: usize = 5;

/// Interchangeable leading words. Every member of a group can stand in for
/// every other member.
static TOPONYM_GROUPS: &[&[&str]] = &[
    &["saint", "st", "san", "santa"],
    &["mount", "mt", "monte"],
];

static TOPONYM_INDEX: Lazy<HashMap<&'static str, &'static [&'static str]>> = Lazy::new(|| {
    let mut index = HashMap::new();
    for group in TOPONYM_GROUPS {
        for member in *group {
            index.insert(*member, *group);
        }
    }
    index
});

/// Generates up to [`MAX_VARIANTS`] alternate spellings of a city name, all
/// in search-normalized form. The input itself is never included.
pub fn spelling_variants(city: &str) -> Vec<String> {
    let base = normalize_for_search(city);
    let mut variants: Vec<String> = Vec::new();

    if let Some((head, rest)) = base.split_once(' ') {
        if let Some(group) = TOPONYM_INDEX.get(head) {
            for member in *group {
                if *member != head {
                    variants.push(format!("{member} {rest}"));
                }
            }
        }
    }

    variants.truncate(MAX_VARIANTS);
    variants
}
