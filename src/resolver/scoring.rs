//! Relevance scoring for catalog search candidates.
//!
//! The catalog's native score measures popularity, not how well a hit matches
//! the query, so every candidate also gets a query-relative relevance score.
//! Thresholds and weights are named constants; ranking combines both scores.

use crate::domain::EntityKind;
use crate::normalize::normalize_for_search;
use std::collections::HashSet;

/// Candidate name equals the query after normalization.
pub const EXACT_NAME_SCORE: f64 = 100.0;
/// Every query word appears in the candidate name.
pub const WORD_SUBSET_SCORE: f64 = 80.0;
/// Scale for partial word overlap, multiplied by the matched share.
pub const PARTIAL_OVERLAP_WEIGHT: f64 = 60.0;
/// Extra credit when the first query word survives into the candidate.
pub const FIRST_WORD_BONUS: f64 = 10.0;
/// No common words, but one name contains the other.
pub const SUBSTRING_SCORE: f64 = 20.0;
/// Persons and groups are what people search for; other catalog entities
/// (orchestras, characters, "other") score slightly lower.
pub const PERSON_OR_GROUP_BONUS: f64 = 5.0;
/// Candidate words beyond the query, over this allowance, cost points each.
pub const EXTRA_WORDS_TOLERATED: usize = 2;
pub const EXTRA_WORD_PENALTY: f64 = 3.0;
/// Entities formed before this year are almost never what a concert query
/// means (classical composers shadowing band names).
pub const EARLY_FORMATION_CUTOFF: i32 = 1700;
pub const EARLY_FORMATION_PENALTY: f64 = 15.0;

/// Relevance floor when five or more candidates scored.
pub const CROWDED_POOL_THRESHOLD: f64 = 25.0;
pub const CROWDED_POOL_SIZE: usize = 5;
/// Relevance floor for sparse result sets.
pub const SPARSE_POOL_THRESHOLD: f64 = 15.0;
/// Retry floor before falling back to catalog-score order.
pub const RESCUE_THRESHOLD: f64 = 10.0;
/// When even the rescue floor keeps nothing, surface the catalog's own
/// favorites rather than returning an empty pool.
pub const PROVIDER_FALLBACK_COUNT: usize = 3;

/// Ranking weights: relevance dominates, provider score breaks ties.
pub const RELEVANCE_WEIGHT: f64 = 1.5;
pub const PROVIDER_SCORE_WEIGHT: f64 = 0.5;
/// Cap on candidates returned to the caller.
pub const MAX_RANKED: usize = 10;

/// Auto-accept needs a near-exact name match...
pub const AUTO_ACCEPT_MIN_RELEVANCE: f64 = 95.0;
/// ...and a clear combined-score lead over the runner-up.
pub const AUTO_ACCEPT_MIN_LEAD: f64 = 20.0;

/// Score one candidate name against the normalized query. `None` means the
/// candidate has nothing in common with the query and is dropped.
pub fn relevance(
    query_norm: &str,
    candidate_name: &str,
    kind: EntityKind,
    begin_year: Option<i32>,
) -> Option<f64> {
    if query_norm.is_empty() {
        return None;
    }
    let candidate_norm = normalize_for_search(candidate_name);
    let base = name_score(query_norm, &candidate_norm)?;

    let mut score = base;
    if matches!(kind, EntityKind::Person | EntityKind::Group) {
        score += PERSON_OR_GROUP_BONUS;
    }

    let query_words = query_norm.split_whitespace().count();
    let candidate_words = candidate_norm.split_whitespace().count();
    let extra = candidate_words.saturating_sub(query_words);
    if extra > EXTRA_WORDS_TOLERATED {
        score -= EXTRA_WORD_PENALTY * (extra - EXTRA_WORDS_TOLERATED) as f64;
    }

    if begin_year.is_some_and(|year| year < EARLY_FORMATION_CUTOFF) {
        score -= EARLY_FORMATION_PENALTY;
    }

    Some(score.clamp(0.0, EXACT_NAME_SCORE))
}

fn name_score(query_norm: &str, candidate_norm: &str) -> Option<f64> {
    if candidate_norm == query_norm {
        return Some(EXACT_NAME_SCORE);
    }

    let query_words: Vec<&str> = query_norm.split_whitespace().collect();
    let query_set: HashSet<&str> = query_words.iter().copied().collect();
    let candidate_set: HashSet<&str> = candidate_norm.split_whitespace().collect();

    let overlap = query_set.intersection(&candidate_set).count();
    if overlap == query_set.len() && !query_set.is_empty() {
        return Some(WORD_SUBSET_SCORE);
    }
    if overlap > 0 {
        let mut score = PARTIAL_OVERLAP_WEIGHT * overlap as f64 / query_set.len() as f64;
        if query_words
            .first()
            .is_some_and(|first| candidate_set.contains(first))
        {
            score += FIRST_WORD_BONUS;
        }
        return Some(score);
    }

    if !candidate_norm.is_empty()
        && (candidate_norm.contains(query_norm) || query_norm.contains(candidate_norm))
    {
        return Some(SUBSTRING_SCORE);
    }

    None
}

/// Ranking score: relevance-dominant blend of both signals.
pub fn combined(relevance: f64, provider_score: i64) -> f64 {
    RELEVANCE_WEIGHT * relevance + PROVIDER_SCORE_WEIGHT * provider_score as f64
}

/// Relevance floor for the scored pool; stricter when the pool is crowded.
pub fn pool_threshold(scored_count: usize) -> f64 {
    if scored_count >= CROWDED_POOL_SIZE {
        CROWDED_POOL_THRESHOLD
    } else {
        SPARSE_POOL_THRESHOLD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rel(query: &str, name: &str) -> Option<f64> {
        relevance(&normalize_for_search(query), name, EntityKind::Other, None)
    }

    #[test]
    fn exact_match_scores_full() {
        assert_eq!(rel("Metallica", "Metallica"), Some(100.0));
        assert_eq!(rel("metallica", "METALLICA"), Some(100.0));
        assert_eq!(rel("Motörhead", "Motorhead"), Some(100.0));
    }

    #[test]
    fn exact_match_caps_at_full_despite_bonus() {
        let score = relevance("metallica", "Metallica", EntityKind::Group, Some(1981));
        assert_eq!(score, Some(100.0));
    }

    #[test]
    fn punctuated_name_still_matches_exactly() {
        assert_eq!(rel("guns n roses", "Guns N' Roses"), Some(100.0));
        assert_eq!(rel("Guns N' Roses", "guns n roses"), Some(100.0));
        assert_eq!(rel("ACDC", "AC/DC"), None);
        assert_eq!(rel("AC/DC", "AC/DC"), Some(100.0));
    }

    #[test]
    fn word_subset_scores_high() {
        // Both query words appear; three extra words cost 1 * 3 after the
        // two-word allowance, group bonus adds 5. The ampersand is not a
        // word.
        let score = relevance(
            "nick cave",
            "Nick Cave & The Bad Seeds",
            EntityKind::Group,
            Some(1983),
        );
        assert_eq!(score, Some(80.0 + 5.0 - 3.0));
    }

    #[test]
    fn partial_overlap_scales_with_matched_share() {
        // 2 of 3 query words, first word included: 60 * 2/3 + 10 = 50.
        let score = rel("the national band", "The National");
        assert_eq!(score, Some(50.0));
    }

    #[test]
    fn partial_overlap_without_first_word() {
        // 1 of 2 query words, first word missing: 60 * 1/2 = 30.
        let score = rel("glass animals", "Animals");
        assert_eq!(score, Some(30.0));
    }

    #[test]
    fn substring_containment_scores_low() {
        // Containment in either direction, only when no words overlap.
        assert_eq!(rel("radiohead", "Radioheads"), Some(20.0));
        assert_eq!(rel("blackmore", "More"), Some(20.0));
    }

    #[test]
    fn unrelated_candidate_is_dropped() {
        assert_eq!(rel("tool", "Led Zeppelin"), None);
        assert_eq!(rel("", "Anything"), None);
    }

    #[test]
    fn early_formation_is_penalized() {
        let modern = relevance("bach", "Bach", EntityKind::Group, Some(1990)).unwrap();
        let ancient = relevance("bach", "Bach", EntityKind::Person, Some(1685)).unwrap();
        assert_eq!(modern, 100.0);
        assert_eq!(ancient, 90.0);
    }

    #[test]
    fn relevance_never_goes_negative() {
        // Substring hit buried under word and formation penalties.
        let score = relevance(
            "orchestra",
            "orchestral manoeuvres in the dark tribute ensemble of the north",
            EntityKind::Other,
            Some(1650),
        );
        assert_eq!(score, Some(0.0));
    }

    #[test]
    fn pool_threshold_tightens_when_crowded() {
        assert_eq!(pool_threshold(5), CROWDED_POOL_THRESHOLD);
        assert_eq!(pool_threshold(12), CROWDED_POOL_THRESHOLD);
        assert_eq!(pool_threshold(4), SPARSE_POOL_THRESHOLD);
        assert_eq!(pool_threshold(1), SPARSE_POOL_THRESHOLD);
    }

    #[test]
    fn combined_weighs_relevance_heavier() {
        assert_eq!(combined(100.0, 98), 199.0);
        assert_eq!(combined(80.0, 70), 155.0);
        assert!(combined(100.0, 0) > combined(60.0, 100));
    }
}
