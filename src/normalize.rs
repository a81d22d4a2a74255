//! Name normalization used across resolution, geo lookup and slugs.
//!
//! Two forms are produced from the same raw text. The search form keeps word
//! boundaries (accent folding, symbols replaced by spaces, lowercase,
//! collapsed whitespace) and is what every comparison in the crate runs on.
//! The slug form is the URL-safe identifier derived for stored artists. Both
//! forms are fixed points: normalizing an already-normalized string returns
//! it unchanged.

use unicode_normalization::UnicodeNormalization;

/// A raw string together with its search-normalized form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedString {
    pub original: String,
    pub normalized: String,
}

impl NormalizedString {
    pub fn for_search(input: &str) -> Self {
        Self {
            original: input.to_string(),
            normalized: normalize_for_search(input),
        }
    }

    pub fn for_slug(input: &str) -> Self {
        Self {
            original: input.to_string(),
            normalized: normalize_for_slug(input),
        }
    }
}

/// Normalize free text for comparison and catalog queries.
pub fn normalize_for_search(input: &str) -> String {
    let lowered = input.to_lowercase();
    let stripped = strip_accents(&lowered);
    let folded = fold_symbols(&stripped);
    collapse_whitespace(&folded)
}

/// Normalize a name into a URL slug: alphanumeric runs joined by single
/// hyphens, nothing else.
pub fn normalize_for_slug(input: &str) -> String {
    let searchable = normalize_for_search(input);
    let mut slug = String::with_capacity(searchable.len());
    let mut pending_hyphen = false;
    for c in searchable.chars() {
        if c.is_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }
    slug
}

/// Replace every symbol with a space, keeping alphanumerics and expanding
/// the special letters that canonical decomposition leaves intact, in one
/// pass. The match arm table is the lookup; no repeated `str::replace` scans.
fn fold_symbols(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            'æ' => out.push_str("ae"),
            'œ' => out.push_str("oe"),
            'ß' => out.push_str("ss"),
            'ð' | 'đ' => out.push('d'),
            'þ' => out.push_str("th"),
            'ø' => out.push('o'),
            'ł' => out.push('l'),
            _ if c.is_alphanumeric() || c.is_whitespace() => out.push(c),
            _ => out.push(' '),
        }
    }
    out
}

/// Decompose to NFD and drop combining marks, so "Motörhead" and "Motorhead"
/// compare equal.
fn strip_accents(input: &str) -> String {
    input.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

fn is_combining_mark(c: char) -> bool {
    matches!(c, '\u{0300}'..='\u{036F}' | '\u{1AB0}'..='\u{1AFF}' | '\u{20D0}'..='\u{20FF}')
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}
