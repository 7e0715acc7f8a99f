//! Term-based re-ordering of a result page.
//!
//! Names are compared case- and diacritic-insensitively: `"Říčany"`
//! folds to `"ricany"`.

use toponym_map_toponym_models::Toponym;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// How well a name matches the search term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchRank {
    /// The folded name starts with the folded term.
    Prefix,
    /// The folded name contains the folded term elsewhere.
    Contains,
    /// No textual match.
    Other,
}

/// Lowercases `text` and strips diacritics.
///
/// Names are decomposed (NFD) and combining marks dropped, so precomposed
/// and decomposed spellings fold alike. Letters with a stroke do not
/// decompose and are mapped explicitly.
#[must_use]
pub fn fold(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .nfd()
        .filter(|&c| !is_combining_mark(c))
        .map(fold_stroke)
        .collect()
}

const fn fold_stroke(c: char) -> char {
    match c {
        'ł' => 'l',
        'đ' => 'd',
        'ø' => 'o',
        'ħ' => 'h',
        'ŧ' => 't',
        'ı' => 'i',
        other => other,
    }
}

/// Ranks `name` against an already folded term.
#[must_use]
pub fn match_rank(name: &str, folded_term: &str) -> MatchRank {
    let name = fold(name);
    if name.starts_with(folded_term) {
        MatchRank::Prefix
    } else if name.contains(folded_term) {
        MatchRank::Contains
    } else {
        MatchRank::Other
    }
}

/// Re-orders `results` for `term`: prefix matches first, then names
/// containing the term, then the rest. Each group is in folded name
/// order, ties broken by the original spelling.
///
/// Without a non-blank term the page keeps the API's order.
#[must_use]
pub fn rank_by_term(mut results: Vec<Toponym>, term: Option<&str>, language: &str) -> Vec<Toponym> {
    let Some(term) = term.map(str::trim).filter(|term| !term.is_empty()) else {
        return results;
    };
    let folded_term = fold(term);

    results.sort_by_cached_key(|toponym| {
        let name = toponym.display_name(language);
        (match_rank(name, &folded_term), fold(name), name.to_string())
    });
    results
}
