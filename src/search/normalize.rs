// src/search/normalize.rs
// Query normalisation: typo correction plus synonym expansion.

use once_cell::sync::Lazy;
use std::collections::HashMap;

static TYPO_CORRECTIONS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("labtop", "laptop"),
        ("labtops", "laptops"),
        ("lapotp", "laptop"),
        ("laptopp", "laptop"),
        ("notbook", "notebook"),
        ("compter", "computer"),
        ("computr", "computer"),
        ("boks", "books"),
        ("bok", "book"),
        ("novle", "novel"),
        ("vehical", "vehicle"),
        ("vehicals", "vehicles"),
        ("gamming", "gaming"),
        ("bugdet", "budget"),
        ("cheep", "cheap"),
        ("expensiv", "expensive"),
        ("desctop", "desktop"),
        ("macbok", "macbook"),
    ])
});

static SYNONYMS: Lazy<HashMap<&'static str, &'static [&'static str]>> = Lazy::new(|| {
    HashMap::from([
        ("laptop", &["notebook", "computer", "ultrabook"][..]),
        ("laptops", &["notebooks", "computers"][..]),
        ("notebook", &["laptop"][..]),
        ("computer", &["laptop", "pc"][..]),
        ("desktop", &["pc", "tower", "workstation"][..]),
        ("book", &["novel", "title"][..]),
        ("books", &["novels", "titles"][..]),
        ("car", &["vehicle", "auto"][..]),
        ("cars", &["vehicles", "autos"][..]),
        ("suv", &["crossover"][..]),
        ("cheap", &["affordable", "budget"][..]),
        ("gaming", &["gamer", "esports"][..]),
        ("kids", &["children", "family"][..]),
    ])
});

/// Correct common typos token-by-token. Unknown tokens pass through.
pub fn correct_typos(query: &str) -> String {
    query
        .split_whitespace()
        .map(|token| {
            let lower = token.to_lowercase();
            TYPO_CORRECTIONS
                .get(lower.as_str())
                .map(|fixed| fixed.to_string())
                .unwrap_or_else(|| token.to_string())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalise a raw query: trim, typo-correct, and collect synonym expansions
/// for keyword search. Returns (normalised, expanded_terms).
pub fn normalize_query(query: &str) -> (String, Vec<String>) {
    let normalized = correct_typos(query.trim());

    let mut expanded = Vec::new();
    for token in normalized.to_lowercase().split_whitespace() {
        if let Some(synonyms) = SYNONYMS.get(token) {
            for synonym in *synonyms {
                let term = synonym.to_string();
                if !expanded.contains(&term) {
                    expanded.push(term);
                }
            }
        }
    }

    (normalized, expanded)
}
