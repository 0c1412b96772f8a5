// src/search/controller.rs
// Deterministic conversation router: domain detection from text, session
// state, and category filters, plus greeting/short-intent handling. Runs
// before any model call so routing stays predictable and cheap.

use serde_json::Value;

use crate::data::product::FilterMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Vehicles,
    Laptops,
    Books,
    None,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Vehicles => "vehicles",
            Domain::Laptops => "laptops",
            Domain::Books => "books",
            Domain::None => "none",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "vehicles" | "vehicle" | "cars" => Domain::Vehicles,
            "laptops" | "laptop" | "electronics" => Domain::Laptops,
            "books" | "book" => Domain::Books,
            _ => Domain::None,
        }
    }
}

const VEHICLE_CUES: &[&str] = &[
    "car", "cars", "vehicle", "vehicles", "suv", "sedan", "truck", "minivan", "coupe",
    "hatchback", "convertible", "awd", "4wd", "mpg", "mileage", "drivetrain", "toyota",
    "honda", "ford", "chevy", "bmw", "tesla",
];

const LAPTOP_CUES: &[&str] = &[
    "laptop", "laptops", "notebook", "computer", "computers", "pc", "desktop", "desktops",
    "macbook", "chromebook", "electronics", "gpu", "processor", "ram", "monitor",
];

const BOOK_CUES: &[&str] = &[
    "book", "books", "novel", "novels", "read", "reading", "author", "paperback",
    "hardcover", "ebook", "fiction", "mystery", "biography", "genre",
];

const GREETINGS: &[&str] = &[
    "hi", "hello", "hey", "yo", "sup", "howdy", "good morning", "good afternoon",
    "good evening", "help", "hi there", "hello there",
];

fn count_cues(lower: &str, cues: &[&str]) -> usize {
    lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty() && cues.contains(w))
        .count()
}

/// Detect the active domain for this turn. Priority: explicit category
/// filter, then text cues, then the session's current domain.
pub fn detect_domain(
    text: &str,
    active_domain: Option<&str>,
    filters: &FilterMap,
) -> (Domain, &'static str) {
    if let Some(Value::String(category)) = filters.get("category") {
        let from_category = match category.as_str() {
            "Electronics" => Domain::Laptops,
            "Books" => Domain::Books,
            "Vehicles" => Domain::Vehicles,
            _ => Domain::None,
        };
        if from_category != Domain::None {
            return (from_category, "category_filter");
        }
    }

    let lower = text.to_lowercase();
    let scores = [
        (Domain::Vehicles, count_cues(&lower, VEHICLE_CUES)),
        (Domain::Laptops, count_cues(&lower, LAPTOP_CUES)),
        (Domain::Books, count_cues(&lower, BOOK_CUES)),
    ];
    if let Some((domain, hits)) = scores.iter().max_by_key(|(_, n)| *n) {
        if *hits > 0 {
            return (*domain, "text_cue");
        }
    }

    match active_domain.map(Domain::parse) {
        Some(domain) if domain != Domain::None => (domain, "session_domain"),
        _ => (Domain::None, "no_signal"),
    }
}

/// A switch happens when both sides are concrete and different.
pub fn is_domain_switch(active: Option<&str>, detected: Domain) -> bool {
    match (active.map(Domain::parse), detected) {
        (Some(active), detected) if active != Domain::None && detected != Domain::None => {
            active != detected
        }
        _ => false,
    }
}

/// Bare domain mention ("books", "show me laptops") that should seed the
/// category and enter the interview rather than keyword-search.
pub fn is_short_domain_intent(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    let stripped = lower
        .strip_prefix("show me ")
        .or_else(|| lower.strip_prefix("i want "))
        .or_else(|| lower.strip_prefix("i need "))
        .or_else(|| lower.strip_prefix("looking for "))
        .unwrap_or(&lower);
    matches!(
        stripped,
        "laptop" | "laptops" | "a laptop" | "computer" | "computers" | "electronics"
            | "book" | "books" | "a book" | "car" | "cars" | "a car" | "vehicle" | "vehicles"
    )
}

/// Greeting or content-free input: ask the category question, don't search.
pub fn is_greeting_or_ambiguous(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    if lower.is_empty() {
        return true;
    }
    if GREETINGS.contains(&lower.as_str()) {
        return true;
    }
    // No alphabetic content at all ("???", "!!")
    !lower.chars().any(|c| c.is_alphabetic())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_category_filter_wins() {
        let mut filters = FilterMap::new();
        filters.insert("category".into(), json!("Books"));
        let (domain, reason) = detect_domain("show me laptops", None, &filters);
        assert_eq!(domain, Domain::Books);
        assert_eq!(reason, "category_filter");
    }

    #[test]
    fn test_text_cues_beat_session_domain() {
        let (domain, _) = detect_domain("actually I want books", Some("laptops"), &FilterMap::new());
        assert_eq!(domain, Domain::Books);
    }

    #[test]
    fn test_session_domain_fallback() {
        let (domain, reason) = detect_domain("under 1500", Some("laptops"), &FilterMap::new());
        assert_eq!(domain, Domain::Laptops);
        assert_eq!(reason, "session_domain");
    }

    #[test]
    fn test_domain_switch_detection() {
        assert!(is_domain_switch(Some("laptops"), Domain::Books));
        assert!(!is_domain_switch(Some("laptops"), Domain::Laptops));
        assert!(!is_domain_switch(None, Domain::Books));
        assert!(!is_domain_switch(Some("laptops"), Domain::None));
    }

    #[test]
    fn test_greeting_and_short_intent() {
        assert!(is_greeting_or_ambiguous("hello"));
        assert!(is_greeting_or_ambiguous("???"));
        assert!(!is_greeting_or_ambiguous("gaming laptop"));

        assert!(is_short_domain_intent("books"));
        assert!(is_short_domain_intent("Show me laptops"));
        assert!(!is_short_domain_intent("books about rust"));
    }
}
