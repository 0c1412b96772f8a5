// src/interview/entropy_select.rs
// Entropy-based question selection: amongst dimensions the user has neither
// constrained nor been asked about, propose the one whose value distribution
// over the current candidates is most uncertain.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::data::product::{FilterMap, Product};
use crate::diversify::entropy::{compute_dimension_entropy, is_numerical};

/// Dimensions worth asking about, with question-friendly topic names.
pub static QUESTIONABLE_DIMENSIONS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("price", "budget"),
        ("body_style", "body type"),
        ("fuel_type", "fuel type"),
        ("drivetrain", "drivetrain"),
        ("make", "brand preference"),
        ("year", "vehicle age"),
        ("mileage", "mileage preference"),
        ("transmission", "transmission"),
        ("is_used", "new vs used"),
    ])
});

/// Filter keys that already pin a dimension. A model constraint implies the
/// make is effectively chosen too.
static FILTER_TO_DIMENSION: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("price", "price"),
        ("body_style", "body_style"),
        ("fuel_type", "fuel_type"),
        ("make", "make"),
        ("model", "make"),
        ("year", "year"),
        ("mileage", "mileage"),
        ("drivetrain", "drivetrain"),
        ("transmission", "transmission"),
        ("is_used", "is_used"),
    ])
});

pub fn specified_dimensions(explicit_filters: &FilterMap) -> HashSet<&'static str> {
    explicit_filters
        .iter()
        .filter(|(_, v)| !v.is_null())
        .filter_map(|(k, _)| FILTER_TO_DIMENSION.get(k.as_str()).copied())
        .collect()
}

/// Highest-entropy uncovered dimension above the threshold, or None when no
/// question is worth asking.
pub fn select_question_dimension(
    candidates: &[Product],
    explicit_filters: &FilterMap,
    asked_dimensions: &HashSet<String>,
    min_entropy_threshold: f64,
) -> Option<String> {
    if candidates.is_empty() {
        return None;
    }

    let specified = specified_dimensions(explicit_filters);
    let mut scored: Vec<(&str, f64)> = QUESTIONABLE_DIMENSIONS
        .keys()
        .filter(|dim| !specified.contains(*dim) && !asked_dimensions.contains(**dim))
        .map(|dim| (*dim, compute_dimension_entropy(candidates, dim, 5)))
        .collect();

    if scored.is_empty() {
        info!("All questionable dimensions covered");
        return None;
    }
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    for (dim, entropy) in scored.iter().take(5) {
        debug!("Entropy[{}] = {:.3}", dim, entropy);
    }

    let (best, entropy) = scored[0];
    if entropy < min_entropy_threshold {
        info!(
            "Best entropy {:.3} below threshold {:.3}; no question",
            entropy, min_entropy_threshold
        );
        return None;
    }
    info!("Entropy question dimension: {} ({:.3} bits)", best, entropy);
    Some(best.to_string())
}

pub fn dimension_topic(dimension: &str) -> &str {
    QUESTIONABLE_DIMENSIONS.get(dimension).copied().unwrap_or(dimension)
}

/// Distribution summary handed to the question generator so phrasing can
/// reflect the actual inventory.
pub fn dimension_context(dimension: &str, candidates: &[Product]) -> String {
    if is_numerical(dimension) {
        let values: Vec<f64> = candidates
            .iter()
            .filter_map(|p| p.numeric_value(dimension))
            .collect();
        match (
            values.iter().cloned().reduce(f64::min),
            values.iter().cloned().reduce(f64::max),
        ) {
            (Some(low), Some(high)) => match dimension {
                "price" => format!("inventory spans ${:.0} - ${:.0}", low, high),
                "mileage" => format!("inventory spans {:.0} - {:.0} miles", low, high),
                _ => format!("inventory spans {:.0} - {:.0}", low, high),
            },
            _ => "no data".to_string(),
        }
    } else {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for p in candidates {
            if let Some(v) = p.string_value(dimension) {
                *counts.entry(v).or_insert(0) += 1;
            }
        }
        let mut top: Vec<(String, usize)> = counts.into_iter().collect();
        top.sort_by_key(|(_, n)| std::cmp::Reverse(*n));
        let names: Vec<String> = top.into_iter().take(5).map(|(v, _)| v).collect();
        format!("common values: {}", names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::product::VehicleFields;
    use serde_json::json;

    fn vehicle(vin: &str, fuel: &str, price: i64) -> Product {
        Product {
            id: vin.into(),
            name: vin.into(),
            vehicle: Some(VehicleFields {
                fuel_type: Some(fuel.into()),
                price: Some(price),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_constrained_dimension_never_selected() {
        let candidates: Vec<Product> = (0..10)
            .map(|i| vehicle(&format!("v{i}"), if i % 2 == 0 { "Gas" } else { "Hybrid" }, 10_000 + i * 3000))
            .collect();
        let mut filters = FilterMap::new();
        filters.insert("fuel_type".into(), json!("Hybrid"));

        let dim = select_question_dimension(&candidates, &filters, &HashSet::new(), 0.3);
        assert_ne!(dim.as_deref(), Some("fuel_type"));
        assert!(dim.is_some());
    }

    #[test]
    fn test_model_filter_covers_make_dimension() {
        let mut filters = FilterMap::new();
        filters.insert("model".into(), json!("Civic"));
        assert!(specified_dimensions(&filters).contains("make"));
    }

    #[test]
    fn test_threshold_suppresses_flat_distributions() {
        // Identical inventory: zero entropy everywhere => no question
        let candidates: Vec<Product> = (0..10).map(|i| vehicle(&format!("v{i}"), "Gas", 20_000)).collect();
        let dim = select_question_dimension(&candidates, &FilterMap::new(), &HashSet::new(), 0.3);
        assert!(dim.is_none());
    }

    #[test]
    fn test_asked_dimensions_excluded() {
        let candidates: Vec<Product> = (0..10)
            .map(|i| vehicle(&format!("v{i}"), if i % 2 == 0 { "Gas" } else { "Hybrid" }, 20_000))
            .collect();
        let asked: HashSet<String> = ["fuel_type".to_string()].into();
        let dim = select_question_dimension(&candidates, &FilterMap::new(), &asked, 0.3);
        assert_ne!(dim.as_deref(), Some("fuel_type"));
    }
}
