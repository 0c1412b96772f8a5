// src/diversify/entropy.rs
// Shannon-entropy dimension analysis for diversification and questioning.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::data::product::{FilterMap, Product};

/// Dimensions considered for diversification, in discovery order.
pub const DIVERSIFIABLE_DIMENSIONS: &[&str] = &[
    "price",
    "make",
    "body_style",
    "fuel_type",
    "drivetrain",
    "mileage",
    "year",
    "transmission",
    "brand",
    "subcategory",
    "genre",
    "format",
];

pub const NUMERICAL_DIMENSIONS: &[&str] = &["price", "mileage", "year", "pages"];

pub fn is_numerical(dimension: &str) -> bool {
    NUMERICAL_DIMENSIONS.contains(&dimension)
}

/// H = -Σ p_i · log2(p_i) over the value distribution. Higher = more spread.
pub fn compute_shannon_entropy(values: &[String]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for v in values {
        *counts.entry(v.as_str()).or_insert(0) += 1;
    }
    let total = values.len() as f64;
    counts
        .values()
        .map(|&c| {
            let p = c as f64 / total;
            -p * p.log2()
        })
        .sum()
}

/// Bucket numerical values into `n_buckets` quantile labels so they can feed
/// the categorical entropy computation.
fn quantile_labels(values: &[f64], n_buckets: usize) -> Vec<String> {
    if values.len() < 2 {
        return values.iter().map(|_| "all".to_string()).collect();
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let boundaries: Vec<f64> = (1..n_buckets)
        .map(|i| {
            let idx = (sorted.len() * i / n_buckets).min(sorted.len() - 1);
            sorted[idx]
        })
        .collect();

    values
        .iter()
        .map(|v| {
            let bucket = boundaries.iter().filter(|b| v >= b).count();
            format!("bucket_{bucket}")
        })
        .collect()
}

/// Entropy of one dimension over a candidate set. Numerical dimensions are
/// quantile-bucketed first (default 3 buckets).
pub fn compute_dimension_entropy(products: &[Product], dimension: &str, n_buckets: usize) -> f64 {
    if products.is_empty() {
        return 0.0;
    }
    let values: Vec<String> = if is_numerical(dimension) {
        let numeric: Vec<f64> = products
            .iter()
            .filter_map(|p| p.numeric_value(dimension))
            .collect();
        quantile_labels(&numeric, n_buckets)
    } else {
        products
            .iter()
            .filter_map(|p| p.string_value(dimension))
            .collect()
    };
    compute_shannon_entropy(&values)
}

/// Dimensions with at least 50% non-null coverage on the candidate set.
pub fn discover_dimensions(products: &[Product]) -> Vec<&'static str> {
    if products.is_empty() {
        return Vec::new();
    }
    let threshold = products.len().div_ceil(2);
    DIVERSIFIABLE_DIMENSIONS
        .iter()
        .filter(|dim| {
            let non_null = products
                .iter()
                .filter(|p| {
                    if is_numerical(dim) {
                        p.numeric_value(dim).is_some()
                    } else {
                        p.string_value(dim).is_some()
                    }
                })
                .count();
            non_null >= threshold
        })
        .copied()
        .collect()
}

/// Pick the bucketing axis: the unconstrained dimension with maximum entropy.
/// When every discovered dimension is already constrained, fall back to
/// price (always present, always safe to spread).
pub fn select_diversification_dimension(
    products: &[Product],
    explicit_filters: &FilterMap,
    exclude: &[String],
) -> String {
    if products.is_empty() {
        return "price".into();
    }

    let available = discover_dimensions(products);
    debug!("Available dimensions: {:?}", available);

    let candidates: Vec<&str> = available
        .iter()
        .filter(|d| {
            !explicit_filters.contains_key(**d) && !exclude.iter().any(|e| e == *d)
        })
        .copied()
        .collect();

    if candidates.is_empty() {
        info!("All dimensions constrained; diversifying by price");
        return "price".into();
    }

    let mut best = (candidates[0], f64::MIN);
    for dim in &candidates {
        let h = compute_dimension_entropy(products, dim, 3);
        debug!("Entropy[{}] = {:.3}", dim, h);
        if h > best.1 {
            best = (dim, h);
        }
    }

    info!("Diversification dimension: {} (entropy {:.3})", best.0, best.1);
    best.0.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::product::VehicleFields;
    use serde_json::json;

    fn vehicle(vin: &str, make: &str, body: &str, price: i64) -> Product {
        Product {
            id: vin.into(),
            name: vin.into(),
            vehicle: Some(VehicleFields {
                make: Some(make.into()),
                body_style: Some(body.into()),
                price: Some(price),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_shannon_entropy_values() {
        // Uniform over 2 values = 1 bit
        let values: Vec<String> = vec!["a".into(), "b".into(), "a".into(), "b".into()];
        assert!((compute_shannon_entropy(&values) - 1.0).abs() < 1e-9);
        // Single value = 0 bits
        let same: Vec<String> = vec!["a".into(); 5];
        assert_eq!(compute_shannon_entropy(&same), 0.0);
        assert_eq!(compute_shannon_entropy(&[]), 0.0);
    }

    #[test]
    fn test_selected_dimension_never_constrained() {
        let products = vec![
            vehicle("1", "Honda", "SUV", 20000),
            vehicle("2", "Toyota", "Sedan", 25000),
            vehicle("3", "Ford", "Truck", 30000),
            vehicle("4", "Honda", "SUV", 35000),
        ];
        let mut filters = FilterMap::new();
        filters.insert("make".into(), json!("Honda"));

        let dim = select_diversification_dimension(&products, &filters, &[]);
        assert_ne!(dim, "make");
    }

    #[test]
    fn test_all_constrained_falls_back_to_price() {
        let products = vec![
            vehicle("1", "Honda", "SUV", 20000),
            vehicle("2", "Toyota", "Sedan", 25000),
        ];
        let mut filters = FilterMap::new();
        for dim in DIVERSIFIABLE_DIMENSIONS {
            filters.insert(dim.to_string(), json!("x"));
        }
        assert_eq!(select_diversification_dimension(&products, &filters, &[]), "price");
    }

    #[test]
    fn test_discover_requires_half_coverage() {
        let mut products = vec![
            vehicle("1", "Honda", "SUV", 20000),
            vehicle("2", "Toyota", "Sedan", 25000),
        ];
        // Two products without a body style: coverage drops to 50%
        products.push(Product {
            id: "3".into(),
            name: "3".into(),
            vehicle: Some(VehicleFields { price: Some(1000), ..Default::default() }),
            ..Default::default()
        });
        products.push(Product {
            id: "4".into(),
            name: "4".into(),
            vehicle: Some(VehicleFields { price: Some(2000), ..Default::default() }),
            ..Default::default()
        });
        let dims = discover_dimensions(&products);
        assert!(dims.contains(&"price"));
        assert!(dims.contains(&"body_style")); // exactly 50% still counts
        assert!(!dims.contains(&"fuel_type")); // 0% coverage
    }
}
