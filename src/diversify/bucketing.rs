// src/diversify/bucketing.rs
// Data-driven bucketing of ranked products into labelled rows.
//
// Numerical axes use equal-count quantile boundaries; categorical axes take
// the most frequent values. Ranking order is preserved inside each bucket.

use std::collections::HashMap;

use tracing::info;

use crate::data::product::Product;

use super::entropy::is_numerical;

/// A row×col grid of ranked products plus parallel row labels.
#[derive(Debug, Clone)]
pub struct BucketedGrid {
    pub buckets: Vec<Vec<Product>>,
    pub labels: Vec<String>,
    pub dimension: String,
}

impl BucketedGrid {
    pub fn total(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    fn empty(dimension: &str, n_buckets: usize) -> Self {
        Self {
            buckets: vec![Vec::new(); n_buckets],
            labels: vec!["No data".to_string(); n_buckets],
            dimension: dimension.to_string(),
        }
    }
}

/// Bucket ranked products along a dimension (numerical vs categorical is
/// auto-detected). Each bucket holds at most `n_per_bucket` items, taken in
/// ranking order.
pub fn bucket_products(
    products: &[Product],
    dimension: &str,
    n_buckets: usize,
    n_per_bucket: usize,
) -> BucketedGrid {
    if products.is_empty() || n_buckets == 0 {
        return BucketedGrid::empty(dimension, n_buckets);
    }

    let grid = if is_numerical(dimension) {
        bucket_numerical(products, dimension, n_buckets, n_per_bucket)
    } else {
        bucket_categorical(products, dimension, n_buckets, n_per_bucket)
    };

    info!(
        "Bucketed {} products into {} rows by {}",
        grid.total(),
        grid.buckets.len(),
        dimension
    );
    grid
}

fn bucket_numerical(
    products: &[Product],
    dimension: &str,
    n_buckets: usize,
    n_per_bucket: usize,
) -> BucketedGrid {
    let mut valued: Vec<f64> = products
        .iter()
        .filter_map(|p| p.numeric_value(dimension))
        .collect();
    if valued.is_empty() {
        let mut grid = BucketedGrid::empty(dimension, 1);
        grid.buckets[0] = products.iter().take(n_per_bucket).cloned().collect();
        grid.labels[0] = format!("All ({dimension} unknown)");
        return grid;
    }
    valued.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    // Equal-count boundaries: the last value of each chunk. Assignment is
    // "value <= boundary", so ties always land in the earlier bucket.
    let boundaries: Vec<f64> = (1..=n_buckets)
        .map(|i| valued[(valued.len() * i / n_buckets).saturating_sub(1).min(valued.len() - 1)])
        .collect();

    let mut buckets: Vec<Vec<Product>> = vec![Vec::new(); n_buckets];
    for product in products {
        let Some(value) = product.numeric_value(dimension) else {
            continue;
        };
        let idx = boundaries
            .iter()
            .position(|b| value <= *b)
            .unwrap_or(n_buckets - 1);
        if buckets[idx].len() < n_per_bucket {
            buckets[idx].push(product.clone());
        }
    }

    let labels = buckets
        .iter()
        .map(|bucket| {
            let values: Vec<f64> = bucket
                .iter()
                .filter_map(|p| p.numeric_value(dimension))
                .collect();
            match (
                values.iter().cloned().reduce(f64::min),
                values.iter().cloned().reduce(f64::max),
            ) {
                (Some(low), Some(high)) => range_label(dimension, low, high),
                _ => "No data".to_string(),
            }
        })
        .collect();

    BucketedGrid {
        buckets,
        labels,
        dimension: dimension.to_string(),
    }
}

fn bucket_categorical(
    products: &[Product],
    dimension: &str,
    n_buckets: usize,
    n_per_bucket: usize,
) -> BucketedGrid {
    let mut groups: HashMap<String, Vec<Product>> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for product in products {
        let Some(value) = product.string_value(dimension) else {
            continue;
        };
        if !groups.contains_key(&value) {
            order.push(value.clone());
        }
        groups.entry(value).or_default().push(product.clone());
    }

    if groups.is_empty() {
        let mut grid = BucketedGrid::empty(dimension, 1);
        grid.buckets[0] = products.iter().take(n_per_bucket).cloned().collect();
        grid.labels[0] = format!("All ({dimension} unknown)");
        return grid;
    }

    // Most frequent value first; insertion order (= ranking order) breaks ties
    order.sort_by_key(|value| std::cmp::Reverse(groups[value].len()));

    let mut buckets = Vec::with_capacity(n_buckets);
    let mut labels = Vec::with_capacity(n_buckets);
    for value in order.into_iter().take(n_buckets) {
        let mut group = groups.remove(&value).unwrap_or_default();
        group.truncate(n_per_bucket);
        buckets.push(group);
        labels.push(value);
    }
    while buckets.len() < n_buckets {
        buckets.push(Vec::new());
        labels.push("Other".to_string());
    }

    BucketedGrid {
        buckets,
        labels,
        dimension: dimension.to_string(),
    }
}

/// Human-readable label for a numerical bucket from its content range.
fn range_label(dimension: &str, low: f64, high: f64) -> String {
    match dimension {
        "price" => {
            if high < 1000.0 {
                if (low - high).abs() < f64::EPSILON {
                    format!("${low:.0}")
                } else {
                    format!("${low:.0} – ${high:.0}")
                }
            } else if high >= 1_000_000.0 {
                format!("${:.0}K+", low / 1000.0)
            } else {
                format!("${:.0}K – ${:.0}K", low / 1000.0, high / 1000.0)
            }
        }
        "mileage" => {
            if high >= 500_000.0 {
                format!("{:.0}K+ miles", low / 1000.0)
            } else {
                format!("{:.0}K – {:.0}K miles", low / 1000.0, high / 1000.0)
            }
        }
        "year" => {
            if (low - high).abs() < f64::EPSILON {
                format!("{}", low as i64)
            } else {
                format!("{} – {}", low as i64, high as i64)
            }
        }
        _ => format!("{low:.1} – {high:.1}"),
    }
}
