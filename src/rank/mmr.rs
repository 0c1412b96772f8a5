// src/rank/mmr.rs
// Maximal Marginal Relevance selection over a rule-based structural
// similarity. MMR = λ·relevance − (1−λ)·max-similarity-to-selected.

use tracing::info;

use crate::data::product::Product;

/// Structural similarity between two products (0.0 diverse .. 1.0 near-identical).
/// Same make+model dominates; body style gives a weaker signal.
pub fn structural_similarity(a: &Product, b: &Product) -> f64 {
    let lower = |s: &Option<String>| s.as_deref().unwrap_or("").to_lowercase();

    let (va, vb) = match (&a.vehicle, &b.vehicle) {
        (Some(va), Some(vb)) => (va, vb),
        _ => {
            // Catalog products: brand + subcategory approximate make + body style
            let same_brand = lower(&a.brand) == lower(&b.brand) && a.brand.is_some();
            let same_sub = lower(&a.subcategory) == lower(&b.subcategory) && a.subcategory.is_some();
            return match (same_brand, same_sub) {
                (true, true) => 0.7,
                (true, false) => 0.6,
                (false, true) => 0.4,
                (false, false) => 0.0,
            };
        }
    };

    let make_match = lower(&va.make) == lower(&vb.make) && va.make.is_some();
    let model_match = lower(&va.model) == lower(&vb.model) && va.model.is_some();
    let body_match = lower(&va.body_style) == lower(&vb.body_style) && va.body_style.is_some();

    if make_match && model_match {
        0.9
    } else if make_match {
        if body_match {
            0.7
        } else {
            0.6
        }
    } else if body_match {
        0.4
    } else {
        0.0
    }
}

/// Select a diverse top-k from (relevance, product) pairs. The top-scored
/// item seeds the selection; subsequent picks maximise the MMR trade-off.
pub fn diversify_with_mmr(
    scored: Vec<(f64, Product)>,
    top_k: usize,
    lambda: f64,
) -> Vec<Product> {
    if scored.len() <= top_k {
        return scored.into_iter().map(|(_, p)| p).collect();
    }

    let mut remaining = scored;
    let mut selected: Vec<(f64, Product)> = vec![remaining.remove(0)];

    while selected.len() < top_k && !remaining.is_empty() {
        let mut best = (f64::NEG_INFINITY, 0usize);
        for (idx, (relevance, candidate)) in remaining.iter().enumerate() {
            let max_similarity = selected
                .iter()
                .map(|(_, s)| structural_similarity(candidate, s))
                .fold(0.0f64, f64::max);
            let mmr = lambda * relevance - (1.0 - lambda) * max_similarity;
            if mmr > best.0 {
                best = (mmr, idx);
            }
        }
        selected.push(remaining.remove(best.1));
    }

    info!("MMR selected {} items (lambda={})", selected.len(), lambda);
    selected.into_iter().map(|(_, p)| p).collect()
}

/// Clustered MMR: fill mini-clusters of `cluster_size` similar items so the
/// output interleaves comparable options instead of maximising spread.
pub fn diversify_with_clustered_mmr(
    scored: Vec<(f64, Product)>,
    top_k: usize,
    cluster_size: usize,
    lambda: f64,
) -> Vec<Product> {
    if scored.len() <= top_k {
        return scored.into_iter().map(|(_, p)| p).collect();
    }

    let mut remaining = scored;
    let mut selected: Vec<(f64, Product)> = Vec::new();
    let cluster_size = cluster_size.max(1);
    let num_clusters = top_k.div_ceil(cluster_size);

    for _ in 0..num_clusters {
        if remaining.is_empty() || selected.len() >= top_k {
            break;
        }
        let needed = cluster_size.min(top_k - selected.len());
        let mut cluster: Vec<(f64, Product)> = vec![remaining.remove(0)];

        while cluster.len() < needed && !remaining.is_empty() {
            let mut best = (f64::NEG_INFINITY, 0usize);
            for (idx, (relevance, candidate)) in remaining.iter().enumerate() {
                let max_similarity = cluster
                    .iter()
                    .map(|(_, s)| structural_similarity(candidate, s))
                    .fold(0.0f64, f64::max);
                let mmr = lambda * relevance - (1.0 - lambda) * max_similarity;
                if mmr > best.0 {
                    best = (mmr, idx);
                }
            }
            cluster.push(remaining.remove(best.1));
        }
        selected.extend(cluster);
    }

    info!(
        "Clustered MMR: {} items in clusters of {}",
        selected.len(),
        cluster_size
    );
    selected.into_iter().map(|(_, p)| p).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::product::VehicleFields;

    fn vehicle(vin: &str, make: &str, model: &str, body: &str) -> Product {
        Product {
            id: vin.into(),
            name: vin.into(),
            vehicle: Some(VehicleFields {
                make: Some(make.into()),
                model: Some(model.into()),
                body_style: Some(body.into()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_similarity_ladder() {
        let a = vehicle("1", "Honda", "CR-V", "SUV");
        assert_eq!(structural_similarity(&a, &vehicle("2", "Honda", "CR-V", "SUV")), 0.9);
        assert_eq!(structural_similarity(&a, &vehicle("3", "Honda", "Pilot", "SUV")), 0.7);
        assert_eq!(structural_similarity(&a, &vehicle("4", "Honda", "Civic", "Sedan")), 0.6);
        assert_eq!(structural_similarity(&a, &vehicle("5", "Toyota", "RAV4", "SUV")), 0.4);
        assert_eq!(structural_similarity(&a, &vehicle("6", "Ford", "F-150", "Truck")), 0.0);
    }

    #[test]
    fn test_mmr_penalises_duplicates() {
        // Three near-identical CR-Vs with top scores and one distinct truck:
        // with a diversity-leaning lambda, the truck must appear in the top 2
        let scored = vec![
            (0.95, vehicle("a", "Honda", "CR-V", "SUV")),
            (0.94, vehicle("b", "Honda", "CR-V", "SUV")),
            (0.93, vehicle("c", "Honda", "CR-V", "SUV")),
            (0.60, vehicle("d", "Ford", "F-150", "Truck")),
        ];
        let picked = diversify_with_mmr(scored, 2, 0.5);
        assert_eq!(picked[0].id, "a");
        assert_eq!(picked[1].id, "d");
    }

    #[test]
    fn test_small_input_passes_through() {
        let scored = vec![
            (0.9, vehicle("a", "Honda", "CR-V", "SUV")),
            (0.8, vehicle("b", "Ford", "F-150", "Truck")),
        ];
        let picked = diversify_with_mmr(scored, 5, 0.85);
        assert_eq!(picked.len(), 2);
    }

    #[test]
    fn test_clustered_mmr_output_size() {
        let scored: Vec<(f64, Product)> = (0..12)
            .map(|i| {
                (
                    1.0 - i as f64 * 0.05,
                    vehicle(&format!("v{i}"), if i % 2 == 0 { "Honda" } else { "Toyota" }, "X", "SUV"),
                )
            })
            .collect();
        let picked = diversify_with_clustered_mmr(scored, 9, 3, 0.85);
        assert_eq!(picked.len(), 9);
        // No duplicates
        let mut ids: Vec<&str> = picked.iter().map(|p| p.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 9);
    }
}
