// src/search/relax.rs
// Progressive filter relaxation for vehicle search.
//
// Filters fall into three tiers: inferred (relaxed first), regular, and
// must-have (never relaxed). Within a tier the fixed priority order below
// decides which filter is least essential. The ladder stops at the first
// non-empty result, after at most two relaxation rounds (three DB hits).

use serde_json::Value;
use tracing::{debug, info};

use crate::data::product::{FilterMap, Product};
use crate::data::vehicle_store::VehicleStore;
use crate::error::Result;
use crate::rank::RelaxationState;

/// Least essential first. The terminals (body_style, fuel_type) define what
/// the user is fundamentally shopping for and are inviolable.
pub const FILTER_RELAXATION_ORDER: &[&str] = &[
    "search_radius",
    "interior_color",
    "exterior_color",
    "is_cpo",
    "engine",
    "trim",
    "doors",
    "year",
    "mileage",
    "price",
    "model",
    "make",
    "drivetrain",
    "seating_capacity",
    "transmission",
    "is_used",
    "body_style",
    "fuel_type",
];

const MAX_RELAXATION_ROUNDS: usize = 2;

/// Never dropped, whatever tier they land in.
const INVIOLABLE_FILTERS: &[&str] = &["body_style", "fuel_type"];

/// Metadata keys that ride along in the filter map but are not filters.
const METADATA_KEYS: &[&str] = &["must_have_filters", "inferred_filters", "avoid_vins", "use_case"];

fn name_list(filters: &FilterMap, key: &str) -> Vec<String> {
    filters
        .get(key)
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|x| x.as_str().map(String::from)).collect())
        .unwrap_or_default()
}

fn base_priority(name: &str) -> i64 {
    FILTER_RELAXATION_ORDER
        .iter()
        .position(|f| *f == name)
        .map(|p| p as i64)
        .unwrap_or(-1)
}

/// Run the vehicle query, relaxing filters until something matches.
pub async fn progressive_filter_relaxation(
    store: &VehicleStore,
    explicit_filters: &FilterMap,
    limit: i64,
) -> Result<(Vec<Product>, RelaxationState)> {
    let must_have = name_list(explicit_filters, "must_have_filters");
    let inferred = name_list(explicit_filters, "inferred_filters");
    let avoid_vins = explicit_filters.get("avoid_vins").cloned();

    let mut active: FilterMap = explicit_filters
        .iter()
        .filter(|(k, v)| {
            !METADATA_KEYS.contains(&k.as_str()) && !k.starts_with('_') && !v.is_null()
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    // An unconstrained query would return the whole table cheapest-first;
    // a recent-years default keeps the pool sensible.
    if active.is_empty() {
        active.insert("year".into(), Value::String("2018-2025".into()));
    }

    let tier_size = FILTER_RELAXATION_ORDER.len() as i64;
    let mut order: Vec<String> = active.keys().cloned().collect();
    order.sort_by_key(|name| {
        let tier = if inferred.contains(name) {
            0
        } else if must_have.contains(name) {
            2
        } else {
            1
        };
        tier * tier_size + base_priority(name)
    });

    info!("Relaxation order: {:?}", order);

    let mut state = RelaxationState {
        all_criteria_met: true,
        relaxed_inferred: Vec::new(),
        relaxed_regular: Vec::new(),
        unmet_must_haves: Vec::new(),
        ..Default::default()
    };

    let mut candidates = Vec::new();
    for round in 0..=MAX_RELAXATION_ROUNDS {
        let mut query_filters = active.clone();
        if let Some(avoid) = &avoid_vins {
            query_filters.insert("avoid_vins".into(), avoid.clone());
        }

        candidates = store.search_listings(&query_filters, limit).await?;
        debug!(
            "Relaxation round {}: {} filters -> {} results",
            round,
            active.len(),
            candidates.len()
        );
        if !candidates.is_empty() {
            break;
        }
        if round == MAX_RELAXATION_ROUNDS {
            break;
        }

        // Drop the least essential remaining filter below the must-have tier
        let next = order
            .iter()
            .find(|name| {
                active.contains_key(*name)
                    && !must_have.contains(name)
                    && !INVIOLABLE_FILTERS.contains(&name.as_str())
            })
            .cloned();
        let Some(name) = next else {
            info!("Only must-have filters remain; stopping relaxation");
            break;
        };

        let original = active.remove(&name).unwrap_or(Value::Null);
        info!("Relaxing filter '{}' (was {})", name, original);
        state.original_values.insert(name.clone(), original);
        if inferred.contains(&name) {
            state.relaxed_inferred.push(name.clone());
        } else {
            state.relaxed_regular.push(name.clone());
        }
        state.relaxed_filters.push(name);
        state.all_criteria_met = false;
    }

    state.met_filters = active.keys().cloned().collect();
    if candidates.is_empty() {
        // Surface which must-haves went unmet for downstream messaging
        state.unmet_must_haves = must_have
            .iter()
            .filter(|name| active.contains_key(*name))
            .cloned()
            .collect();
    }

    info!(
        "Relaxation done: {} candidates, all_criteria_met={}, relaxed={:?}",
        candidates.len(),
        state.all_criteria_met,
        state.relaxed_filters
    );
    Ok((candidates, state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::product::VehicleFields;
    use serde_json::json;
    use sqlx::sqlite::SqlitePool;

    fn filters(pairs: &[(&str, Value)]) -> FilterMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    async fn store_with_suvs() -> VehicleStore {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        let store = VehicleStore::new(pool);
        store.ensure_schema().await.unwrap();
        for (vin, make, body, price, color) in [
            ("V1", "Honda", "SUV", 28000, "Blue"),
            ("V2", "Toyota", "SUV", 31000, "White"),
        ] {
            store
                .insert(&Product {
                    id: vin.into(),
                    name: vin.into(),
                    vehicle: Some(VehicleFields {
                        make: Some(make.into()),
                        model: Some("X".into()),
                        year: Some(2022),
                        body_style: Some(body.into()),
                        exterior_color: Some(color.into()),
                        price: Some(price),
                        mileage: Some(10000),
                        ..Default::default()
                    }),
                    ..Default::default()
                })
                .await
                .unwrap();
        }
        store
    }

    #[test]
    fn test_relaxation_priority_ordering() {
        assert!(base_priority("interior_color") < base_priority("exterior_color"));
        assert!(base_priority("exterior_color") < base_priority("year"));
        assert!(base_priority("price") < base_priority("make"));
        assert!(base_priority("make") < base_priority("body_style"));
        assert!(base_priority("body_style") < base_priority("fuel_type"));
    }

    #[tokio::test]
    async fn test_no_relaxation_when_strict_matches() {
        let store = store_with_suvs().await;
        let (candidates, state) = progressive_filter_relaxation(
            &store,
            &filters(&[("body_style", json!("SUV"))]),
            10,
        )
        .await
        .unwrap();
        assert_eq!(candidates.len(), 2);
        assert!(state.all_criteria_met);
        assert!(state.relaxed_filters.is_empty());
    }

    #[tokio::test]
    async fn test_cosmetic_filter_relaxed_first() {
        let store = store_with_suvs().await;
        // Pink SUVs don't exist; colour must go before body_style
        let (candidates, state) = progressive_filter_relaxation(
            &store,
            &filters(&[
                ("body_style", json!("SUV")),
                ("exterior_color", json!("Pink")),
            ]),
            10,
        )
        .await
        .unwrap();
        assert!(!candidates.is_empty());
        assert_eq!(state.relaxed_filters, vec!["exterior_color"]);
        assert_eq!(state.original_values.get("exterior_color"), Some(&json!("Pink")));
        assert!(!state.all_criteria_met);
        assert!(state.met_filters.contains(&"body_style".to_string()));
    }

    #[tokio::test]
    async fn test_must_haves_never_relaxed() {
        let store = store_with_suvs().await;
        // Impossible must-have: zero results, but the filter survives
        let (candidates, state) = progressive_filter_relaxation(
            &store,
            &filters(&[
                ("make", json!("Rivian")),
                ("must_have_filters", json!(["make"])),
            ]),
            10,
        )
        .await
        .unwrap();
        assert!(candidates.is_empty());
        assert!(state.relaxed_filters.is_empty());
        assert_eq!(state.unmet_must_haves, vec!["make"]);
    }

    #[tokio::test]
    async fn test_body_style_is_inviolable() {
        let store = store_with_suvs().await;
        // No coupes exist, yet the fundamental vehicle type never relaxes
        let (candidates, state) = progressive_filter_relaxation(
            &store,
            &filters(&[("body_style", json!("Coupe"))]),
            10,
        )
        .await
        .unwrap();
        assert!(candidates.is_empty());
        assert!(state.relaxed_filters.is_empty());
        assert!(state.met_filters.contains(&"body_style".to_string()));
    }

    #[tokio::test]
    async fn test_round_cap() {
        let store = store_with_suvs().await;
        // Three impossible filters: only two may be dropped (three DB hits)
        let (_, state) = progressive_filter_relaxation(
            &store,
            &filters(&[
                ("interior_color", json!("Plaid")),
                ("exterior_color", json!("Pink")),
                ("make", json!("Rivian")),
            ]),
            10,
        )
        .await
        .unwrap();
        assert!(state.relaxed_filters.len() <= 2);
        assert_eq!(state.relaxed_filters, vec!["interior_color", "exterior_color"]);
    }
}
