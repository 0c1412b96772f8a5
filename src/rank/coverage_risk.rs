// src/rank/coverage_risk.rs
// Coverage-risk ranking: greedy selection maximising
//   Coverage(S) − λ·Risk(S) + μ·SoftBonus(S)
// over per-vehicle review-phrase embeddings.
//
// Per-phrase similarities are thresholded with φ(t) = max(0, t − τ) before
// aggregation. Sum mode uses noisy-or coverage (submodular); max mode keeps
// running per-preference maxima.

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::data::product::{FilterMap, ImplicitPreferences, Product};
use crate::embedding::phrase_store::PhraseStore;
use crate::error::Result;

/// Aggregation mode for alignment scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationMode {
    /// Max over phrases, running max over the selected set.
    Max,
    /// Sum over thresholded phrases, noisy-or coverage over the set.
    Sum,
}

impl AggregationMode {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "max" => Self::Max,
            _ => Self::Sum,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CoverageRiskParams {
    pub k: usize,
    pub lambda_risk: f32,
    pub mode: AggregationMode,
    pub tau: f32,
    pub alpha: f32,
    /// Max-mode greedy threshold on thresholded scores.
    pub min_similarity: f32,
    /// Soft-bonus weight; None auto-calibrates via scale matching.
    pub mu: Option<f32>,
    pub rho: f32,
}

impl Default for CoverageRiskParams {
    fn default() -> Self {
        Self {
            k: 100,
            lambda_risk: 0.5,
            mode: AggregationMode::Sum,
            tau: 0.5,
            alpha: 1.0,
            min_similarity: 0.5,
            mu: None,
            rho: 1.0,
        }
    }
}

/// Outcome of progressive filter relaxation, consumed here as the source of
/// soft constraints and surfaced to the client in messaging.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RelaxationState {
    pub all_criteria_met: bool,
    pub met_filters: Vec<String>,
    pub relaxed_filters: Vec<String>,
    pub original_values: FilterMap,
    pub relaxed_inferred: Vec<String>,
    pub relaxed_regular: Vec<String>,
    pub unmet_must_haves: Vec<String>,
}

#[derive(Debug, Clone)]
enum ConstraintKind {
    Range(f64, f64),
    Max(f64),
    Min(f64),
    Categorical(Vec<String>),
}

/// A relaxed hard filter, now contributing a weighted bonus instead of
/// excluding candidates.
#[derive(Debug, Clone)]
struct SoftConstraint {
    dimension: String,
    kind: ConstraintKind,
    weight: f32,
}

impl SoftConstraint {
    fn satisfied_by(&self, product: &Product) -> bool {
        match &self.kind {
            ConstraintKind::Range(lo, hi) => product
                .numeric_value(&self.dimension)
                .is_some_and(|v| v >= *lo && v <= *hi),
            ConstraintKind::Max(hi) => product
                .numeric_value(&self.dimension)
                .is_some_and(|v| v <= *hi),
            ConstraintKind::Min(lo) => product
                .numeric_value(&self.dimension)
                .is_some_and(|v| v >= *lo),
            ConstraintKind::Categorical(allowed) => product
                .string_value(&self.dimension)
                .is_some_and(|v| allowed.iter().any(|a| a.eq_ignore_ascii_case(&v))),
        }
    }
}

fn phi(t: f32, tau: f32) -> f32 {
    (t - tau).max(0.0)
}

/// g(x) = 1 − exp(−αx): coverage mapping with diminishing returns.
fn g(x: f32, alpha: f32) -> f32 {
    1.0 - (-alpha * x.max(0.0)).exp()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Pos_j(v) / Neg_j(v) for one vehicle against the preference embeddings.
fn alignment_scores(
    phrase_rows: &[Vec<f32>],
    preference_embeddings: &[Vec<f32>],
    mode: AggregationMode,
    tau: f32,
) -> Vec<f32> {
    preference_embeddings
        .iter()
        .map(|pref| {
            let thresholded = phrase_rows.iter().map(|phrase| phi(dot(pref, phrase), tau));
            match mode {
                AggregationMode::Max => thresholded.fold(0.0f32, f32::max),
                AggregationMode::Sum => thresholded.sum(),
            }
        })
        .collect()
}

fn tier_weight(name: &str, state: &RelaxationState) -> f32 {
    if state.unmet_must_haves.iter().any(|f| f == name) {
        2.0
    } else if state.relaxed_inferred.iter().any(|f| f == name) {
        0.5
    } else {
        1.0
    }
}

/// Turn relaxed hard filters into weighted soft constraints.
fn build_soft_constraints(state: &RelaxationState) -> Vec<SoftConstraint> {
    let mut constraints = Vec::new();
    for name in &state.relaxed_filters {
        let Some(original) = state.original_values.get(name) else {
            continue;
        };
        let weight = tier_weight(name, state);

        let kind = match name.as_str() {
            "price" | "mileage" | "year" => match original {
                Value::String(s) => parse_range_constraint(s),
                Value::Number(n) => n.as_f64().map(|v| {
                    if name == "year" {
                        ConstraintKind::Range(v, v)
                    } else {
                        ConstraintKind::Max(v)
                    }
                }),
                _ => None,
            },
            "make" | "model" | "body_style" | "fuel_type" | "drivetrain" | "transmission"
            | "brand" | "exterior_color" | "interior_color" => match original {
                Value::String(s) => Some(ConstraintKind::Categorical(
                    s.split(',').map(|v| v.trim().to_string()).collect(),
                )),
                Value::Array(values) => Some(ConstraintKind::Categorical(
                    values
                        .iter()
                        .filter_map(|v| v.as_str().map(String::from))
                        .collect(),
                )),
                _ => None,
            },
            _ => None,
        };

        if let Some(kind) = kind {
            constraints.push(SoftConstraint {
                dimension: name.clone(),
                kind,
                weight,
            });
        }
    }
    debug!(
        "Built {} soft constraints from {} relaxed filters",
        constraints.len(),
        state.relaxed_filters.len()
    );
    constraints
}

fn parse_range_constraint(raw: &str) -> Option<ConstraintKind> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '-' || *c == '.')
        .collect();
    if let Some((lo, hi)) = cleaned.split_once('-') {
        match (lo.parse::<f64>(), hi.parse::<f64>()) {
            (Ok(lo), Ok(hi)) => Some(ConstraintKind::Range(lo, hi)),
            (Err(_), Ok(hi)) => Some(ConstraintKind::Max(hi)),
            (Ok(lo), Err(_)) => Some(ConstraintKind::Min(lo)),
            _ => None,
        }
    } else {
        cleaned.parse::<f64>().ok().map(ConstraintKind::Max)
    }
}

/// μ = ρ · median(singleton coverage gains) / (median(positive bonuses) + ε)
fn calibrate_mu(pos: &[Vec<f32>], soft_bonus: &[f32], mode: AggregationMode, alpha: f32, rho: f32) -> f32 {
    let positive: Vec<f32> = soft_bonus.iter().copied().filter(|b| *b > 0.0).collect();
    if positive.is_empty() || pos.first().map(|r| r.is_empty()).unwrap_or(true) {
        return 0.0;
    }

    let coverage_marginals: Vec<f32> = pos
        .iter()
        .map(|row| match mode {
            AggregationMode::Max => row.iter().sum(),
            AggregationMode::Sum => row.iter().map(|x| g(*x, alpha)).sum(),
        })
        .collect();

    let mu = rho * median(&coverage_marginals) / (median(&positive) + 1e-6);
    info!("Calibrated mu = {:.4}", mu);
    mu
}

fn median(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Greedy selection. O(k·V·M): each step scores every unselected candidate
/// against compact per-preference running state.
fn greedy_select(
    pos: &[Vec<f32>],
    neg: &[Vec<f32>],
    soft_bonus: &[f32],
    params: &CoverageRiskParams,
    mu: f32,
) -> Vec<usize> {
    let v = pos.len();
    let m = pos.first().map(Vec::len).unwrap_or(0);
    let n = neg.first().map(Vec::len).unwrap_or(0);
    let k = params.k.min(v);

    let mut selected = Vec::with_capacity(k);
    let mut selected_mask = vec![false; v];

    match params.mode {
        AggregationMode::Max => {
            let filter = |x: f32| if x > params.min_similarity { x } else { 0.0 };
            let mut current_max_pos = vec![0.0f32; m];
            let mut current_max_neg = vec![0.0f32; n];
            let current_sum = |maxes: &[f32]| maxes.iter().sum::<f32>();

            for _ in 0..k {
                let mut best = (f32::NEG_INFINITY, usize::MAX);
                let base_cov = current_sum(&current_max_pos);
                let base_risk = current_sum(&current_max_neg);
                for idx in 0..v {
                    if selected_mask[idx] {
                        continue;
                    }
                    let new_cov: f32 = (0..m)
                        .map(|j| current_max_pos[j].max(filter(pos[idx][j])))
                        .sum();
                    let new_risk: f32 = (0..n)
                        .map(|j| current_max_neg[j].max(filter(neg[idx][j])))
                        .sum();
                    let gain = (new_cov - base_cov) - params.lambda_risk * (new_risk - base_risk)
                        + mu * soft_bonus[idx];
                    if gain > best.0 {
                        best = (gain, idx);
                    }
                }
                let (_, idx) = best;
                if idx == usize::MAX {
                    break;
                }
                selected.push(idx);
                selected_mask[idx] = true;
                for j in 0..m {
                    current_max_pos[j] = current_max_pos[j].max(filter(pos[idx][j]));
                }
                for j in 0..n {
                    current_max_neg[j] = current_max_neg[j].max(filter(neg[idx][j]));
                }
            }
        }
        AggregationMode::Sum => {
            // Noisy-or residuals: Q_j = Π (1 − g(Pos_j(v))) over selected
            let g_pos: Vec<Vec<f32>> = pos
                .iter()
                .map(|row| row.iter().map(|x| g(*x, params.alpha)).collect())
                .collect();
            // Risk is modular in sum mode: a constant penalty per vehicle
            let risk_penalty: Vec<f32> = neg
                .iter()
                .map(|row| row.iter().map(|x| x.max(0.0)).sum())
                .collect();
            let mut q = vec![1.0f32; m];

            for _ in 0..k {
                let mut best = (f32::NEG_INFINITY, usize::MAX);
                for idx in 0..v {
                    if selected_mask[idx] {
                        continue;
                    }
                    let coverage_gain: f32 = g_pos[idx].iter().zip(&q).map(|(gp, qj)| gp * qj).sum();
                    let gain = coverage_gain - params.lambda_risk * risk_penalty[idx]
                        + mu * soft_bonus[idx];
                    if gain > best.0 {
                        best = (gain, idx);
                    }
                }
                let (_, idx) = best;
                if idx == usize::MAX {
                    break;
                }
                selected.push(idx);
                selected_mask[idx] = true;
                for (qj, gp) in q.iter_mut().zip(&g_pos[idx]) {
                    *qj *= 1.0 - gp;
                }
            }
        }
    }

    selected
}

/// Rank candidate vehicles by coverage-risk alignment. Candidates whose
/// make/model/year has no phrase record score zero and sink naturally.
pub async fn rank_with_coverage_risk(
    vehicles: Vec<Product>,
    phrase_store: &PhraseStore,
    preferences: &ImplicitPreferences,
    params: &CoverageRiskParams,
    relaxation: Option<&RelaxationState>,
) -> Result<Vec<Product>> {
    if vehicles.is_empty() {
        warn!("No vehicles to rank");
        return Ok(vehicles);
    }
    if preferences.is_empty() {
        warn!("No implicit preferences; returning vehicles in SQL order");
        return Ok(vehicles.into_iter().take(params.k).collect());
    }

    info!(
        "Coverage-risk: ranking {} vehicles ({} liked, {} disliked)",
        vehicles.len(),
        preferences.liked_features.len(),
        preferences.disliked_features.len()
    );

    let liked = phrase_store.encode_batch(&preferences.liked_features).await?;
    let disliked = phrase_store.encode_batch(&preferences.disliked_features).await?;

    let mut pos = Vec::with_capacity(vehicles.len());
    let mut neg = Vec::with_capacity(vehicles.len());
    for vehicle in &vehicles {
        let record = match vehicle.vehicle.as_ref() {
            Some(v) => match (&v.make, &v.model, v.year) {
                (Some(make), Some(model), Some(year)) => {
                    phrase_store.get_phrases(make, model, year)?
                }
                _ => None,
            },
            None => None,
        };
        match record {
            Some(phrases) => {
                pos.push(alignment_scores(&phrases.pros_embeddings, &liked, params.mode, params.tau));
                neg.push(alignment_scores(&phrases.cons_embeddings, &disliked, params.mode, params.tau));
            }
            None => {
                pos.push(vec![0.0; liked.len()]);
                neg.push(vec![0.0; disliked.len()]);
            }
        }
    }

    let soft_bonus: Vec<f32> = match relaxation {
        Some(state) => {
            let constraints = build_soft_constraints(state);
            vehicles
                .iter()
                .map(|v| {
                    constraints
                        .iter()
                        .filter(|c| c.satisfied_by(v))
                        .map(|c| c.weight)
                        .sum()
                })
                .collect()
        }
        None => vec![0.0; vehicles.len()],
    };

    let mu = params
        .mu
        .unwrap_or_else(|| calibrate_mu(&pos, &soft_bonus, params.mode, params.alpha, params.rho));

    let selected = greedy_select(&pos, &neg, &soft_bonus, params, mu);

    let mut ranked = Vec::with_capacity(selected.len());
    for (rank, idx) in selected.iter().enumerate() {
        let mut product = vehicles[*idx].clone();
        product.ranking.pos_score = Some(pos[*idx].iter().sum::<f32>() as f64);
        product.ranking.neg_score = Some(neg[*idx].iter().sum::<f32>() as f64);
        product.ranking.rank = Some(rank as u32 + 1);
        ranked.push(product);
    }

    info!("Coverage-risk: selected {} vehicles", ranked.len());
    Ok(ranked)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phi_and_g() {
        assert_eq!(phi(0.4, 0.5), 0.0);
        assert!((phi(0.8, 0.5) - 0.3).abs() < 1e-6);
        assert_eq!(g(0.0, 1.0), 0.0);
        assert!(g(10.0, 1.0) < 1.0 && g(10.0, 1.0) > 0.999);
    }

    #[test]
    fn test_sum_mode_marginal_gains_non_increasing() {
        // Submodularity check: re-selecting the same coverage profile must
        // yield non-increasing gains along the greedy trace.
        let pos = vec![
            vec![0.9, 0.1],
            vec![0.8, 0.2],
            vec![0.7, 0.3],
            vec![0.1, 0.9],
        ];
        let neg: Vec<Vec<f32>> = vec![vec![]; 4];
        let bonus = vec![0.0; 4];
        let params = CoverageRiskParams {
            k: 4,
            mode: AggregationMode::Sum,
            ..Default::default()
        };

        // Replay the greedy and record each step's best gain
        let g_pos: Vec<Vec<f32>> = pos
            .iter()
            .map(|row| row.iter().map(|x| g(*x, params.alpha)).collect())
            .collect();
        let order = greedy_select(&pos, &neg, &bonus, &params, 0.0);
        let mut q = vec![1.0f32; 2];
        let mut last_gain = f32::INFINITY;
        for idx in order {
            let gain: f32 = g_pos[idx].iter().zip(&q).map(|(gp, qj)| gp * qj).sum();
            assert!(gain <= last_gain + 1e-6, "gain increased along greedy trace");
            last_gain = gain;
            for (qj, gp) in q.iter_mut().zip(&g_pos[idx]) {
                *qj *= 1.0 - gp;
            }
        }
    }

    #[test]
    fn test_greedy_prefers_coverage_over_redundancy() {
        // Vehicle 0 covers pref A strongly; vehicle 1 duplicates it;
        // vehicle 2 covers pref B. Second pick must be vehicle 2.
        let pos = vec![vec![1.0, 0.0], vec![0.95, 0.0], vec![0.0, 0.8]];
        let neg: Vec<Vec<f32>> = vec![vec![]; 3];
        let bonus = vec![0.0; 3];
        let params = CoverageRiskParams {
            k: 2,
            mode: AggregationMode::Sum,
            ..Default::default()
        };
        let order = greedy_select(&pos, &neg, &bonus, &params, 0.0);
        assert_eq!(order, vec![0, 2]);
    }

    #[test]
    fn test_risk_penalty_demotes() {
        let pos = vec![vec![0.6], vec![0.6]];
        let neg = vec![vec![0.0], vec![1.0]];
        let bonus = vec![0.0; 2];
        let params = CoverageRiskParams {
            k: 1,
            lambda_risk: 0.5,
            mode: AggregationMode::Sum,
            ..Default::default()
        };
        let order = greedy_select(&pos, &neg, &bonus, &params, 0.0);
        assert_eq!(order, vec![0]);
    }

    #[test]
    fn test_soft_constraint_tiers_and_membership() {
        let mut original_values = FilterMap::new();
        original_values.insert("price".into(), Value::String("0-30000".into()));
        original_values.insert("make".into(), Value::String("Honda,Toyota".into()));
        let state = RelaxationState {
            relaxed_filters: vec!["price".into(), "make".into()],
            original_values,
            relaxed_inferred: vec!["price".into()],
            unmet_must_haves: vec!["make".into()],
            ..Default::default()
        };
        let constraints = build_soft_constraints(&state);
        assert_eq!(constraints.len(), 2);

        let price = constraints.iter().find(|c| c.dimension == "price").unwrap();
        assert_eq!(price.weight, 0.5); // inferred tier
        let make = constraints.iter().find(|c| c.dimension == "make").unwrap();
        assert_eq!(make.weight, 2.0); // must-have tier

        let inside = Product {
            id: "v".into(),
            name: "v".into(),
            vehicle: Some(crate::data::product::VehicleFields {
                make: Some("honda".into()),
                price: Some(25_000),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(price.satisfied_by(&inside));
        assert!(make.satisfied_by(&inside)); // case-insensitive categorical
    }

    #[test]
    fn test_mu_calibration_zero_without_bonus() {
        let pos = vec![vec![0.5], vec![0.6]];
        assert_eq!(calibrate_mu(&pos, &[0.0, 0.0], AggregationMode::Sum, 1.0, 1.0), 0.0);
        let mu = calibrate_mu(&pos, &[1.0, 0.0], AggregationMode::Sum, 1.0, 1.0);
        assert!(mu > 0.0);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
        assert_eq!(median(&[]), 0.0);
    }
}
