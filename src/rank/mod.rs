// src/rank/mod.rs

pub mod coverage_risk;
pub mod embedding_sim;
pub mod mmr;

pub use coverage_risk::{rank_with_coverage_risk, AggregationMode, CoverageRiskParams, RelaxationState};
pub use embedding_sim::{rank_with_embedding_similarity, EmbeddingSimilarityParams};
