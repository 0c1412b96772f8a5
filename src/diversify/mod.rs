// src/diversify/mod.rs

pub mod bucketing;
pub mod entropy;

pub use bucketing::{bucket_products, BucketedGrid};
pub use entropy::{
    compute_dimension_entropy, compute_shannon_entropy, discover_dimensions,
    select_diversification_dimension,
};
