// src/embedding/dense_store.rs
// Flat nearest-neighbour index over per-product embeddings.
//
// The index is brute-force by design: candidate sets are SQL-narrowed before
// vector scoring, so a flat scan beats maintaining an ANN structure here.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use serde::Deserialize;
use tracing::info;

use crate::error::{Result, ServiceError};

use super::encoder::TextEncoder;
use super::{dot, l2_distance, normalized_sum, npy};

/// How a multi-feature query is turned into one query vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMethod {
    /// L2-normalised element-wise sum of per-feature embeddings.
    Sum,
    /// Features joined into one sentence, encoded once.
    Concat,
}

impl QueryMethod {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "concat" => Self::Concat,
            _ => Self::Sum,
        }
    }
}

struct Index {
    ids: Vec<String>,
    id_to_row: HashMap<String, usize>,
    matrix: npy::Matrix,
}

/// Read-only dense store, shared across requests. Per-product embedding
/// lookups are served straight from the loaded matrix.
pub struct DenseEmbeddingStore {
    dir: PathBuf,
    version: String,
    encoder: Arc<TextEncoder>,
    index: RwLock<Option<Index>>,
}

impl DenseEmbeddingStore {
    pub fn new(dir: impl Into<PathBuf>, version: impl Into<String>, encoder: Arc<TextEncoder>) -> Self {
        Self {
            dir: dir.into(),
            version: version.into(),
            encoder,
            index: RwLock::new(None),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.index.read().map(|g| g.is_some()).unwrap_or(false)
    }

    fn model_slug(&self) -> String {
        self.encoder.model().replace(['/', '-'], "_")
    }

    /// Load the serialised index. File names carry the encoder model and
    /// dataset version so a model swap cannot silently reuse stale vectors.
    pub fn load(&self) -> Result<usize> {
        let slug = self.model_slug();
        let matrix_path = self
            .dir
            .join(format!("index_flat_{}_{}.npy", slug, self.version));
        let ids_path = self
            .dir
            .join(format!("ids_flat_{}_{}.json", slug, self.version));

        let matrix = npy::read_matrix(&matrix_path)?;
        let raw = std::fs::read_to_string(&ids_path)?;
        let ids: Vec<String> = serde_json::from_str(&raw)?;
        if ids.len() != matrix.rows {
            return Err(ServiceError::Data(format!(
                "id list has {} entries but index has {} rows",
                ids.len(),
                matrix.rows
            )));
        }

        let id_to_row = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();

        info!(
            "Dense index loaded: {} products x {} dims from {}",
            matrix.rows,
            matrix.cols,
            matrix_path.display()
        );

        let count = matrix.rows;
        *self.index.write().expect("dense index lock poisoned") = Some(Index {
            ids,
            id_to_row,
            matrix,
        });
        Ok(count)
    }

    pub async fn encode_text(&self, text: &str) -> Result<Vec<f32>> {
        self.encoder.encode(text).await
    }

    /// Build a query vector from individual feature strings: the
    /// "bag of preferences" sum of their embeddings, L2-normalised.
    pub async fn encode_features(&self, features: &[String]) -> Result<Vec<f32>> {
        if features.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self.encoder.encode_batch(features).await?;
        Ok(normalized_sum(&rows))
    }

    /// Full-index search. Scores are similarities derived from L2 distance:
    /// similarity = 1 / (1 + distance).
    pub async fn search(&self, query_text: &str, k: usize) -> Result<(Vec<String>, Vec<f32>)> {
        let query = self.encode_text(query_text).await?;
        let guard = self.index.read().expect("dense index lock poisoned");
        let index = guard
            .as_ref()
            .ok_or_else(|| ServiceError::Data("dense index not loaded".into()))?;

        let mut scored: Vec<(usize, f32)> = (0..index.matrix.rows)
            .map(|row| {
                let distance = l2_distance(&query, index.matrix.row(row));
                (row, 1.0 / (1.0 + distance))
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok((
            scored.iter().map(|(row, _)| index.ids[*row].clone()).collect(),
            scored.iter().map(|(_, s)| *s).collect(),
        ))
    }

    /// Rank a SQL-narrowed candidate subset against a query. `Sum` builds the
    /// query from individual feature strings; `Concat` joins them into one
    /// sentence. Candidates without an indexed embedding score 0.
    pub async fn search_by_ids(
        &self,
        candidate_ids: &[String],
        query_features: &[String],
        k: Option<usize>,
        method: QueryMethod,
    ) -> Result<(Vec<String>, Vec<f32>)> {
        if candidate_ids.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }

        let query = match method {
            QueryMethod::Sum => self.encode_features(query_features).await?,
            QueryMethod::Concat => self.encode_text(&query_features.join(" ")).await?,
        };

        let guard = self.index.read().expect("dense index lock poisoned");
        let index = guard
            .as_ref()
            .ok_or_else(|| ServiceError::Data("dense index not loaded".into()))?;

        let mut scored: Vec<(String, f32)> = candidate_ids
            .iter()
            .map(|id| {
                let score = index
                    .id_to_row
                    .get(id)
                    .map(|row| dot(&query, index.matrix.row(*row)))
                    .unwrap_or(0.0);
                (id.clone(), score)
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        if let Some(k) = k {
            scored.truncate(k);
        }

        Ok((
            scored.iter().map(|(id, _)| id.clone()).collect(),
            scored.iter().map(|(_, s)| *s).collect(),
        ))
    }

    /// Pre-computed embedding for one product id, if indexed.
    pub fn embedding_for(&self, id: &str) -> Option<Vec<f32>> {
        let guard = self.index.read().expect("dense index lock poisoned");
        let index = guard.as_ref()?;
        index.id_to_row.get(id).map(|row| index.matrix.row(*row).to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingConfig;

    fn encoder() -> Arc<TextEncoder> {
        Arc::new(TextEncoder::new(EmbeddingConfig {
            api_key: String::new(),
            base_url: String::new(),
            model: "all-mpnet-base-v2".into(),
            batch_size: 128,
            timeout_secs: 1,
        }))
    }

    fn fixture_store(dir: &std::path::Path) -> DenseEmbeddingStore {
        let matrix = npy::Matrix::new(
            3,
            2,
            vec![
                1.0, 0.0, // p1
                0.0, 1.0, // p2
                0.7071, 0.7071, // p3
            ],
        )
        .unwrap();
        npy::write_matrix(&dir.join("index_flat_all_mpnet_base_v2_v1.npy"), &matrix).unwrap();
        std::fs::write(
            dir.join("ids_flat_all_mpnet_base_v2_v1.json"),
            serde_json::json!(["p1", "p2", "p3"]).to_string(),
        )
        .unwrap();
        DenseEmbeddingStore::new(dir, "v1", encoder())
    }

    #[tokio::test]
    async fn test_search_by_ids_sum_method() {
        let dir = tempfile::tempdir().unwrap();
        let store = fixture_store(dir.path());
        store.load().unwrap();

        store.encoder.prime("fast", vec![1.0, 0.0]).await;
        let candidates: Vec<String> = vec!["p1".into(), "p2".into(), "p3".into(), "ghost".into()];
        let (ids, scores) = store
            .search_by_ids(&candidates, &["fast".to_string()], Some(3), QueryMethod::Sum)
            .await
            .unwrap();

        assert_eq!(ids[0], "p1");
        assert!(scores[0] > scores[1]);
        // p3 lies between the axes
        assert_eq!(ids[1], "p3");
    }

    #[tokio::test]
    async fn test_search_similarity_from_distance() {
        let dir = tempfile::tempdir().unwrap();
        let store = fixture_store(dir.path());
        store.load().unwrap();
        store.encoder.prime("query", vec![1.0, 0.0]).await;

        let (ids, scores) = store.search("query", 2).await.unwrap();
        assert_eq!(ids[0], "p1");
        // Exact match has distance 0 => similarity 1
        assert!((scores[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_load_rejects_misaligned_ids() {
        let dir = tempfile::tempdir().unwrap();
        let matrix = npy::Matrix::new(2, 2, vec![1.0, 0.0, 0.0, 1.0]).unwrap();
        npy::write_matrix(&dir.path().join("index_flat_all_mpnet_base_v2_v1.npy"), &matrix).unwrap();
        std::fs::write(
            dir.path().join("ids_flat_all_mpnet_base_v2_v1.json"),
            serde_json::json!(["only-one"]).to_string(),
        )
        .unwrap();
        let store = DenseEmbeddingStore::new(dir.path(), "v1", encoder());
        assert!(store.load().is_err());
    }
}
