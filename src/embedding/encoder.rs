// src/embedding/encoder.rs
// Sentence-encoder client backed by an OpenAI-compatible /embeddings endpoint

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::EmbeddingConfig;
use crate::error::{Result, ServiceError};

use super::l2_normalize;

/// Shared text encoder. One instance serves all requests; `encode` is safe
/// for concurrent use and memoises per-text vectors in process.
pub struct TextEncoder {
    client: Client,
    config: EmbeddingConfig,
    cache: Arc<RwLock<HashMap<String, Vec<f32>>>>,
}

impl TextEncoder {
    pub fn new(config: EmbeddingConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            config,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn is_available(&self) -> bool {
        !self.config.api_key.is_empty()
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Encode a single text into an L2-normalised vector.
    pub async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(hit) = self.cache.read().await.get(text) {
            return Ok(hit.clone());
        }
        let mut rows = self.request_embeddings(std::slice::from_ref(&text.to_string())).await?;
        let row = rows
            .pop()
            .ok_or_else(|| ServiceError::Data("empty embedding response".into()))?;
        self.cache.write().await.insert(text.to_string(), row.clone());
        Ok(row)
    }

    /// Encode many texts, chunked at the configured batch size. Rows come
    /// back L2-normalised, aligned with the input order.
    pub async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut out: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut misses: Vec<(usize, String)> = Vec::new();
        {
            let cache = self.cache.read().await;
            for (i, text) in texts.iter().enumerate() {
                match cache.get(text) {
                    Some(hit) => out[i] = Some(hit.clone()),
                    None => misses.push((i, text.clone())),
                }
            }
        }

        if !misses.is_empty() {
            info!("Encoding {} texts ({} cache hits)", misses.len(), texts.len() - misses.len());
            let batch_size = self.config.batch_size.max(1);
            for chunk in misses.chunks(batch_size) {
                let chunk_texts: Vec<String> = chunk.iter().map(|(_, t)| t.clone()).collect();
                let rows = self.request_embeddings(&chunk_texts).await?;
                if rows.len() != chunk.len() {
                    return Err(ServiceError::Data(format!(
                        "embedding API returned {} rows for {} inputs",
                        rows.len(),
                        chunk.len()
                    )));
                }
                let mut cache = self.cache.write().await;
                for ((i, text), row) in chunk.iter().zip(rows) {
                    cache.insert(text.clone(), row.clone());
                    out[*i] = Some(row);
                }
            }
        }

        Ok(out.into_iter().map(|v| v.unwrap_or_default()).collect())
    }

    async fn request_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if !self.is_available() {
            return Err(ServiceError::MissingEncoder);
        }

        debug!("Requesting embeddings for {} texts", texts.len());
        let body = json!({
            "model": self.config.model,
            "input": texts,
        });

        let response = self
            .client
            .post(format!("{}/embeddings", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if response.status().as_u16() == 429 {
            return Err(ServiceError::RateLimited);
        }
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ServiceError::Data(format!(
                "embedding API error {status}: {error_text}"
            )));
        }

        let raw: Value = response.json().await?;
        let rows = raw
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| ServiceError::Data("no data array in embedding response".into()))?;

        let mut embeddings = Vec::with_capacity(rows.len());
        for row in rows {
            let mut vector: Vec<f32> = row
                .get("embedding")
                .and_then(|e| e.as_array())
                .ok_or_else(|| ServiceError::Data("missing embedding values".into()))?
                .iter()
                .filter_map(|v| v.as_f64().map(|f| f as f32))
                .collect();
            l2_normalize(&mut vector);
            embeddings.push(vector);
        }
        Ok(embeddings)
    }

    /// Number of memoised vectors (used by /status).
    pub async fn cache_len(&self) -> usize {
        self.cache.read().await.len()
    }

    /// Seed the memo cache directly. Tests use this to exercise encode paths
    /// without a live endpoint.
    pub async fn prime(&self, text: &str, vector: Vec<f32>) {
        self.cache.write().await.insert(text.to_string(), vector);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> EmbeddingConfig {
        EmbeddingConfig {
            api_key: String::new(),
            base_url: "http://localhost:0".into(),
            model: "all-mpnet-base-v2".into(),
            batch_size: 128,
            timeout_secs: 1,
        }
    }

    #[tokio::test]
    async fn test_missing_encoder_error() {
        let encoder = TextEncoder::new(test_config());
        assert!(!encoder.is_available());
        let err = encoder.encode("hello").await.unwrap_err();
        assert!(matches!(err, ServiceError::MissingEncoder));
    }

    #[tokio::test]
    async fn test_primed_cache_serves_without_network() {
        let encoder = TextEncoder::new(test_config());
        encoder.prime("spacious", vec![1.0, 0.0]).await;
        let v = encoder.encode("spacious").await.unwrap();
        assert_eq!(v, vec![1.0, 0.0]);

        let batch = encoder
            .encode_batch(&["spacious".to_string()])
            .await
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0], vec![1.0, 0.0]);
    }
}
