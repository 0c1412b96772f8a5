// src/embedding/phrase_store.rs
// Pre-computed per-vehicle pros/cons phrase embeddings with year imputation.
//
// Each review phrase is embedded individually (never concatenated): the
// coverage-risk scorer needs per-phrase similarities against user preference
// embeddings. The dataset is produced offline; at startup we load it and
// impute records for every (make, model, year) the vehicle table knows about.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{Result, ServiceError};

use super::encoder::TextEncoder;
use super::npy;

/// Pre-computed individual phrase embeddings for one (make, model, year).
#[derive(Debug, Clone)]
pub struct VehiclePhrases {
    pub make: String,
    pub model: String,
    pub year: i64,
    pub pros_phrases: Vec<String>,
    pub cons_phrases: Vec<String>,
    /// One row per pros phrase, L2-normalised, shape (n_pros, D)
    pub pros_embeddings: Vec<Vec<f32>>,
    /// One row per cons phrase, shape (n_cons, D)
    pub cons_embeddings: Vec<Vec<f32>>,
    pub imputed: bool,
}

/// Coverage statistics reported by /status and the demo CLI.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CoverageStats {
    pub total: usize,
    pub native: usize,
    pub imputed: usize,
    pub total_pros: usize,
    pub total_cons: usize,
    pub approx_mb: f64,
}

#[derive(Debug, Deserialize)]
struct IndexEntry {
    make: String,
    model: String,
    year: i64,
    pros_start: usize,
    n_pros: usize,
    cons_start: usize,
    n_cons: usize,
}

type MmyKey = (String, String, i64);

fn key_of(make: &str, model: &str, year: i64) -> MmyKey {
    (make.to_uppercase(), model.to_uppercase(), year)
}

/// Singleton store: loaded once at startup, read-only afterwards.
pub struct PhraseStore {
    dir: PathBuf,
    encoder: Arc<TextEncoder>,
    records: RwLock<Option<HashMap<MmyKey, Arc<VehiclePhrases>>>>,
}

impl PhraseStore {
    pub fn new(dir: impl Into<PathBuf>, encoder: Arc<TextEncoder>) -> Self {
        Self {
            dir: dir.into(),
            encoder,
            records: RwLock::new(None),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.records.read().map(|g| g.is_some()).unwrap_or(false)
    }

    /// Load the on-disk dataset and impute coverage for every (make, model,
    /// year) present in the vehicle table. Make+model combinations with no
    /// reviews at any year are logged and left absent.
    pub fn preload(&self, vehicle_mmys: &[(String, String, i64)]) -> Result<CoverageStats> {
        let embeddings = npy::read_matrix(&self.dir.join("phrase_embeddings.npy"))?;
        let index: Vec<IndexEntry> = read_json(&self.dir.join("phrase_index.json"))?;
        let texts: Vec<String> = match read_json(&self.dir.join("phrase_texts.json")) {
            Ok(texts) => texts,
            Err(_) => {
                warn!("phrase_texts.json missing; scores will work without phrase display text");
                Vec::new()
            }
        };

        info!(
            "Loaded {} phrase embeddings ({} MMY index entries) from {}",
            embeddings.rows,
            index.len(),
            self.dir.display()
        );

        let mut native: HashMap<MmyKey, Arc<VehiclePhrases>> = HashMap::new();
        let mut by_mm: HashMap<(String, String), Vec<Arc<VehiclePhrases>>> = HashMap::new();

        for entry in &index {
            if entry.pros_start + entry.n_pros > embeddings.rows
                || entry.cons_start + entry.n_cons > embeddings.rows
            {
                return Err(ServiceError::Data(format!(
                    "phrase index entry {} {} {} points outside the embedding matrix",
                    entry.make, entry.model, entry.year
                )));
            }

            let slice_texts = |start: usize, n: usize| -> Vec<String> {
                if texts.len() >= start + n {
                    texts[start..start + n].to_vec()
                } else {
                    Vec::new()
                }
            };

            let record = Arc::new(VehiclePhrases {
                make: entry.make.clone(),
                model: entry.model.clone(),
                year: entry.year,
                pros_phrases: slice_texts(entry.pros_start, entry.n_pros),
                cons_phrases: slice_texts(entry.cons_start, entry.n_cons),
                pros_embeddings: embeddings.rows_slice(entry.pros_start, entry.n_pros),
                cons_embeddings: embeddings.rows_slice(entry.cons_start, entry.n_cons),
                imputed: false,
            });

            native.insert(key_of(&entry.make, &entry.model, entry.year), record.clone());
            by_mm
                .entry((entry.make.to_uppercase(), entry.model.to_uppercase()))
                .or_default()
                .push(record);
        }

        // Most recent year first: imputation copies from the newest review
        for list in by_mm.values_mut() {
            list.sort_by(|a, b| b.year.cmp(&a.year));
        }

        let mut records = native.clone();
        let mut imputed_count = 0usize;
        let mut uncovered = 0usize;
        for (make, model, year) in vehicle_mmys {
            let key = key_of(make, model, *year);
            if records.contains_key(&key) {
                continue;
            }
            match by_mm.get(&(make.to_uppercase(), model.to_uppercase())) {
                Some(list) => {
                    let source = &list[0];
                    records.insert(
                        key,
                        Arc::new(VehiclePhrases {
                            make: make.clone(),
                            model: model.clone(),
                            year: *year,
                            pros_phrases: source.pros_phrases.clone(),
                            cons_phrases: source.cons_phrases.clone(),
                            pros_embeddings: source.pros_embeddings.clone(),
                            cons_embeddings: source.cons_embeddings.clone(),
                            imputed: true,
                        }),
                    );
                    imputed_count += 1;
                }
                None => {
                    uncovered += 1;
                }
            }
        }

        info!(
            "Phrase store ready: {} records ({} native, {} imputed, {} make+model without reviews)",
            records.len(),
            records.len() - imputed_count,
            imputed_count,
            uncovered
        );

        *self.records.write().expect("phrase store lock poisoned") = Some(records);
        self.coverage_stats()
    }

    /// Exact-match lookup by (make, model, year), case-insensitive.
    pub fn get_phrases(&self, make: &str, model: &str, year: i64) -> Result<Option<Arc<VehiclePhrases>>> {
        let guard = self.records.read().expect("phrase store lock poisoned");
        match guard.as_ref() {
            Some(records) => Ok(records.get(&key_of(make, model, year)).cloned()),
            None => Err(ServiceError::PhraseStoreNotReady),
        }
    }

    /// Encode a single preference phrase (L2-normalised).
    pub async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        self.encoder.encode(text).await
    }

    /// Batched encoding of preference phrases.
    pub async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.encoder.encode_batch(texts).await
    }

    pub fn coverage_stats(&self) -> Result<CoverageStats> {
        let guard = self.records.read().expect("phrase store lock poisoned");
        let records = guard.as_ref().ok_or(ServiceError::PhraseStoreNotReady)?;

        let mut stats = CoverageStats {
            total: records.len(),
            native: 0,
            imputed: 0,
            total_pros: 0,
            total_cons: 0,
            approx_mb: 0.0,
        };
        let mut bytes = 0usize;
        for record in records.values() {
            if record.imputed {
                stats.imputed += 1;
            } else {
                stats.native += 1;
            }
            stats.total_pros += record.pros_phrases.len();
            stats.total_cons += record.cons_phrases.len();
            bytes += record
                .pros_embeddings
                .iter()
                .chain(record.cons_embeddings.iter())
                .map(|row| row.len() * 4)
                .sum::<usize>();
        }
        stats.approx_mb = bytes as f64 / (1024.0 * 1024.0);
        Ok(stats)
    }

    /// Insert a record directly (test fixtures).
    #[doc(hidden)]
    pub fn insert_record(&self, record: VehiclePhrases) {
        let mut guard = self.records.write().expect("phrase store lock poisoned");
        let map = guard.get_or_insert_with(HashMap::new);
        map.insert(key_of(&record.make, &record.model, record.year), Arc::new(record));
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingConfig;

    fn encoder() -> Arc<TextEncoder> {
        Arc::new(TextEncoder::new(EmbeddingConfig {
            api_key: String::new(),
            base_url: String::new(),
            model: "test".into(),
            batch_size: 128,
            timeout_secs: 1,
        }))
    }

    fn write_fixture(dir: &Path) {
        // Two MMYs: CIVIC 2022 (2 pros, 1 con), CAMRY 2021 (1 pro, 1 con)
        let matrix = npy::Matrix::new(
            5,
            2,
            vec![
                1.0, 0.0, // civic pro 0
                0.0, 1.0, // civic pro 1
                -1.0, 0.0, // civic con 0
                0.6, 0.8, // camry pro 0
                0.0, -1.0, // camry con 0
            ],
        )
        .unwrap();
        npy::write_matrix(&dir.join("phrase_embeddings.npy"), &matrix).unwrap();
        std::fs::write(
            dir.join("phrase_index.json"),
            serde_json::json!([
                {"make": "Honda", "model": "Civic", "year": 2022,
                 "pros_start": 0, "n_pros": 2, "cons_start": 2, "n_cons": 1},
                {"make": "Toyota", "model": "Camry", "year": 2021,
                 "pros_start": 3, "n_pros": 1, "cons_start": 4, "n_cons": 1},
            ])
            .to_string(),
        )
        .unwrap();
        std::fs::write(
            dir.join("phrase_texts.json"),
            serde_json::json!([
                "great fuel economy", "spacious cabin", "road noise",
                "smooth ride", "dull styling"
            ])
            .to_string(),
        )
        .unwrap();
    }

    #[test]
    fn test_not_ready_before_preload() {
        let store = PhraseStore::new("/nonexistent", encoder());
        let err = store.get_phrases("Honda", "Civic", 2022).unwrap_err();
        assert!(matches!(err, ServiceError::PhraseStoreNotReady));
    }

    #[test]
    fn test_preload_and_imputation() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());
        let store = PhraseStore::new(dir.path(), encoder());

        let mmys = vec![
            ("Honda".to_string(), "Civic".to_string(), 2022),
            ("Honda".to_string(), "Civic".to_string(), 2023), // no reviews: imputed from 2022
            ("Toyota".to_string(), "Camry".to_string(), 2021),
            ("Rivian".to_string(), "R1T".to_string(), 2023), // no reviews at all
        ];
        let stats = store.preload(&mmys).unwrap();

        assert_eq!(stats.total, 3);
        assert_eq!(stats.native, 2);
        assert_eq!(stats.imputed, 1);

        // Native record, case-insensitive lookup
        let civic = store.get_phrases("HONDA", "civic", 2022).unwrap().unwrap();
        assert!(!civic.imputed);
        assert_eq!(civic.pros_phrases, vec!["great fuel economy", "spacious cabin"]);
        assert_eq!(civic.pros_embeddings.len(), 2);

        // Imputed record carries the requested year and the source phrases
        let civic_23 = store.get_phrases("Honda", "Civic", 2023).unwrap().unwrap();
        assert!(civic_23.imputed);
        assert_eq!(civic_23.year, 2023);
        assert_eq!(civic_23.pros_embeddings, civic.pros_embeddings);

        // Unreviewed make+model stays absent
        assert!(store.get_phrases("Rivian", "R1T", 2023).unwrap().is_none());
    }
}
