// src/config/mod.rs
// Central configuration for the showroom service

pub mod helpers;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

use self::helpers::{env_opt, env_or, env_parsed_or};

pub static CONFIG: Lazy<Config> = Lazy::new(Config::from_env);

/// Recommendation ranking method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingMethod {
    EmbeddingSimilarity,
    CoverageRisk,
}

impl RankingMethod {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "embedding_similarity" => Self::EmbeddingSimilarity,
            _ => Self::CoverageRisk,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmbeddingSimilarity => "embedding_similarity",
            Self::CoverageRisk => "coverage_risk",
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub latency_target_ms: u64,
}

impl ServerConfig {
    fn from_env() -> Self {
        Self {
            host: env_or("SHOWROOM_HOST", "127.0.0.1"),
            port: env_parsed_or("SHOWROOM_PORT", 8090),
            latency_target_ms: env_parsed_or("SHOWROOM_LATENCY_TARGET_MS", 400),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Database configuration (products + vehicles SQLite files)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub products_url: String,
    pub vehicles_url: String,
    pub max_connections: u32,
    pub query_timeout_secs: u64,
}

impl DatabaseConfig {
    fn from_env() -> Self {
        Self {
            products_url: env_or("SHOWROOM_PRODUCTS_DB", "sqlite://data/products.db"),
            vehicles_url: env_or("SHOWROOM_VEHICLES_DB", "sqlite://data/vehicles.db"),
            max_connections: env_parsed_or("SHOWROOM_SQLITE_MAX_CONNECTIONS", 5),
            query_timeout_secs: env_parsed_or("SHOWROOM_SQL_TIMEOUT_SECS", 2),
        }
    }
}

/// Redis configuration. `url = None` disables the cache tier entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: Option<String>,
    pub default_ttl_secs: u64,
    pub timeout_secs: u64,
}

impl RedisConfig {
    fn from_env() -> Self {
        Self {
            url: env_opt("SHOWROOM_REDIS_URL"),
            default_ttl_secs: env_parsed_or("SHOWROOM_CACHE_TTL_SECS", 3600),
            timeout_secs: env_parsed_or("SHOWROOM_REDIS_TIMEOUT_SECS", 1),
        }
    }
}

/// Graph store (Neo4j HTTP endpoint). Optional: absent config disables it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    pub url: Option<String>,
    pub user: String,
    pub password: String,
    pub timeout_secs: u64,
}

impl GraphConfig {
    fn from_env() -> Self {
        Self {
            url: env_opt("SHOWROOM_NEO4J_URL"),
            user: env_or("SHOWROOM_NEO4J_USER", "neo4j"),
            password: env_or("SHOWROOM_NEO4J_PASSWORD", ""),
            timeout_secs: env_parsed_or("SHOWROOM_KG_TIMEOUT_SECS", 1),
        }
    }
}

/// LLM provider configuration (OpenAI-compatible chat completions)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub semantic_parser_model: String,
    pub question_generator_model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl LlmConfig {
    fn from_env() -> Self {
        Self {
            api_key: env_or("OPENAI_API_KEY", ""),
            base_url: env_or("SHOWROOM_LLM_BASE_URL", "https://api.openai.com/v1"),
            semantic_parser_model: env_or("SHOWROOM_SEMANTIC_PARSER_MODEL", "gpt-4o-mini"),
            question_generator_model: env_or("SHOWROOM_QUESTION_GENERATOR_MODEL", "gpt-4o"),
            temperature: env_parsed_or("SHOWROOM_LLM_TEMPERATURE", 0.0),
            timeout_secs: env_parsed_or("SHOWROOM_LLM_TIMEOUT_SECS", 5),
        }
    }
}

/// Sentence-encoder configuration (embeddings HTTP API)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub batch_size: usize,
    pub timeout_secs: u64,
}

impl EmbeddingConfig {
    fn from_env() -> Self {
        Self {
            api_key: env_or("OPENAI_API_KEY", ""),
            base_url: env_or("SHOWROOM_EMBEDDING_BASE_URL", "https://api.openai.com/v1"),
            model: env_or("SHOWROOM_EMBEDDING_MODEL", "all-mpnet-base-v2"),
            batch_size: env_parsed_or("SHOWROOM_EMBEDDING_BATCH_SIZE", 128),
            timeout_secs: env_parsed_or("SHOWROOM_EMBEDDING_TIMEOUT_SECS", 5),
        }
    }
}

/// Interview parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewConfig {
    /// Max clarifying questions before recommendations (k). 0 skips the interview.
    pub k: usize,
    pub min_entropy_threshold: f64,
    pub use_entropy_questions: bool,
}

impl InterviewConfig {
    fn from_env() -> Self {
        Self {
            k: env_parsed_or("SHOWROOM_K", 3),
            min_entropy_threshold: env_parsed_or("SHOWROOM_MIN_ENTROPY_THRESHOLD", 0.3),
            use_entropy_questions: env_parsed_or("SHOWROOM_USE_ENTROPY_QUESTIONS", true),
        }
    }
}

/// Ranking-engine parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationConfig {
    pub method: RankingMethod,
    pub embedding_similarity_lambda_param: f64,
    pub embedding_similarity_cluster_size: usize,
    pub embedding_similarity_min_similarity: f64,
    pub coverage_risk_lambda_risk: f32,
    /// Aggregation mode: "max" or "sum"
    pub coverage_risk_mode: String,
    pub coverage_risk_tau: f32,
    pub coverage_risk_alpha: f32,
    pub use_mmr_diversification: bool,
    pub use_progressive_relaxation: bool,
}

impl RecommendationConfig {
    fn from_env() -> Self {
        Self {
            method: RankingMethod::parse(&env_or("SHOWROOM_METHOD", "coverage_risk")),
            embedding_similarity_lambda_param: env_parsed_or("SHOWROOM_ES_LAMBDA", 0.85),
            embedding_similarity_cluster_size: env_parsed_or("SHOWROOM_ES_CLUSTER_SIZE", 3),
            embedding_similarity_min_similarity: env_parsed_or("SHOWROOM_ES_MIN_SIMILARITY", 0.4),
            coverage_risk_lambda_risk: env_parsed_or("SHOWROOM_CR_LAMBDA_RISK", 0.5),
            coverage_risk_mode: env_or("SHOWROOM_CR_MODE", "sum"),
            coverage_risk_tau: env_parsed_or("SHOWROOM_CR_TAU", 0.5),
            coverage_risk_alpha: env_parsed_or("SHOWROOM_CR_ALPHA", 1.0),
            use_mmr_diversification: env_parsed_or("SHOWROOM_USE_MMR", true),
            use_progressive_relaxation: env_parsed_or("SHOWROOM_USE_RELAXATION", true),
        }
    }
}

/// Diversification grid parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiversificationConfig {
    pub n_rows: usize,
    pub n_per_row: usize,
    pub use_entropy_bucketing: bool,
}

impl DiversificationConfig {
    fn from_env() -> Self {
        Self {
            n_rows: env_parsed_or("SHOWROOM_N_ROWS", 3),
            n_per_row: env_parsed_or("SHOWROOM_N_PER_ROW", 3),
            use_entropy_bucketing: env_parsed_or("SHOWROOM_USE_ENTROPY_BUCKETING", true),
        }
    }
}

/// On-disk dataset locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub vector_index_dir: String,
    pub phrase_embeddings_dir: String,
    pub index_version: String,
}

impl DataConfig {
    fn from_env() -> Self {
        Self {
            vector_index_dir: env_or("SHOWROOM_VECTOR_INDEX_DIR", "data/vector_indices"),
            phrase_embeddings_dir: env_or("SHOWROOM_PHRASE_EMBEDDINGS_DIR", "data/phrase_embeddings"),
            index_version: env_or("SHOWROOM_INDEX_VERSION", "v1"),
        }
    }
}

/// Main configuration - composes all domain configs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub graph: GraphConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub interview: InterviewConfig,
    pub recommendation: RecommendationConfig,
    pub diversification: DiversificationConfig,
    pub data: DataConfig,
    pub log_filter: String,
}

/// Optional TOML overrides, section-per-domain. Every field is optional so a
/// partial file only touches what it names.
#[derive(Debug, Default, Deserialize)]
struct FileOverrides {
    #[serde(default)]
    interview: FileInterview,
    #[serde(default)]
    recommendation: FileRecommendation,
    #[serde(default)]
    diversification: FileDiversification,
}

#[derive(Debug, Default, Deserialize)]
struct FileInterview {
    k: Option<usize>,
    use_entropy_questions: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct FileRecommendation {
    method: Option<String>,
    lambda_risk: Option<f32>,
    mode: Option<String>,
    tau: Option<f32>,
    alpha: Option<f32>,
    use_mmr_diversification: Option<bool>,
    use_progressive_relaxation: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct FileDiversification {
    n_rows: Option<usize>,
    n_per_row: Option<usize>,
    use_entropy_bucketing: Option<bool>,
}

impl Config {
    /// Load configuration: .env first, then environment, then showroom.toml
    /// overrides for the tunable interview/recommendation sections.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let mut config = Self {
            server: ServerConfig::from_env(),
            database: DatabaseConfig::from_env(),
            redis: RedisConfig::from_env(),
            graph: GraphConfig::from_env(),
            llm: LlmConfig::from_env(),
            embedding: EmbeddingConfig::from_env(),
            interview: InterviewConfig::from_env(),
            recommendation: RecommendationConfig::from_env(),
            diversification: DiversificationConfig::from_env(),
            data: DataConfig::from_env(),
            log_filter: env_or("SHOWROOM_LOG", "showroom=info"),
        };

        let path = env_or("SHOWROOM_CONFIG_FILE", "showroom.toml");
        if Path::new(&path).exists() {
            config.apply_file(&path);
        }

        config
    }

    fn apply_file(&mut self, path: &str) {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to read config file {}: {}", path, e);
                return;
            }
        };
        let overrides: FileOverrides = match toml::from_str(&raw) {
            Ok(o) => o,
            Err(e) => {
                warn!("Ignoring malformed config file {}: {}", path, e);
                return;
            }
        };

        if let Some(k) = overrides.interview.k {
            self.interview.k = k;
        }
        if let Some(v) = overrides.interview.use_entropy_questions {
            self.interview.use_entropy_questions = v;
        }
        if let Some(m) = overrides.recommendation.method {
            self.recommendation.method = RankingMethod::parse(&m);
        }
        if let Some(v) = overrides.recommendation.lambda_risk {
            self.recommendation.coverage_risk_lambda_risk = v;
        }
        if let Some(m) = overrides.recommendation.mode {
            self.recommendation.coverage_risk_mode = m;
        }
        if let Some(v) = overrides.recommendation.tau {
            self.recommendation.coverage_risk_tau = v;
        }
        if let Some(v) = overrides.recommendation.alpha {
            self.recommendation.coverage_risk_alpha = v;
        }
        if let Some(v) = overrides.recommendation.use_mmr_diversification {
            self.recommendation.use_mmr_diversification = v;
        }
        if let Some(v) = overrides.recommendation.use_progressive_relaxation {
            self.recommendation.use_progressive_relaxation = v;
        }
        if let Some(v) = overrides.diversification.n_rows {
            self.diversification.n_rows = v;
        }
        if let Some(v) = overrides.diversification.n_per_row {
            self.diversification.n_per_row = v;
        }
        if let Some(v) = overrides.diversification.use_entropy_bucketing {
            self.diversification.use_entropy_bucketing = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranking_method_parse() {
        assert_eq!(
            RankingMethod::parse("embedding_similarity"),
            RankingMethod::EmbeddingSimilarity
        );
        assert_eq!(RankingMethod::parse("coverage_risk"), RankingMethod::CoverageRisk);
        // Unknown values fall back to the default method
        assert_eq!(RankingMethod::parse("???"), RankingMethod::CoverageRisk);
    }

    #[test]
    fn test_file_overrides_partial() {
        let mut config = Config::from_env();
        let dir = std::env::temp_dir().join("showroom_config_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("showroom.toml");
        std::fs::write(&path, "[interview]\nk = 5\n[recommendation]\nmode = \"max\"\n").unwrap();

        config.apply_file(path.to_str().unwrap());
        assert_eq!(config.interview.k, 5);
        assert_eq!(config.recommendation.coverage_risk_mode, "max");
        // Untouched sections keep their env defaults
        assert_eq!(config.diversification.n_rows, 3);
    }
}
