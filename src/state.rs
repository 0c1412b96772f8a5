// src/state.rs
// Application state shared across handlers.

use std::collections::HashMap;
use std::sync::Arc;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tokio::sync::RwLock;
use tracing::info;

use crate::cache::RedisCache;
use crate::chat::ChatOrchestrator;
use crate::config::Config;
use crate::data::{ProductStore, VehicleStore};
use crate::embedding::{DenseEmbeddingStore, PhraseStore, TextEncoder};
use crate::error::Result;
use crate::graph::GraphStore;
use crate::llm::ChatProvider;
use crate::search::HybridSearch;
use crate::session::SessionManager;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub products: Arc<ProductStore>,
    pub vehicles: Arc<VehicleStore>,
    pub cache: RedisCache,
    pub graph: Arc<GraphStore>,
    pub sessions: Arc<SessionManager>,
    pub provider: Arc<ChatProvider>,
    pub encoder: Arc<TextEncoder>,
    pub phrase_store: Arc<PhraseStore>,
    pub dense: Arc<DenseEmbeddingStore>,
    pub hybrid: Arc<HybridSearch>,
    pub orchestrator: Arc<ChatOrchestrator>,
    /// Per-component preload timings in seconds, surfaced by /status.
    pub preload_report: Arc<RwLock<HashMap<String, f64>>>,
}

async fn connect_sqlite(url: &str, max_connections: u32) -> Result<SqlitePool> {
    let options: SqliteConnectOptions = url
        .parse::<SqliteConnectOptions>()
        .map_err(sqlx::Error::from)?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;
    Ok(pool)
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self> {
        let config = Arc::new(config);

        info!("Connecting product database: {}", config.database.products_url);
        let products_pool =
            connect_sqlite(&config.database.products_url, config.database.max_connections).await?;
        let products = Arc::new(ProductStore::new(products_pool));
        products.ensure_schema().await?;

        info!("Connecting vehicle database: {}", config.database.vehicles_url);
        let vehicles_pool =
            connect_sqlite(&config.database.vehicles_url, config.database.max_connections).await?;
        let vehicles = Arc::new(VehicleStore::new(vehicles_pool));
        vehicles.ensure_schema().await?;

        let cache = RedisCache::connect(&config.redis).await;
        let graph = Arc::new(GraphStore::new(&config.graph));
        let sessions = Arc::new(SessionManager::new(cache.clone(), graph.clone()));

        info!("Initializing LLM provider ({})", config.llm.semantic_parser_model);
        let provider = Arc::new(ChatProvider::new(config.llm.clone()));
        if !provider.is_available() {
            info!("LLM provider unconfigured; rule-based paths will answer everything");
        }

        let encoder = Arc::new(TextEncoder::new(config.embedding.clone()));
        let phrase_store = Arc::new(PhraseStore::new(
            config.data.phrase_embeddings_dir.clone(),
            encoder.clone(),
        ));
        let dense = Arc::new(DenseEmbeddingStore::new(
            config.data.vector_index_dir.clone(),
            config.data.index_version.clone(),
            encoder.clone(),
        ));

        let hybrid = Arc::new(HybridSearch::new(
            products.clone(),
            dense.clone(),
            graph.clone(),
            cache.clone(),
            sessions.clone(),
            provider.clone(),
            config.clone(),
        ));

        let orchestrator = Arc::new(ChatOrchestrator::new(
            sessions.clone(),
            provider.clone(),
            hybrid.clone(),
            vehicles.clone(),
            phrase_store.clone(),
            dense.clone(),
            config.clone(),
        ));

        info!("Application state initialized");

        Ok(Self {
            config,
            products,
            vehicles,
            cache,
            graph,
            sessions,
            provider,
            encoder,
            phrase_store,
            dense,
            hybrid,
            orchestrator,
            preload_report: Arc::new(RwLock::new(HashMap::new())),
        })
    }
}
