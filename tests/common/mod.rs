// tests/common/mod.rs
// Shared fixtures: an AppState over temp-file SQLite databases with the
// cache, graph store, and LLM left unconfigured so every flow exercises the
// deterministic paths.
#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use serde_json::json;

use showroom::config::{
    Config, DataConfig, DatabaseConfig, DiversificationConfig, EmbeddingConfig, GraphConfig,
    InterviewConfig, LlmConfig, RankingMethod, RecommendationConfig, RedisConfig, ServerConfig,
};
use showroom::data::product::{BookFields, LaptopFields, Product, VehicleFields};
use showroom::state::AppState;

pub fn test_config(dir: &Path) -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            latency_target_ms: 400,
        },
        database: DatabaseConfig {
            products_url: format!("sqlite://{}/products.db", dir.display()),
            vehicles_url: format!("sqlite://{}/vehicles.db", dir.display()),
            max_connections: 2,
            query_timeout_secs: 2,
        },
        redis: RedisConfig {
            url: None,
            default_ttl_secs: 3600,
            timeout_secs: 1,
        },
        graph: GraphConfig {
            url: None,
            user: "neo4j".into(),
            password: String::new(),
            timeout_secs: 1,
        },
        llm: LlmConfig {
            api_key: String::new(),
            base_url: String::new(),
            semantic_parser_model: "gpt-4o-mini".into(),
            question_generator_model: "gpt-4o".into(),
            temperature: 0.0,
            timeout_secs: 1,
        },
        embedding: EmbeddingConfig {
            api_key: String::new(),
            base_url: String::new(),
            model: "all-mpnet-base-v2".into(),
            batch_size: 128,
            timeout_secs: 1,
        },
        interview: InterviewConfig {
            k: 3,
            min_entropy_threshold: 0.3,
            use_entropy_questions: true,
        },
        recommendation: RecommendationConfig {
            method: RankingMethod::CoverageRisk,
            embedding_similarity_lambda_param: 0.85,
            embedding_similarity_cluster_size: 3,
            embedding_similarity_min_similarity: 0.4,
            coverage_risk_lambda_risk: 0.5,
            coverage_risk_mode: "sum".into(),
            coverage_risk_tau: 0.5,
            coverage_risk_alpha: 1.0,
            use_mmr_diversification: true,
            use_progressive_relaxation: true,
        },
        diversification: DiversificationConfig {
            n_rows: 3,
            n_per_row: 3,
            use_entropy_bucketing: true,
        },
        data: DataConfig {
            vector_index_dir: format!("{}/vector", dir.display()),
            phrase_embeddings_dir: format!("{}/phrases", dir.display()),
            index_version: "v1".into(),
        },
        log_filter: "showroom=warn".into(),
    }
}

pub async fn test_state(dir: &Path) -> Arc<AppState> {
    Arc::new(AppState::new(test_config(dir)).await.expect("test state"))
}

pub fn laptop(id: &str, name: &str, brand: Option<&str>, subcategory: Option<&str>, price_cents: i64) -> Product {
    Product {
        id: id.into(),
        name: name.into(),
        brand: brand.map(String::from),
        category: Some("Electronics".into()),
        subcategory: subcategory.map(String::from),
        price_cents: Some(price_cents),
        available_qty: Some(5),
        laptop: Some(LaptopFields {
            processor: Some("Core i7".into()),
            ram_gb: Some(16),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn book(id: &str, name: &str, genre: &str, price_cents: i64) -> Product {
    Product {
        id: id.into(),
        name: name.into(),
        brand: Some("Publisher".into()),
        category: Some("Books".into()),
        subcategory: Some(genre.into()),
        price_cents: Some(price_cents),
        available_qty: Some(9),
        book: Some(BookFields {
            author: Some("A. Author".into()),
            genre: Some(genre.into()),
            pages: Some(320),
            format: Some("Paperback".into()),
        }),
        ..Default::default()
    }
}

pub fn vehicle(vin: &str, make: &str, model: &str, year: i64, body: &str, price: i64) -> Product {
    Product {
        id: vin.into(),
        name: format!("{year} {make} {model}"),
        category: Some("Vehicles".into()),
        vehicle: Some(VehicleFields {
            make: Some(make.into()),
            model: Some(model.into()),
            year: Some(year),
            body_style: Some(body.into()),
            fuel_type: Some("Gasoline".into()),
            price: Some(price),
            mileage: Some(20_000),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub async fn seed_catalog(state: &AppState) {
    let products = vec![
        laptop("lp-dell-1", "Dell XPS 15 Laptop", Some("Dell"), Some("Gaming"), 139_900),
        laptop("lp-dell-2", "Dell Inspiron Laptop", Some("Dell"), Some("Work"), 89_900),
        laptop("lp-asus", "ASUS ROG Gaming Laptop", Some("ASUS"), Some("Gaming"), 149_900),
        laptop("lp-mac", "MacBook Air Laptop", None, None, 119_900),
        book("bk-1", "The Long Voyage", "Fiction", 1550),
        book("bk-2", "Murder at Noon", "Mystery", 1299),
    ];
    for product in &products {
        state.products.upsert(product).await.unwrap();
    }
}

pub async fn seed_vehicles(state: &AppState) {
    let vehicles = vec![
        vehicle("VIN-CRV", "Honda", "CR-V", 2022, "SUV", 29_000),
        vehicle("VIN-RAV", "Toyota", "RAV4", 2021, "SUV", 31_000),
        vehicle("VIN-PIL", "Honda", "Pilot", 2020, "SUV", 33_000),
        vehicle("VIN-CIV", "Honda", "Civic", 2021, "Sedan", 22_000),
        vehicle("VIN-F15", "Ford", "F-150", 2023, "Truck", 45_000),
    ];
    for v in &vehicles {
        state.vehicles.insert(v).await.unwrap();
    }
}

/// Prime phrase records + encoder vectors so coverage-risk ranks without a
/// network. 2-dimensional embedding space: axis 0 = roominess, axis 1 = fuel
/// economy; negative axis 1 = reliability complaints.
pub async fn seed_phrase_alignment(state: &AppState) {
    use showroom::embedding::VehiclePhrases;

    state.encoder.prime("spacious", vec![1.0, 0.0]).await;
    state.encoder.prime("fuel efficient", vec![0.0, 1.0]).await;
    state.encoder.prime("poor reliability", vec![0.0, -1.0]).await;

    let record = |make: &str, model: &str, year: i64, pros: Vec<(&str, Vec<f32>)>, cons: Vec<(&str, Vec<f32>)>| {
        VehiclePhrases {
            make: make.into(),
            model: model.into(),
            year,
            pros_phrases: pros.iter().map(|(t, _)| t.to_string()).collect(),
            cons_phrases: cons.iter().map(|(t, _)| t.to_string()).collect(),
            pros_embeddings: pros.into_iter().map(|(_, e)| e).collect(),
            cons_embeddings: cons.into_iter().map(|(_, e)| e).collect(),
            imputed: false,
        }
    };

    // CR-V: strong on both liked axes, clean cons
    state.phrase_store.insert_record(record(
        "Honda",
        "CR-V",
        2022,
        vec![("roomy cabin", vec![1.0, 0.0]), ("great mpg", vec![0.0, 1.0])],
        vec![("firm ride", vec![0.7, 0.7])],
    ));
    // RAV4: covers one axis
    state.phrase_store.insert_record(record(
        "Toyota",
        "RAV4",
        2021,
        vec![("good mileage", vec![0.0, 1.0])],
        vec![("road noise", vec![0.7, 0.7])],
    ));
    // Pilot: weak alignment and a reliability complaint
    state.phrase_store.insert_record(record(
        "Honda",
        "Pilot",
        2020,
        vec![("decent space", vec![0.6, 0.0])],
        vec![("breaks down often", vec![0.0, -1.0])],
    ));
}

pub fn filters(pairs: &[(&str, serde_json::Value)]) -> showroom::data::product::FilterMap {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

#[allow(dead_code)]
pub fn json_str(v: &str) -> serde_json::Value {
    json!(v)
}
