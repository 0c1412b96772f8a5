// src/preload.rs
// Startup warm-up: DB probes, dense index, and phrase embeddings load in
// parallel so the first request doesn't pay the cost. Failures are recorded
// (timing -1) but never abort startup; the affected component just reports
// not-ready.

use std::time::Instant;

use tracing::{info, warn};

use crate::state::AppState;

pub async fn preload_all(state: &AppState) {
    info!("Preloading resources...");
    let started = Instant::now();

    let db_task = async {
        let t = Instant::now();
        match state.products.ping().await.and(state.vehicles.ping().await) {
            Ok(_) => t.elapsed().as_secs_f64(),
            Err(e) => {
                warn!("Database preload failed: {}", e);
                -1.0
            }
        }
    };

    let dense_task = async {
        let t = Instant::now();
        match state.dense.load() {
            Ok(count) => {
                info!("Dense index ready ({} products)", count);
                // Warm the encoder path when configured
                if state.encoder.is_available() {
                    let _ = state.dense.encode_text("preload probe").await;
                }
                t.elapsed().as_secs_f64()
            }
            Err(e) => {
                warn!("Dense index preload failed: {}", e);
                -1.0
            }
        }
    };

    let phrase_task = async {
        let t = Instant::now();
        match state.vehicles.all_mmys().await {
            Ok(mmys) => match state.phrase_store.preload(&mmys) {
                Ok(stats) => {
                    info!(
                        "Phrase store ready: {} records ({} imputed, ~{:.1} MB)",
                        stats.total, stats.imputed, stats.approx_mb
                    );
                    t.elapsed().as_secs_f64()
                }
                Err(e) => {
                    warn!("Phrase store preload failed: {}", e);
                    -1.0
                }
            },
            Err(e) => {
                warn!("Could not enumerate vehicle MMYs: {}", e);
                -1.0
            }
        }
    };

    let (db_s, dense_s, phrase_s) = tokio::join!(db_task, dense_task, phrase_task);

    let mut report = state.preload_report.write().await;
    report.insert("database".into(), db_s);
    report.insert("dense_index".into(), dense_s);
    report.insert("phrase_store".into(), phrase_s);
    report.insert("total".into(), started.elapsed().as_secs_f64());

    info!("Preload complete in {:.2}s", started.elapsed().as_secs_f64());
}
