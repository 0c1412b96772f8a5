// src/bin/demo.rs
// Interactive CLI demo: chat with the orchestrator from stdin and print
// questions, quick replies, and bucketed recommendation grids.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use showroom::api::types::{ChatRequest, ResponseType};
use showroom::config::Config;
use showroom::preload::preload_all;
use showroom::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "showroom-demo", about = "Interactive recommendation demo")]
struct Args {
    /// Max interview questions before recommendations
    #[arg(short, default_value_t = 3)]
    k: usize,

    /// Recommendation grid rows
    #[arg(long, default_value_t = 3)]
    n_rows: usize,

    /// Products per grid row
    #[arg(long, default_value_t = 3)]
    n_per_row: usize,

    /// Ranking method: coverage_risk or embedding_similarity
    #[arg(long)]
    method: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("showroom=warn"))
        .init();

    let state = match AppState::new(config).await {
        Ok(state) => Arc::new(state),
        Err(e) => {
            eprintln!("startup failed: {e}");
            std::process::exit(1);
        }
    };
    preload_all(&state).await;

    println!("showroom demo - type a message, or 'quit' to exit");
    println!("(k={}, grid {}x{})", args.k, args.n_rows, args.n_per_row);

    let stdin = io::stdin();
    let mut session_id: Option<String> = None;

    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if matches!(message, "quit" | "exit" | "q") {
            break;
        }

        let request = ChatRequest {
            message: message.to_string(),
            session_id: session_id.clone(),
            k: Some(args.k),
            n_rows: Some(args.n_rows),
            n_per_row: Some(args.n_per_row),
            method: args.method.clone(),
        };

        match state.orchestrator.chat(&request).await {
            Ok(reply) => {
                session_id = Some(reply.session_id.clone());
                println!("\n{}", reply.message);

                if reply.response_type == ResponseType::Question {
                    if let Some(quick_replies) = &reply.quick_replies {
                        if !quick_replies.is_empty() {
                            println!("  [{}]", quick_replies.join(" | "));
                        }
                    }
                }

                if let (Some(grid), Some(labels)) = (&reply.recommendations, &reply.bucket_labels) {
                    if let Some(dimension) = &reply.diversification_dimension {
                        println!("  (grouped by {dimension})");
                    }
                    for (row, label) in grid.iter().zip(labels) {
                        if row.is_empty() {
                            continue;
                        }
                        println!("\n  == {label} ==");
                        for product in row {
                            let price = product.display_price().unwrap_or_default();
                            println!("   - {} {}", product.name, price);
                        }
                    }
                }
                println!();
            }
            Err(e) => println!("error: {e}\n"),
        }
    }

    println!("bye");
    Ok(())
}
