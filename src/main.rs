use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod app;
mod cli;
mod config;
mod corpus;
mod semantic;
#[cfg(test)]
mod tests;
mod web;

use config::Config;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Paths given on the command line are relative to the working directory,
/// not to the config base path.
fn absolute(path: &Path) -> anyhow::Result<String> {
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    Ok(path.to_string_lossy().into_owned())
}

fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();

    init_logging();

    let base_path = app::get_base_path()?;
    let mut config = Config::load_with(&base_path)
        .with_context(|| format!("Failed to load config from {}", base_path.display()))?;

    if let Some(quotes) = &args.quotes {
        config.quotes_path = absolute(quotes)?;
    }
    if let Some(embeddings) = &args.embeddings {
        config.embeddings_path = absolute(embeddings)?;
    }

    match args.command {
        cli::Command::Serve { listen } => {
            let addr = match listen {
                Some(addr) => addr,
                None => config.listen_addr.parse()?,
            };

            let engine = Arc::new(app::create_engine(&config)?);
            let state = web::SharedState::new(engine, &config);

            web::start_daemon(state, addr)
        }

        cli::Command::Search {
            query,
            top_k,
            threshold,
        } => {
            let engine = app::create_engine(&config)?;

            let top_k = top_k.unwrap_or(config.search.default_top_k);
            let threshold = threshold.unwrap_or(config.search.default_threshold);
            let results = engine.search(&query, top_k, threshold)?;

            let response = web::SearchResponse {
                count: results.len(),
                query,
                results,
            };
            println!("{}", serde_json::to_string_pretty(&response)?);

            Ok(())
        }

        cli::Command::Stats {} => {
            let corpus = app::load_corpus(&config)?;

            let model = semantic::EmbeddingModel::canonical_name(&config.model)?;

            let response = web::StatsResponse::new(corpus.stats(), model);
            println!("{}", serde_json::to_string_pretty(&response)?);

            Ok(())
        }
    }
}
