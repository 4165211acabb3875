use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about = "Semantic search over a personal quote archive", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Quote archive (JSON), overrides config
    #[clap(long, global = true)]
    pub quotes: Option<PathBuf>,

    /// Embedding matrix (.npy), overrides config
    #[clap(long, global = true)]
    pub embeddings: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the HTTP service.
    Serve {
        /// Address to listen on, overrides config
        #[clap(short, long)]
        listen: Option<SocketAddr>,
    },

    /// Run a single search and print the result as JSON
    Search {
        /// Free text query
        query: String,

        /// Number of results
        #[clap(short = 'k', long)]
        top_k: Option<usize>,

        /// Minimum similarity of returned quotes
        #[clap(short, long, allow_hyphen_values = true)]
        threshold: Option<f32>,
    },

    /// Print corpus statistics as JSON
    Stats {},
}
