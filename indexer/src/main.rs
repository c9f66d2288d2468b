use anyhow::Result;
use clap::{Parser, Subcommand};
use kbsearch_core::DEFAULT_LIMIT;
use kbsearch_indexer::{build_snapshot, corpus_stats, render_json, render_table, run_query};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "kbsearch-indexer")]
#[command(about = "Snapshot and probe a knowledge base with the TF-IDF engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Consolidate JSON/JSONL records into a snapshot directory
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Output snapshot directory
        #[arg(long)]
        output: String,
    },
    /// Replay records into a fresh engine and print raw scores for a query
    Query {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Query text
        #[arg(long)]
        q: String,
        /// Maximum number of matches
        #[arg(long, default_value_t = DEFAULT_LIMIT)]
        k: usize,
        /// Emit results as JSON instead of a table
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Report corpus size and vocabulary
    Stats {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output } => {
            build_snapshot(&input, &output)?;
        }
        Commands::Query { input, q, k, json } => {
            let rows = run_query(&input, &q, k)?;
            if json {
                println!("{}", render_json(&rows)?);
            } else {
                print!("{}", render_table(&rows));
            }
        }
        Commands::Stats { input } => {
            let stats = corpus_stats(&input)?;
            println!("documents: {}", stats.documents);
            println!("vocabulary: {}", stats.vocabulary);
        }
    }
    Ok(())
}
