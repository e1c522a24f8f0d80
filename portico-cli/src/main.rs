//! # portico CLI
//!
//! Command-line interface for the portico object adapter runtime.

mod commands;
mod demo;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "portico")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "portico.yml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the proxies every configured adapter would hand out
    Proxies {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Dispatch a request to demo servants through an adapter
    Dispatch {
        /// Adapter name (configured in portico.yml, or empty for anonymous)
        adapter: String,

        /// Target identity, `category/name`
        identity: String,

        /// Target facet
        #[arg(long, default_value = "")]
        facet: String,

        /// Operation name
        #[arg(long, default_value = "echo")]
        operation: String,

        /// Request payload
        #[arg(long, default_value = "")]
        payload: String,

        /// Register a demo servant locator for this category
        #[arg(long)]
        locator: Option<String>,

        /// Number of concurrent dispatches
        #[arg(long, default_value_t = 1)]
        repeat: usize,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(if cli.verbose {
                tracing::Level::DEBUG.into()
            } else {
                tracing::Level::INFO.into()
            }),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Proxies { json } => commands::show_proxies(&cli.config, json),
        Commands::Dispatch {
            adapter,
            identity,
            facet,
            operation,
            payload,
            locator,
            repeat,
            json,
        } => {
            let opts = commands::DispatchOptions {
                adapter,
                identity,
                facet,
                operation,
                payload,
                locator,
                repeat,
                json,
            };
            commands::run_dispatch(&cli.config, opts).await
        }
    }
}
