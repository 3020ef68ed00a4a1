//! Weft CLI
//!
//! Reports, validates and transforms JSON/YAML documents against a schema.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

/// Weft - schema reports and document merges
#[derive(Parser)]
#[command(name = "weft")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Engine configuration file path
    #[arg(short, long, env = "WEFT_CONFIG")]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every violation in a document as JSON
    Report {
        /// Schema file (JSON, or YAML for .yaml/.yml)
        schema: String,

        /// Document to check
        document: String,
    },

    /// Check a document and print the first violation
    Validate {
        /// Schema file (JSON, or YAML for .yaml/.yml)
        schema: String,

        /// Document to check
        document: String,
    },

    /// Merge a source document into a target and print the result
    Transform {
        /// Schema file (JSON, or YAML for .yaml/.yml)
        schema: String,

        /// Source document
        source: String,

        /// Target document to merge into
        #[arg(short, long)]
        target: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Report { schema, document } => {
            commands::report::run(&schema, &document, config).await?;
        }
        Commands::Validate { schema, document } => {
            commands::validate::run(&schema, &document, config).await?;
        }
        Commands::Transform {
            schema,
            source,
            target,
        } => {
            commands::transform::run(&schema, &source, target.as_deref(), config).await?;
        }
    }

    Ok(())
}
