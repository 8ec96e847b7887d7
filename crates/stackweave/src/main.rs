mod commands;
mod utils;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "weave")]
#[command(about = "Declare a multi-region stack. Provision it as a graph.", long_about = None)]
struct Cli {
    /// Stack file (searched for when omitted)
    #[arg(short = 'f', long = "file", global = true)]
    file: Option<PathBuf>,

    /// Print debug logs
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse the stack and build its dependency graph
    Validate,
    /// Show what a run would create or adopt
    Plan {
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
        /// Region hosting edge certificates
        #[arg(long, env = "STACKWEAVE_EDGE_REGION")]
        edge_region: Option<String>,
    },
    /// Provision the stack
    Apply {
        /// Run against the in-memory provider
        #[arg(long)]
        simulate: bool,
        /// Print the execution report as JSON
        #[arg(long)]
        json: bool,
        /// Maximum number of nodes provisioning at once
        #[arg(long, env = "STACKWEAVE_MAX_CONCURRENCY")]
        max_concurrency: Option<usize>,
        /// Region hosting edge certificates
        #[arg(long, env = "STACKWEAVE_EDGE_REGION")]
        edge_region: Option<String>,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins unless --verbose asks for more
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) if cli.verbose => filter.add_directive(tracing::Level::DEBUG.into()),
        Ok(filter) => filter,
        Err(_) if cli.verbose => tracing_subscriber::EnvFilter::new("debug"),
        Err(_) => tracing_subscriber::EnvFilter::new("warn"),
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    match cli.command {
        Commands::Version => {
            println!("stackweave {}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Validate => {
            commands::validate::handle(cli.file).await?;
        }
        Commands::Plan { json, edge_region } => {
            commands::plan::handle(cli.file, edge_region, json).await?;
        }
        Commands::Apply {
            simulate,
            json,
            max_concurrency,
            edge_region,
        } => {
            commands::apply::handle(commands::apply::ApplyArgs {
                file: cli.file,
                simulate,
                json,
                max_concurrency,
                edge_region,
            })
            .await?;
        }
    }

    Ok(())
}
