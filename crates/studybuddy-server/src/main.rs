//! studybuddy CLI: serves the HTTP API and manages local configuration.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "studybuddy", version, about = "AI study assistant service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Address to bind (overrides config)
        #[arg(long)]
        bind: Option<String>,

        /// Course catalog TOML (overrides config)
        #[arg(long)]
        catalog: Option<PathBuf>,
    },

    /// Validate a course catalog
    CheckCatalog {
        /// Path to the catalog TOML
        #[arg(long)]
        catalog: PathBuf,
    },

    /// List available models
    ListModels {
        /// Filter to specific provider
        #[arg(long)]
        provider: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create starter config and course catalog
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("studybuddy=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve {
            config,
            bind,
            catalog,
        } => commands::serve::execute(config, bind, catalog).await,
        Commands::CheckCatalog { catalog } => commands::check_catalog::execute(catalog),
        Commands::ListModels { provider, config } => {
            commands::list_models::execute(provider, config).await
        }
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
