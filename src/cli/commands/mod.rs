//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod analyze;
mod config_cmd;
mod llm;
mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use textdigest::analysis::ExecutionStrategy;
use textdigest::config::{load_settings_with_options, LoadOptions};

#[derive(Parser)]
#[command(name = "digest")]
#[command(about = "Summarize, extract key points from and classify the sentiment of text files")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Storage root that source references resolve inside (overrides config file)
    #[arg(long, short = 's', global = true, env = "DIGEST_STORAGE_DIR")]
    storage: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Address to bind: PORT, HOST, or HOST:PORT (default from config, else 127.0.0.1:3030)
        bind: Option<String>,
    },

    /// Analyze one text file and print the result
    Analyze {
        /// Path relative to the storage root (default source if omitted)
        path: Option<String>,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
        /// Do not write a report file
        #[arg(long)]
        no_save: bool,
        /// Stage scheduling (overrides config)
        #[arg(long, value_enum)]
        strategy: Option<ExecutionStrategy>,
    },

    /// Show LLM configuration and installed models
    LlmModels,

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        storage_dir: cli.storage,
    };
    let (settings, config) = load_settings_with_options(options).await?;

    match cli.command {
        Commands::Serve { bind } => {
            serve::cmd_serve(&settings, bind.as_deref().unwrap_or(&settings.bind)).await
        }
        Commands::Analyze {
            path,
            json,
            no_save,
            strategy,
        } => analyze::cmd_analyze(&settings, path.as_deref(), json, no_save, strategy).await,
        Commands::LlmModels => llm::cmd_llm_models(&settings).await,
        Commands::Config { command } => match command {
            ConfigCommands::Show => config_cmd::cmd_config_show(&settings, &config),
        },
    }
}
