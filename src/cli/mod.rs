//! Command-line interface parsing and handling
//!
//! Parses arguments, loads configuration and dispatches to the chat loop or
//! one of the one-shot commands.

pub mod init_config;
pub mod say;
pub mod tools;

use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use crate::cli::init_config::init_config;
use crate::cli::say::run_say;
use crate::cli::tools::list_tools;
use crate::core::config::Config;
use crate::ui::chat_loop::run_chat;
use crate::utils::logging::init_tracing;

const VERSION: &str = match option_env!("VERGEN_GIT_DESCRIBE") {
    Some(describe) => describe,
    None => env!("CARGO_PKG_VERSION"),
};

#[derive(Parser, Debug)]
#[command(name = "repolens")]
#[command(version = VERSION)]
#[command(about = "Ask questions about your GitHub repositories from the terminal")]
#[command(
    long_about = "repolens answers questions about GitHub repositories by letting a language \
model call the read-only tools of a GitHub MCP server. The server is started as a child \
process and spoken to over stdio.\n\n\
Environment Variables:\n\
  GITHUB_ACCESS_TOKEN   GitHub token handed to the tool server (required)\n\
  OPENAI_API_KEY        API key for the chat completions endpoint (required)\n\
  RUST_LOG              Override the log filter\n\n\
Type 'exit', 'quit', or 'q' to leave the chat."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Read configuration from this file instead of the default location
    #[arg(short = 'c', long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Write diagnostic logs to this file
    #[arg(short = 'l', long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Model to use instead of the configured one
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Start the interactive chat (default)
    Chat,
    /// Ask a single question and print the answer
    Say {
        /// The question to ask
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
    },
    /// List the tools the GitHub MCP server offers and whether they are permitted
    Tools,
    /// Write a configuration file with the default settings
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(args.log_file.as_deref())?;

    let config_path = Config::resolve_path(args.config.as_deref())?;

    match args.command.unwrap_or(Commands::Chat) {
        Commands::InitConfig { force } => init_config(&config_path, force),
        command => {
            let config = load_config(&config_path, args.model)?;
            match command {
                Commands::Say { prompt } => run_say(config, prompt).await,
                Commands::Tools => list_tools(&config).await,
                _ => run_chat(config).await,
            }
        }
    }
}

fn load_config(path: &Path, model_override: Option<String>) -> Result<Config, Box<dyn Error>> {
    let mut config = Config::load_from_path(path)?;
    if let Some(model) = model_override.filter(|model| !model.trim().is_empty()) {
        config.model.model = model;
    }
    Ok(config)
}
