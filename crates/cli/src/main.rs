//! Persona CLI: the main entry point.
//!
//! Commands:
//! - `chat`        Ask the assistant a question on behalf of an owner
//! - `credential`  Store, inspect, revalidate or remove an owner's API key
//! - `knowledge`   Search the knowledge corpus or show its statistics
//! - `health`      Probe the primary model and print generation health
//! - `config`      Print the default configuration
//! - `status`      Show configuration status

use clap::{Parser, Subcommand};

mod commands;
mod runtime;

#[derive(Parser)]
#[command(
    name = "persona",
    about = "Persona: AI response orchestration for a personal site assistant",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask the assistant a question
    Chat {
        /// Owner whose stored credential pays for the request
        #[arg(short = 'u', long)]
        owner: String,

        /// The question
        #[arg(short, long)]
        message: String,

        /// Print tokens as they arrive
        #[arg(long)]
        stream: bool,

        /// Print the structured outcome as JSON
        #[arg(long, conflicts_with = "stream")]
        json: bool,
    },

    /// Manage an owner's API credential
    Credential {
        #[command(subcommand)]
        action: CredentialCommand,
    },

    /// Query the knowledge store
    Knowledge {
        #[command(subcommand)]
        action: KnowledgeCommand,
    },

    /// Probe the primary model and show health counters
    Health {
        /// Probe with this owner's credential instead of the service key
        #[arg(short = 'u', long)]
        owner: Option<String>,
    },

    /// Print the default configuration TOML
    Config {
        /// Print the config file location instead
        #[arg(long)]
        path: bool,
    },

    /// Show configuration status
    Status,
}

#[derive(Subcommand)]
enum CredentialCommand {
    /// Encrypt, validate and store a key
    Set {
        #[arg(short = 'u', long)]
        owner: String,

        /// The raw API key
        #[arg(short, long, env = "PERSONA_OWNER_KEY", hide_env_values = true)]
        key: String,
    },
    /// Show whether a usable key is on file
    Status {
        #[arg(short = 'u', long)]
        owner: String,
    },
    /// Re-check the stored key against the provider
    Revalidate {
        #[arg(short = 'u', long)]
        owner: String,
    },
    /// Delete the stored key
    Remove {
        #[arg(short = 'u', long)]
        owner: String,
    },
}

#[derive(Subcommand)]
enum KnowledgeCommand {
    /// Rank documents by similarity to a query
    Search {
        query: String,

        #[arg(short, long, default_value_t = 3)]
        limit: usize,
    },
    /// Show document counts and summaries
    Stats,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Chat {
            owner,
            message,
            stream,
            json,
        } => commands::chat::run(&owner, &message, stream, json).await?,
        Commands::Credential { action } => match action {
            CredentialCommand::Set { owner, key } => commands::credential::set(&owner, key).await?,
            CredentialCommand::Status { owner } => commands::credential::status(&owner).await?,
            CredentialCommand::Revalidate { owner } => {
                commands::credential::revalidate(&owner).await?
            }
            CredentialCommand::Remove { owner } => commands::credential::remove(&owner).await?,
        },
        Commands::Knowledge { action } => match action {
            KnowledgeCommand::Search { query, limit } => {
                commands::knowledge::search(&query, limit).await?
            }
            KnowledgeCommand::Stats => commands::knowledge::stats().await?,
        },
        Commands::Health { owner } => commands::health::run(owner.as_deref()).await?,
        Commands::Config { path } => {
            if path {
                commands::config_cmd::path()
            } else {
                commands::config_cmd::show()
            }
        }
        Commands::Status => commands::status::run().await?,
    }

    Ok(())
}
