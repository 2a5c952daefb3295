//! MedAssist CLI — the main entry point.
//!
//! Commands:
//! - `onboard`  — Write a default config
//! - `ask`      — Answer a single question
//! - `chat`     — Interactive session with history
//! - `analyze`  — Nutritional assessment of a food photo
//! - `profile`  — Extract personal or medical profile fields
//! - `doctor`   — Diagnose configuration and provider health

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "medassist",
    about = "MedAssist — medical information assistant",
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
    /// Initialize configuration
    Onboard,

    /// Ask a single question
    Ask {
        /// The question to ask
        query: String,

        /// Persona to answer as (glp1, general_med)
        #[arg(short, long)]
        persona: Option<String>,

        /// Print the answer as it is generated
        #[arg(short, long)]
        stream: bool,

        /// Print the full result record as JSON
        #[arg(long, conflicts_with = "stream")]
        json: bool,
    },

    /// Start an interactive chat session
    Chat {
        /// Persona to start with
        #[arg(short, long)]
        persona: Option<String>,
    },

    /// Analyze a food photo
    Analyze {
        /// Path to a JPEG, PNG, WebP or GIF image
        image: std::path::PathBuf,
    },

    /// Extract profile fields from free text
    Profile {
        #[arg(value_enum)]
        kind: commands::profile::KindArg,

        /// Text to extract from
        text: String,
    },

    /// Diagnose configuration and provider health
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Ask {
            query,
            persona,
            stream,
            json,
        } => commands::ask::run(query, persona, stream, json).await?,
        Commands::Chat { persona } => commands::chat::run(persona).await?,
        Commands::Analyze { image } => commands::analyze::run(image).await?,
        Commands::Profile { kind, text } => commands::profile::run(kind, text).await?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
