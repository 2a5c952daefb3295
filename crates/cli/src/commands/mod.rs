//! Subcommand implementations and the session wiring they share.

pub mod analyze;
pub mod ask;
pub mod chat;
pub mod doctor;
pub mod onboard;
pub mod profile;

use std::io::Write;

use futures::StreamExt;
use medassist_agent::{ChunkStream, Collaborators, Orchestrator, StreamChunk};
use medassist_config::AppConfig;
use medassist_providers::build_from_config;

/// Load config, build the providers and create a session orchestrator.
pub fn session() -> Result<(AppConfig, Orchestrator), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    warn_missing_keys(&config);

    let router = build_from_config(&config);
    let role = |name: &str| {
        router
            .get(name)
            .ok_or_else(|| format!("Provider '{name}' is not configured"))
    };
    let collaborators = Collaborators {
        answering: role(&config.answering.provider)?,
        classification: role(&config.classifier.provider)?,
        vision: role(&config.vision.provider)?,
    };

    let orchestrator = Orchestrator::from_config(collaborators, &config)?;
    tracing::debug!(
        answering = %config.answering.provider,
        classifier = %config.classifier.provider,
        vision = %config.vision.provider,
        "Session ready"
    );
    Ok((config, orchestrator))
}

fn warn_missing_keys(config: &AppConfig) {
    let mut providers = vec![
        config.answering.provider.as_str(),
        config.classifier.provider.as_str(),
        config.vision.provider.as_str(),
    ];
    providers.sort_unstable();
    providers.dedup();

    for provider in providers {
        if provider != "ollama" && config.api_key(provider).is_none() {
            eprintln!("  ⚠️  No API key for provider '{provider}'.");
            match provider {
                "perplexity" => eprintln!("     Set PPLX_API_KEY or PERPLEXITY_API_KEY."),
                "openai" => eprintln!("     Set OPENAI_API_KEY."),
                _ => {}
            }
            eprintln!(
                "     Or add it to {}",
                AppConfig::config_dir().join("config.toml").display()
            );
        }
    }
}

/// Print a chunk stream as it arrives. Returns `false` if it ended in failure.
pub async fn print_stream(mut chunks: ChunkStream) -> Result<bool, Box<dyn std::error::Error>> {
    let mut stdout = std::io::stdout();
    let mut printed_partial = false;

    while let Some(chunk) = chunks.next().await {
        match chunk {
            StreamChunk::Partial { content } => {
                print!("{content}");
                stdout.flush()?;
                printed_partial = true;
            }
            StreamChunk::Complete { content, metadata } => {
                if !printed_partial {
                    print!("{content}");
                }
                println!();
                if metadata.route.is_answer() {
                    if let Some(disclaimer) = metadata.disclaimer {
                        println!("\n  ⚕️  {disclaimer}");
                    }
                }
                return Ok(true);
            }
            StreamChunk::Failed { error } => {
                if printed_partial {
                    println!();
                }
                eprintln!("  [Error] {}", error.message);
                return Ok(false);
            }
        }
    }

    Ok(false)
}
