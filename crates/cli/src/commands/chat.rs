//! `medassist chat` — Interactive session.
//!
//! Every line is answered as a stream. Slash commands inspect or reset the
//! session: `/history`, `/clear`, `/persona [id]`, `/help`.

use std::io::Write;

use medassist_agent::Orchestrator;
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run(persona: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let (config, orchestrator) = super::session()?;

    if let Some(id) = persona {
        orchestrator.set_persona(&id).await?;
    }

    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║        MedAssist — Interactive Session       ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Persona:   {}", orchestrator.active_persona().await);
    println!(
        "  Model:     {}/{}",
        config.answering.provider, config.answering.model
    );
    println!("  History:   last {} exchanges", config.history.max_entries);
    println!();
    println!("  Type your question and press Enter.");
    println!("  Type /help for commands, 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    prompt()?;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();

        match line {
            "" => {}
            "exit" | "quit" => break,
            _ if line.starts_with('/') => slash_command(&orchestrator, line).await,
            _ => {
                println!();
                print!("  Assistant > ");
                std::io::stdout().flush()?;
                let chunks = orchestrator.ask_stream(line, None).await;
                super::print_stream(chunks).await?;
                println!();
            }
        }

        prompt()?;
    }

    println!();
    println!("  Goodbye! Take care.");
    println!();

    Ok(())
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}

async fn slash_command(orchestrator: &Orchestrator, line: &str) {
    let mut parts = line.split_whitespace();
    let command = parts.next().unwrap_or_default();
    let argument = parts.next();

    match (command, argument) {
        ("/history", _) => {
            let history = orchestrator.history().await;
            if history.is_empty() {
                println!("  (no exchanges yet)");
            }
            for (i, exchange) in history.iter().enumerate() {
                println!(
                    "  [{}] {} ({})",
                    i + 1,
                    exchange.timestamp().format("%Y-%m-%d %H:%M:%S"),
                    exchange
                        .persona()
                        .map(|p| p.as_str())
                        .unwrap_or("unknown")
                );
                println!("      Q: {}", exchange.query());
                println!("      A: {}", first_line(exchange.response()));
            }
        }
        ("/clear", _) => {
            orchestrator.clear_history().await;
            println!("  History cleared.");
        }
        ("/persona", None) => {
            println!("  Active persona: {}", orchestrator.active_persona().await);
            for persona in orchestrator.registry().list() {
                println!("    {:<12} {}", persona.id.as_str(), persona.scope);
            }
        }
        ("/persona", Some(id)) => match orchestrator.set_persona(id).await {
            Ok(persona) => println!("  Switched to {persona}."),
            Err(e) => eprintln!("  [Error] {e}"),
        },
        ("/help", _) => {
            println!("  /history        Show recent exchanges");
            println!("  /clear          Clear the history");
            println!("  /persona [id]   Show or switch persona");
            println!("  exit            Quit");
        }
        _ => eprintln!("  Unknown command: {command}. Type /help."),
    }
}

fn first_line(text: &str) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() > 100 {
        format!("{}…", line.chars().take(100).collect::<String>())
    } else {
        line.to_string()
    }
}
