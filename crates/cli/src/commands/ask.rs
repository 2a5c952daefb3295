//! `medassist ask` — Answer a single question.

use medassist_agent::QueryResponse;

pub async fn run(
    query: String,
    persona: Option<String>,
    stream: bool,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let (_, orchestrator) = super::session()?;

    if stream {
        let chunks = orchestrator.ask_stream(&query, persona.as_deref()).await;
        if !super::print_stream(chunks).await? {
            return Err("The question could not be answered.".into());
        }
        return Ok(());
    }

    eprint!("  Thinking...");
    let response = orchestrator.ask(&query, persona.as_deref()).await;
    eprint!("\r              \r");

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    match response {
        QueryResponse::Success(answer) => {
            println!("{}", answer.response);
            if !answer.metadata.route.is_answer() {
                return Ok(());
            }
            if let Some(disclaimer) = answer.metadata.disclaimer {
                println!("\n  ⚕️  {disclaimer}");
            }
            Ok(())
        }
        QueryResponse::Error(error) => Err(error.message.into()),
    }
}
