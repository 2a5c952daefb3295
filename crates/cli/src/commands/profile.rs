//! `medassist profile` — Extract profile fields from free text.

use medassist_agent::ProfileKind;

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum KindArg {
    /// name, age, location
    Personal,
    /// diagnosis, concern, target
    Medical,
}

impl From<KindArg> for ProfileKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Personal => ProfileKind::Personal,
            KindArg::Medical => ProfileKind::Medical,
        }
    }
}

pub async fn run(kind: KindArg, text: String) -> Result<(), Box<dyn std::error::Error>> {
    let (_, orchestrator) = super::session()?;
    let profile = orchestrator.extract_profile(kind.into(), &text).await?;
    println!("{}", serde_json::to_string_pretty(&profile.fields)?);
    Ok(())
}
