//! `medassist analyze` — Nutritional assessment of a food photo.

use std::path::{Path, PathBuf};

use medassist_agent::ImageAnalysisResponse;

pub async fn run(image: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let mime_type = mime_type_for(&image)
        .ok_or_else(|| format!("Unsupported image type: {}", image.display()))?;
    let bytes = tokio::fs::read(&image)
        .await
        .map_err(|e| format!("Failed to read {}: {e}", image.display()))?;

    let (_, orchestrator) = super::session()?;

    eprint!("  Analyzing...");
    let response = orchestrator.analyze_image(bytes, mime_type).await;
    eprint!("\r               \r");

    match response {
        ImageAnalysisResponse::Success(analysis) => {
            let category = analysis
                .category
                .map(|c| c.label())
                .unwrap_or("(not recognised)");
            println!("  Category:   {category}");
            println!("  Confidence: {:.0}%", analysis.confidence);
            println!();
            println!("{}", analysis.body);
            if !analysis.is_complete() {
                println!();
                println!("  ⚠️  The model's answer was only partially structured.");
            }
            Ok(())
        }
        ImageAnalysisResponse::Error(error) => Err(error.message.into()),
    }
}

/// MIME type from the file extension.
fn mime_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}
