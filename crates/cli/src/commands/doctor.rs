//! `medassist doctor` — Diagnose configuration and provider health.

use medassist_config::AppConfig;
use medassist_providers::build_from_config;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 MedAssist Doctor — System Diagnostics");
    println!("========================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("  ✅ Config file found");
    } else {
        println!("  ⚠️  No config file — using defaults (run `medassist onboard`)");
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Configuration valid");
            config
        }
        Err(e) => {
            println!("  ❌ Configuration invalid: {e}");
            println!("\n  ⚠️  1 issue found. Fix the config and re-run.");
            return Ok(());
        }
    };

    let roles = [
        ("answering", &config.answering),
        ("classifier", &config.classifier),
        ("vision", &config.vision),
    ];
    for (role, model) in roles {
        if model.provider == "ollama" || config.api_key(&model.provider).is_some() {
            println!("  ✅ {role}: {}/{} (key configured)", model.provider, model.model);
        } else {
            println!("  ❌ {role}: {}/{} — no API key", model.provider, model.model);
            issues += 1;
        }
    }

    println!();
    let router = build_from_config(&config);
    for name in router.list() {
        let Some(provider) = router.get(name) else {
            continue;
        };
        match provider.health_check().await {
            Ok(true) => println!("  ✅ {name} reachable"),
            Ok(false) => {
                println!("  ❌ {name} responded with an error status");
                issues += 1;
            }
            Err(e) => {
                println!("  ❌ {name} unreachable: {e}");
                issues += 1;
            }
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
