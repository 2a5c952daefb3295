//! Provider router — builds the configured providers and looks them up
//! by name for each role (answering, classification, vision).

use medassist_config::AppConfig;
use medassist_core::provider::Provider;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::openai_compat::OpenAiCompatProvider;

/// Holds one provider instance per configured provider name.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRouter {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Register a provider.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Get a specific provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// List all registered provider names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ProviderRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// Build providers from configuration.
///
/// Every provider referenced by a model role is registered even when it
/// has no `[providers.*]` table, so a missing key surfaces as an
/// authentication failure at call time rather than a startup panic.
pub fn build_from_config(config: &AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new();

    let mut names: Vec<&str> = config.providers.keys().map(|s| s.as_str()).collect();
    for role in [&config.answering, &config.classifier, &config.vision] {
        if !names.contains(&role.provider.as_str()) {
            names.push(role.provider.as_str());
        }
    }

    for name in names {
        let api_key = config.api_key(name).unwrap_or_default();
        let base_url = config
            .providers
            .get(name)
            .and_then(|p| p.api_url.clone())
            .unwrap_or_else(|| default_base_url(name));

        debug!(provider = %name, base_url = %base_url, "Registering provider");

        let provider = OpenAiCompatProvider::new(name, &base_url, api_key)
            .with_stream_usage(name != "perplexity");
        router.register(name, Arc::new(provider));
    }

    router
}

/// Get the default base URL for well-known providers.
pub fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "perplexity" => "https://api.perplexity.ai".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn router_register_and_lookup() {
        let mut router = ProviderRouter::new();
        router.register("openai", Arc::new(OpenAiCompatProvider::openai("sk-test")));

        assert!(router.get("openai").is_some());
        assert!(router.get("nonexistent").is_none());
        assert_eq!(router.list(), vec!["openai"]);
    }

    #[test]
    fn default_base_urls() {
        assert_eq!(default_base_url("perplexity"), "https://api.perplexity.ai");
        assert!(default_base_url("openai").contains("api.openai.com"));
        assert!(default_base_url("ollama").contains("localhost:11434"));
    }

    #[test]
    fn build_from_default_config_registers_every_role() {
        let config = AppConfig::default();
        let router = build_from_config(&config);
        assert!(router.get(&config.answering.provider).is_some());
        assert!(router.get(&config.classifier.provider).is_some());
        assert!(router.get(&config.vision.provider).is_some());
    }

    #[test]
    fn configured_url_overrides_default() {
        let mut config = AppConfig::default();
        config.providers.insert(
            "ollama".into(),
            medassist_config::ProviderConfig {
                api_key: None,
                api_url: Some("http://gpu-box:11434/v1".into()),
            },
        );
        let router = build_from_config(&config);
        assert!(router.list().contains(&"ollama"));
    }
}
