//! Persona Registry — the fixed set of personas and their prompts.

use std::collections::HashMap;

use medassist_config::PersonaOverride;
use medassist_core::error::QueryError;
use medassist_core::persona::{PersonaConfig, PersonaId, ScopeValidation};
use tracing::info;

pub const GLP1_SYSTEM_PROMPT: &str = "You are a specialized medical information assistant focused EXCLUSIVELY on GLP-1 medications (such as Ozempic, Wegovy, Mounjaro, etc.) and healthy eating habits. You must:

1. ONLY provide information about GLP-1 medications and directly related topics, including dietary recommendations
2. For any query not specifically about GLP-1 medications or their direct effects, respond with:
   \"I apologize, but I can only provide information about GLP-1 medications and related topics. Your question appears to be about something else. Please ask a question specifically about GLP-1 medications, their usage, effects, or related concerns.\"

3. For valid GLP-1 queries, structure your response with:
   - An empathetic opening acknowledging the patient's situation
   - Clear, validated medical information about GLP-1 medications
   - Important safety considerations or disclaimers
   - An encouraging closing that reinforces their healthcare journey

4. Provide response in a simple manner that is easy to understand at preferably a 11th grade literacy level with reduced pharmaceutical or medical jargon
5. Always Return sources in a hyperlink format
";

pub const GENERAL_MED_SYSTEM_PROMPT: &str = "You are a careful medical information assistant. You answer general questions about health, symptoms, conditions, treatments, medications and nutrition. You must:

1. Give clear, accurate and balanced information in plain language, at roughly an 11th grade reading level
2. Point out when a symptom or situation needs prompt attention from a doctor or emergency services
3. Never give a diagnosis or change someone's treatment; encourage them to discuss decisions with their healthcare provider
4. Keep answers focused and well structured, and mention reputable sources where possible
";

pub const GENERAL_MED_RELEVANCE_PROMPT: &str = "You decide whether a message is a question about health, medicine, symptoms, conditions, treatments, medications, nutrition or wellbeing. Answer with exactly one word: YES or NO.";

pub const SOURCES_SUFFIX: &str =
    "\n\nPlease include sources for the information provided, formatted as 'Title: URL' on separate lines.";

/// Lookup table from persona id to configuration.
#[derive(Debug, Clone)]
pub struct PersonaRegistry {
    glp1: PersonaConfig,
    general_med: PersonaConfig,
}

impl PersonaRegistry {
    /// The two built-in personas.
    pub fn builtin() -> Self {
        Self {
            glp1: PersonaConfig {
                id: PersonaId::Glp1,
                scope: "GLP-1 medications and related topics".into(),
                system_prompt: GLP1_SYSTEM_PROMPT.into(),
                validation: ScopeValidation::None,
                query_suffix: Some(SOURCES_SUFFIX.into()),
            },
            general_med: PersonaConfig {
                id: PersonaId::GeneralMed,
                scope: "health and medical topics".into(),
                system_prompt: GENERAL_MED_SYSTEM_PROMPT.into(),
                validation: ScopeValidation::Model {
                    instruction: GENERAL_MED_RELEVANCE_PROMPT.into(),
                },
                query_suffix: None,
            },
        }
    }

    /// Apply configured overrides, keyed by persona id.
    pub fn with_overrides(
        mut self,
        overrides: &HashMap<String, PersonaOverride>,
    ) -> Result<Self, QueryError> {
        for (key, o) in overrides {
            let id = PersonaId::parse(key)?;
            let persona = self.get_mut(id);
            if let Some(prompt) = &o.system_prompt {
                persona.system_prompt = prompt.clone();
            }
            if let Some(keywords) = &o.keywords {
                persona.validation = ScopeValidation::Keywords {
                    keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
                };
            }
            info!(persona = %id, "Applied persona override");
        }
        Ok(self)
    }

    /// Look up a persona by its textual id.
    pub fn resolve(&self, id: &str) -> Result<&PersonaConfig, QueryError> {
        PersonaId::parse(id).map(|id| self.get(id))
    }

    pub fn get(&self, id: PersonaId) -> &PersonaConfig {
        match id {
            PersonaId::Glp1 => &self.glp1,
            PersonaId::GeneralMed => &self.general_med,
        }
    }

    fn get_mut(&mut self, id: PersonaId) -> &mut PersonaConfig {
        match id {
            PersonaId::Glp1 => &mut self.glp1,
            PersonaId::GeneralMed => &mut self.general_med,
        }
    }

    pub fn default_persona(&self) -> PersonaId {
        PersonaId::GeneralMed
    }

    pub fn list(&self) -> Vec<&PersonaConfig> {
        PersonaId::ALL.iter().map(|id| self.get(*id)).collect()
    }
}

impl Default for PersonaRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Whether `query` passes a keyword scope list (case-insensitive).
pub fn matches_keywords(keywords: &[String], query: &str) -> bool {
    let lower = query.to_lowercase();
    keywords.iter().any(|k| lower.contains(&k.to_lowercase()))
}

/// The fixed out-of-scope reply for a persona.
pub fn refusal_message(persona: &PersonaConfig) -> String {
    format!(
        "I apologize, but I can only provide information about {scope}. \
         Your question appears to be about something else. \
         Please ask a question specifically about {scope}.",
        scope = persona.scope
    )
}
