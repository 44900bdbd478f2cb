use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ModelProvider {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "llama_cloud")]
    LlamaCloud,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "redpill")]
    RedPill,
    #[serde(rename = "openrouter")]
    OpenRouter,
    #[serde(rename = "grok")]
    Grok,
    #[serde(rename = "heurist")]
    Heurist,
    #[serde(rename = "groq")]
    Groq,
    /// Any provider this kernel has no token mapping for.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub temperature: f32,
    pub max_input_tokens: u32,
}

/// Bio and lore fields accept either a single string or a list of lines.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TextOrLines {
    Text(String),
    Lines(Vec<String>),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterSettings {
    #[serde(default)]
    pub secrets: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_config: Option<ModelConfig>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<TextOrLines>,
    #[serde(default)]
    pub lore: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub adjectives: Vec<String>,
    #[serde(default)]
    pub clients: Vec<String>,
    #[serde(default)]
    pub plugins: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_provider: Option<ModelProvider>,
    #[serde(default)]
    pub settings: CharacterSettings,
    /// Fields this kernel does not interpret (message examples, style, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Character {
    /// Whether the character asks for a client kind, e.g. "twitter".
    pub fn wants_client(&self, kind: &str) -> bool {
        self.clients.iter().any(|c| c.eq_ignore_ascii_case(kind))
    }

    /// Secret lookup; empty values count as unset.
    pub fn secret(&self, key: &str) -> Option<&str> {
        self.settings
            .secrets
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// Summary returned by the control server's agent listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSummary {
    pub id: Uuid,
    pub name: String,
    pub username: Option<String>,
    pub clients: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_character_parses_eliza_shape() {
        let character: Character = serde_json::from_value(serde_json::json!({
            "name": "Memeooorr",
            "bio": ["degen", "poster"],
            "clients": ["Twitter"],
            "modelProvider": "openai",
            "settings": { "secrets": { "OPENAI_API_KEY": "sk-1" }, "voice": "none" },
            "messageExamples": []
        }))
        .unwrap();

        assert_eq!(character.name, "Memeooorr");
        assert_eq!(character.model_provider, Some(ModelProvider::OpenAi));
        assert!(character.wants_client("twitter"));
        assert_eq!(character.secret("OPENAI_API_KEY"), Some("sk-1"));
        assert!(character.extra.contains_key("messageExamples"));
        assert!(character.settings.extra.contains_key("voice"));
        assert_eq!(
            character.bio,
            Some(TextOrLines::Lines(vec!["degen".into(), "poster".into()]))
        );
    }

    #[test]
    fn test_unmapped_provider_parses_as_other() {
        let character: Character =
            serde_json::from_value(serde_json::json!({ "name": "Gem", "modelProvider": "google" }))
                .unwrap();

        assert_eq!(character.model_provider, Some(ModelProvider::Other));
    }

    #[test]
    fn test_empty_secret_counts_as_unset() {
        let mut character: Character =
            serde_json::from_value(serde_json::json!({ "name": "x" })).unwrap();
        character
            .settings
            .secrets
            .insert("TOKEN".to_string(), String::new());

        assert_eq!(character.secret("TOKEN"), None);
    }
}
