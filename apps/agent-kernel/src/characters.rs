// [[MEMEOOORR]]/apps/agent-kernel/src/characters.rs
// Purpose: Loads character profiles from disk and applies runtime defaults.
// Architecture: Infrastructure Helper Layer
// Dependencies: std::fs, std::path, Serde JSON

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::memory::string_to_uuid;
use crate::models::{Character, ModelConfig, ModelProvider};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Error, Debug)]
pub enum CharacterError {
    #[error("Error loading character from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Error parsing character from {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid character in {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

/// Resolves one entry of the `--characters` list.
///
/// A bare file name is looked up in `characters_dir`; everything is then
/// made absolute against the current directory.
pub fn resolve_character_path(entry: &str, characters_dir: &Path) -> PathBuf {
    let entry = entry.trim();
    let candidate = Path::new(entry);
    let relative = if candidate.file_name().map(|n| n == candidate.as_os_str()).unwrap_or(false) {
        characters_dir.join(candidate)
    } else {
        candidate.to_path_buf()
    };

    if relative.is_absolute() {
        relative
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(&relative))
            .unwrap_or(relative)
    }
}

pub fn validate_character(character: &Character) -> Result<(), String> {
    if character.name.trim().is_empty() {
        return Err("character name must not be empty".to_string());
    }
    Ok(())
}

pub fn load_character_file(path: &Path) -> Result<Character, CharacterError> {
    let data = fs::read_to_string(path).map_err(|source| CharacterError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let character: Character =
        serde_json::from_str(&data).map_err(|source| CharacterError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    validate_character(&character).map_err(|reason| CharacterError::Invalid {
        path: path.to_path_buf(),
        reason,
    })?;

    Ok(character)
}

/// Loads every character named in a comma separated list.
///
/// Stops at the first file that cannot be loaded.
pub fn load_characters(
    characters_arg: &str,
    characters_dir: &Path,
) -> Result<Vec<Character>, CharacterError> {
    let mut loaded = Vec::new();

    for entry in characters_arg.split(',').filter(|e| !e.trim().is_empty()) {
        let path = resolve_character_path(entry, characters_dir);
        let character = load_character_file(&path)?;
        tracing::info!("Loaded character '{}' from {}", character.name, path.display());
        loaded.push(character);
    }

    Ok(loaded)
}

/// Fills identity, secrets and model settings the runtime relies on.
pub fn prepare_character(mut character: Character, secrets: HashMap<String, String>) -> Character {
    if character.id.is_none() {
        character.id = Some(string_to_uuid(&character.name));
    }
    if character.username.is_none() {
        character.username = Some(character.name.clone());
    }
    if character.settings.secrets.is_empty() {
        character.settings.secrets = secrets;
    }

    character.model_provider = Some(ModelProvider::OpenAi);
    character.settings.model = Some(DEFAULT_MODEL.to_string());
    character.settings.model_config = Some(ModelConfig {
        temperature: 0.5,
        max_input_tokens: 2000,
    });

    character
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_bare_name_resolves_under_characters_dir() {
        let dir = TempDir::new().unwrap();
        let resolved = resolve_character_path("memeooorr.json", dir.path());
        assert_eq!(resolved, dir.path().join("memeooorr.json"));

        let nested = resolve_character_path(" ./chars/a.json ", dir.path());
        assert!(nested.is_absolute());
        assert!(nested.ends_with("chars/a.json"));
    }

    #[test]
    fn test_load_characters_from_list() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.json", r#"{ "name": "Alpha" }"#);
        let b = write(dir.path(), "b.json", r#"{ "name": "Beta", "clients": ["twitter"] }"#);

        let arg = format!("a.json,{}", b.display());
        let characters = load_characters(&arg, dir.path()).unwrap();

        assert_eq!(characters.len(), 2);
        assert_eq!(characters[0].name, "Alpha");
        assert!(characters[1].wants_client("twitter"));
    }

    #[test]
    fn test_character_with_unmapped_provider_loads() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "g.json", r#"{ "name": "Gem", "modelProvider": "google" }"#);

        let characters = load_characters("g.json", dir.path()).unwrap();

        assert_eq!(characters[0].name, "Gem");
        assert_eq!(characters[0].model_provider, Some(ModelProvider::Other));
        let prepared = prepare_character(characters[0].clone(), HashMap::new());
        assert_eq!(prepared.model_provider, Some(ModelProvider::OpenAi));
    }

    #[test]
    fn test_load_stops_on_missing_or_invalid_file() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "broken.json", "{ not json");
        write(dir.path(), "nameless.json", r#"{ "name": "  " }"#);

        assert!(matches!(
            load_characters("missing.json", dir.path()),
            Err(CharacterError::Io { .. })
        ));
        assert!(matches!(
            load_characters("broken.json", dir.path()),
            Err(CharacterError::Parse { .. })
        ));
        assert!(matches!(
            load_characters("nameless.json", dir.path()),
            Err(CharacterError::Invalid { .. })
        ));
    }

    #[test]
    fn test_prepare_character_fills_defaults() {
        let character: Character =
            serde_json::from_value(serde_json::json!({ "name": "Memeooorr" })).unwrap();
        let mut secrets = HashMap::new();
        secrets.insert("SAFE_ADDRESS".to_string(), "0xsafe".to_string());

        let prepared = prepare_character(character, secrets);

        assert_eq!(prepared.id, Some(string_to_uuid("Memeooorr")));
        assert_eq!(prepared.username.as_deref(), Some("Memeooorr"));
        assert_eq!(prepared.secret("SAFE_ADDRESS"), Some("0xsafe"));
        assert_eq!(prepared.model_provider, Some(ModelProvider::OpenAi));
        assert_eq!(prepared.settings.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(
            prepared.settings.model_config,
            Some(ModelConfig {
                temperature: 0.5,
                max_input_tokens: 2000
            })
        );
    }

    #[test]
    fn test_prepare_character_keeps_existing_secrets() {
        let character: Character = serde_json::from_value(serde_json::json!({
            "name": "Memeooorr",
            "username": "memeooorr_bot",
            "settings": { "secrets": { "OPENAI_API_KEY": "mine" } }
        }))
        .unwrap();
        let mut secrets = HashMap::new();
        secrets.insert("OPENAI_API_KEY".to_string(), "env".to_string());

        let prepared = prepare_character(character, secrets);

        assert_eq!(prepared.username.as_deref(), Some("memeooorr_bot"));
        assert_eq!(prepared.secret("OPENAI_API_KEY"), Some("mine"));
    }
}
