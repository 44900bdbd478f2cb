// [[MEMEOOORR]]/apps/agent-kernel/src/config.rs
// Purpose: CLI arguments, environment settings, secrets and wallet address.
// Architecture: Configuration Layer
// Dependencies: Clap, Serde JSON

use clap::Parser;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use crate::models::{Character, ModelProvider};

pub const SAFE_ADDRESSES_VAR: &str = "CONNECTION_CONFIGS_CONFIG_SAFE_CONTRACT_ADDRESSES";

/// Documented cadence of the autonomous loop (one minute).
pub const DEFAULT_LOOP_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_SERVER_PORT: u16 = 3000;
pub const DEFAULT_PORT_PROBE_LIMIT: u32 = 100;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Safe address dictionary is not defined in the environment variables")]
    MissingSafeAddresses,
    #[error("Failed to parse safe address dictionary: {0}")]
    InvalidSafeAddresses(String),
    #[error("Base key not found in the safe address dictionary")]
    MissingBaseSafeAddress,
}

#[derive(Debug, Parser)]
#[command(name = "memeooorr-kernel", about = "Runs the Memeooorr agent autonomously")]
pub struct Cli {
    /// Path to the character JSON file
    #[arg(long)]
    pub character: Option<String>,

    /// Comma separated list of paths to character JSON files
    #[arg(long)]
    pub characters: Option<String>,

    /// Preferred control server port (overrides SERVER_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Loop interval in milliseconds (overrides LOOP_INTERVAL_MS)
    #[arg(long)]
    pub interval_ms: Option<u64>,
}

impl Cli {
    /// `--characters` wins over `--character` when both are given.
    pub fn characters_arg(&self) -> Option<&str> {
        self.characters.as_deref().or(self.character.as_deref())
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub server_port: u16,
    pub port_probe_limit: u32,
    pub loop_interval: Duration,
    pub redis_url: Option<String>,
    pub action_service_url: String,
    pub action_routes_path: String,
    pub characters_dir: String,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Settings {
            server_port: parse_or(get("SERVER_PORT"), "SERVER_PORT", DEFAULT_SERVER_PORT),
            port_probe_limit: parse_or(
                get("PORT_PROBE_LIMIT"),
                "PORT_PROBE_LIMIT",
                DEFAULT_PORT_PROBE_LIMIT,
            ),
            loop_interval: Duration::from_millis(parse_or(
                get("LOOP_INTERVAL_MS"),
                "LOOP_INTERVAL_MS",
                DEFAULT_LOOP_INTERVAL_MS,
            )),
            redis_url: get("REDIS_URL"),
            action_service_url: get("ACTION_SERVICE_URL")
                .unwrap_or_else(|| "http://127.0.0.1:8000".to_string()),
            action_routes_path: get("ACTION_ROUTES_PATH")
                .unwrap_or_else(|| "config/actions.json".to_string()),
            characters_dir: get("CHARACTERS_DIR").unwrap_or_else(|| "../characters".to_string()),
        }
    }

    /// CLI flags take precedence over the environment.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(port) = cli.port {
            self.server_port = port;
        }
        if let Some(ms) = cli.interval_ms {
            self.loop_interval = Duration::from_millis(ms);
        }
    }
}

fn parse_or<T: std::str::FromStr + Copy + std::fmt::Display>(
    raw: Option<String>,
    key: &str,
    default: T,
) -> T {
    match raw {
        Some(v) => v.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid value '{}' for {}, using {}", v, key, default);
            default
        }),
        None => default,
    }
}

/// Reads the Safe contract address for the base chain from the environment.
pub fn safe_address() -> Result<String, ConfigError> {
    parse_safe_address(std::env::var(SAFE_ADDRESSES_VAR).ok().as_deref())
}

pub fn parse_safe_address(raw: Option<&str>) -> Result<String, ConfigError> {
    let raw = raw
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::MissingSafeAddresses)?;

    let addresses: HashMap<String, serde_json::Value> = serde_json::from_str(raw)
        .map_err(|e| ConfigError::InvalidSafeAddresses(e.to_string()))?;

    addresses
        .get("base")
        .and_then(|v| v.as_str())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(ConfigError::MissingBaseSafeAddress)
}

/// Secret name exposed to the plugin -> environment variable it comes from.
const SECRET_SOURCES: &[(&str, &str)] = &[
    ("OPENAI_API_KEY", "CONNECTION_CONFIGS_CONFIG_OPENAI_API_KEY"),
    ("TWITTER_USERNAME", "CONNECTION_CONFIGS_CONFIG_TWITTER_USERNAME"),
    ("TWITTER_PASSWORD", "CONNECTION_CONFIGS_CONFIG_TWITTER_PASSWORD"),
    ("TWITTER_EMAIL", "CONNECTION_CONFIGS_CONFIG_TWITTER_EMAIL"),
    ("AGENT_EOA_PK", "AGENT_EOA_PK"),
    ("BASE_LEDGER_RPC", "CONNECTION_CONFIGS_CONFIG_BASE_LEDGER_RPC"),
    ("MEME_FACTORY_CONTRACT", "CONNECTION_CONFIGS_CONFIG_MEME_FACTORY_CONTRACT"),
    ("SAFE_ADDRESS_DICT", SAFE_ADDRESSES_VAR),
    ("SUBGRAPH_URL", "CONNECTION_CONFIGS_CONFIG_SUBGRAPH_URL"),
    ("MEME_SUBGRAPH_URL", "CONNECTION_CONFIGS_CONFIG_MEME_SUBGRAPH_URL"),
    ("CHAIN_ID", "CONNECTION_CONFIGS_CONFIG_BASE_CHAIN_ID"),
];

pub fn collect_secrets(safe_address: &str) -> HashMap<String, String> {
    collect_secrets_from(|key| std::env::var(key).ok(), safe_address)
}

pub fn collect_secrets_from(
    lookup: impl Fn(&str) -> Option<String>,
    safe_address: &str,
) -> HashMap<String, String> {
    let mut secrets: HashMap<String, String> = SECRET_SOURCES
        .iter()
        .filter_map(|(name, var)| lookup(var).map(|v| (name.to_string(), v)))
        .collect();
    secrets.insert("SAFE_ADDRESS".to_string(), safe_address.to_string());
    secrets
}

/// Resolves the model API token: character secrets first, then settings.
pub fn token_for_provider(
    provider: ModelProvider,
    character: &Character,
    settings: impl Fn(&str) -> Option<String>,
) -> Option<String> {
    let candidates: &[(&str, &str)] = match provider {
        ModelProvider::OpenAi => &[("OPENAI_API_KEY", "OPENAI_API_KEY")],
        ModelProvider::LlamaCloud => &[
            ("LLAMACLOUD_API_KEY", "LLAMACLOUD_API_KEY"),
            ("TOGETHER_API_KEY", "TOGETHER_API_KEY"),
            ("XAI_API_KEY", "XAI_API_KEY"),
            ("OPENAI_API_KEY", "OPENAI_API_KEY"),
        ],
        ModelProvider::Anthropic => &[
            ("ANTHROPIC_API_KEY", "ANTHROPIC_API_KEY"),
            ("CLAUDE_API_KEY", "CLAUDE_API_KEY"),
        ],
        ModelProvider::RedPill => &[("REDPILL_API_KEY", "REDPILL_API_KEY")],
        ModelProvider::OpenRouter => &[("OPENROUTER", "OPENROUTER_API_KEY")],
        ModelProvider::Grok => &[("GROK_API_KEY", "GROK_API_KEY")],
        ModelProvider::Heurist => &[("HEURIST_API_KEY", "HEURIST_API_KEY")],
        ModelProvider::Groq => &[("GROQ_API_KEY", "GROQ_API_KEY")],
        ModelProvider::Other => return None,
    };

    // Anthropic checks both character secrets before any setting; the other
    // providers interleave secret and setting per candidate.
    if provider == ModelProvider::Anthropic {
        return candidates
            .iter()
            .find_map(|(secret, _)| character.secret(secret).map(str::to_string))
            .or_else(|| candidates.iter().find_map(|(_, setting)| settings(setting)));
    }

    candidates.iter().find_map(|(secret, setting)| {
        character
            .secret(secret)
            .map(str::to_string)
            .or_else(|| settings(setting))
    })
}
