// [[MEMEOOORR]]/apps/agent-kernel/src/main.rs
// Purpose: Entry point. Loads the character, wires secrets and persistence,
//          starts the control server and the autonomous loop.
// Architecture: Application Boot
// Dependencies: Tokio, Clap, dotenvy, tracing-subscriber

mod autonomy;
mod cache;
mod characters;
mod config;
mod events;
mod memory;
mod models;
mod observability;
mod plugin;
mod port;
mod runtime;
mod sequencer;
mod server;
mod store;

#[cfg(test)]
mod testing;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;

use crate::autonomy::{run_autonomously, LoopConfig};
use crate::config::{Cli, Settings};
use crate::runtime::AgentRuntime;
use crate::server::ControlServer;
use crate::store::{InMemoryStore, MemoryStore, RedisStore};

async fn open_store(settings: &Settings) -> Arc<dyn MemoryStore> {
    match &settings.redis_url {
        Some(url) => match RedisStore::connect(url).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                tracing::warn!("Failed to connect to Redis: {}. Using in-memory store.", e);
                Arc::new(InMemoryStore::new())
            }
        },
        None => {
            tracing::warn!("REDIS_URL not set. Running with an in-memory store.");
            Arc::new(InMemoryStore::new())
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = Settings::from_env();
    settings.apply_cli(&cli);

    let port = port::get_available_port(settings.server_port, settings.port_probe_limit).await?;

    let characters_arg = cli
        .characters_arg()
        .context("No character given; pass --character or --characters")?;
    let mut characters =
        characters::load_characters(characters_arg, Path::new(&settings.characters_dir))?;
    if characters.is_empty() {
        bail!("No characters loaded, exiting...");
    }
    if characters.len() > 1 {
        tracing::warn!(
            "{} characters loaded; only the first is run",
            characters.len()
        );
    }

    let safe_address = config::safe_address()?;
    let secrets = config::collect_secrets(&safe_address);
    let character = characters::prepare_character(characters.swap_remove(0), secrets);

    if character.wants_client("twitter") {
        tracing::info!("Twitter client requested; posting is delegated to the action service");
    }

    let provider = character
        .model_provider
        .unwrap_or(models::ModelProvider::OpenAi);
    let token = config::token_for_provider(provider, &character, |key| std::env::var(key).ok());
    match &token {
        Some(_) => tracing::info!("Token initialized for {:?}", provider),
        None => tracing::warn!("No API token found for {:?}", provider),
    }

    let store = open_store(&settings).await;
    tracing::info!("Database initialized ({})", store.backend());

    let routes = plugin::ActionRoutes::load_from_disk(&settings.action_routes_path)?;
    let plugins = vec![plugin::memeooorr_plugin(&settings.action_service_url, &routes)];

    let runtime = Arc::new(AgentRuntime::new(character, token, plugins, store));
    runtime.initialize().await?;

    let server = ControlServer::new();
    server.start(port).await?;

    let loop_config = LoopConfig {
        interval: settings.loop_interval,
    };
    let handle = run_autonomously(runtime.clone(), &server, loop_config, runtime.clone());
    tracing::info!("Agent {} initialized and running!", runtime.agent_id());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    handle.stop().await;
    server.stop().await;
    Ok(())
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("memeooorr_kernel=debug".parse().unwrap())
                .add_directive("tower_http=trace".parse().unwrap()),
        )
        .init();

    tracing::info!("Initializing Memeooorr kernel...");

    if let Err(e) = run().await {
        tracing::error!("Failed to start Memeooorr agent: {:#}", e);
        std::process::exit(1);
    }
}
