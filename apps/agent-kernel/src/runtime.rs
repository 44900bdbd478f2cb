// [[MEMEOOORR]]/apps/agent-kernel/src/runtime.rs
// Purpose: The agent runtime: character, plugins, persistence and event bus.
// Architecture: Domain Logic Layer
// Dependencies: reqwest, tokio, Serde JSON

use std::env;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::autonomy::{TickObserver, TickReport};
use crate::cache::CacheManager;
use crate::events::{AgentEvent, EventType};
use crate::memory::{string_to_uuid, Memory};
use crate::models::{AgentSummary, Character};
use crate::observability::{LoopStats, LoopStatsSnapshot};
use crate::plugin::{Action, ActionKey, Plugin};
use crate::store::{MemoryStore, StoreError};

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("No plugins installed")]
    NoPlugins,
    #[error("No installed plugin provides the '{0}' action")]
    MissingAction(ActionKey),
    #[error("Store initialization failed: {0}")]
    Store(#[from] StoreError),
}

pub struct AgentRuntime {
    agent_id: Uuid,
    character: Character,
    token: Option<String>,
    plugins: Vec<Plugin>,
    store: Arc<dyn MemoryStore>,
    cache: CacheManager,
    http_client: reqwest::Client,
    pub event_bus: broadcast::Sender<AgentEvent>,
    stats: LoopStats,
}

impl AgentRuntime {
    pub fn new(
        character: Character,
        token: Option<String>,
        plugins: Vec<Plugin>,
        store: Arc<dyn MemoryStore>,
    ) -> Self {
        let agent_id = character
            .id
            .unwrap_or_else(|| string_to_uuid(&character.name));
        tracing::info!("Creating agent runtime for {} ({})", character.name, agent_id);

        let (tx, _) = broadcast::channel(100);

        AgentRuntime {
            agent_id,
            cache: CacheManager::new(agent_id, store.clone()),
            character,
            token,
            plugins,
            store,
            http_client: reqwest::Client::new(),
            event_bus: tx,
            stats: LoopStats::default(),
        }
    }

    /// Checks plugin wiring and prepares the store.
    pub async fn initialize(&self) -> Result<(), RuntimeError> {
        if self.plugins.is_empty() {
            return Err(RuntimeError::NoPlugins);
        }
        for key in [ActionKey::Publish, ActionKey::React] {
            if self.find_action(key).is_none() {
                return Err(RuntimeError::MissingAction(key));
            }
        }

        self.store.init().await?;

        for plugin in &self.plugins {
            tracing::info!(
                "Plugin {} ready with actions {:?}",
                plugin.name,
                plugin.action_keys()
            );
        }
        tracing::info!(
            "Agent {} initialized (store: {})",
            self.agent_id,
            self.store.backend()
        );
        Ok(())
    }

    pub fn agent_id(&self) -> Uuid {
        self.agent_id
    }

    pub fn character(&self) -> &Character {
        &self.character
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn plugins(&self) -> &[Plugin] {
        &self.plugins
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn http_client(&self) -> &reqwest::Client {
        &self.http_client
    }

    /// First installed plugin that provides `key`.
    pub fn find_action(&self, key: ActionKey) -> Option<Arc<dyn Action>> {
        self.plugins.iter().find_map(|p| p.action(key))
    }

    /// Character secret, falling back to the process environment.
    pub fn get_setting(&self, key: &str) -> Option<String> {
        self.character
            .secret(key)
            .map(str::to_string)
            .or_else(|| env::var(key).ok().filter(|v| !v.is_empty()))
    }

    /// Persists `memory` and announces it on the event bus.
    pub async fn create_memory(
        &self,
        memory: &Memory,
        table: &str,
        unique: bool,
    ) -> Result<(), StoreError> {
        self.store.create_memory(memory, table, unique).await?;
        self.emit_event(AgentEvent::new(
            self.agent_id,
            EventType::MemoryCreated,
            serde_json::json!({ "table": table, "memory": memory }),
        ));
        Ok(())
    }

    pub async fn recent_memories(&self, table: &str, count: usize) -> Result<Vec<Memory>, StoreError> {
        self.store.get_memories(self.agent_id, table, count).await
    }

    pub(crate) fn emit_event(&self, event: AgentEvent) {
        // No subscribers is the normal case when nobody watches the stream.
        let _ = self.event_bus.send(event);
    }

    pub fn loop_stats(&self) -> LoopStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn summary(&self) -> AgentSummary {
        AgentSummary {
            id: self.agent_id,
            name: self.character.name.clone(),
            username: self.character.username.clone(),
            clients: self.character.clients.clone(),
        }
    }
}

impl TickObserver for AgentRuntime {
    fn on_tick(&self, report: &TickReport) {
        self.stats.record(report);
        self.emit_event(AgentEvent::from_tick(self.agent_id, report));
    }
}
