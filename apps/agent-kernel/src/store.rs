// [[MEMEOOORR]]/apps/agent-kernel/src/store.rs
// Purpose: Persistence adapters for memories and the agent cache.
// Architecture: Persistence Layer
// Dependencies: async-trait, DashMap, Redis, Serde JSON

use async_trait::async_trait;
use dashmap::DashMap;
use redis::AsyncCommands;
use thiserror::Error;
use uuid::Uuid;

use crate::memory::Memory;

/// Per-table cap; older memories are evicted first.
const MAX_MEMORIES_PER_TABLE: usize = 1000;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Database adapter the runtime persists memories and cache entries through.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn init(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Appends `memory` to `table`. With `unique`, a record whose id is
    /// already present in that table is dropped.
    async fn create_memory(&self, memory: &Memory, table: &str, unique: bool)
        -> Result<(), StoreError>;

    /// Newest first, at most `count` records.
    async fn get_memories(
        &self,
        agent_id: Uuid,
        table: &str,
        count: usize,
    ) -> Result<Vec<Memory>, StoreError>;

    async fn get_cache(&self, agent_id: Uuid, key: &str) -> Result<Option<String>, StoreError>;

    async fn set_cache(&self, agent_id: Uuid, key: &str, value: &str) -> Result<(), StoreError>;

    async fn delete_cache(&self, agent_id: Uuid, key: &str) -> Result<(), StoreError>;

    fn backend(&self) -> &'static str;
}

fn memories_key(agent_id: Uuid, table: &str) -> String {
    format!("memories:{}:{}", agent_id, table)
}

fn cache_key(agent_id: Uuid, key: &str) -> String {
    format!("cache:{}:{}", agent_id, key)
}

#[derive(Default)]
pub struct InMemoryStore {
    memories: DashMap<String, Vec<Memory>>,
    cache: DashMap<String, String>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn create_memory(
        &self,
        memory: &Memory,
        table: &str,
        unique: bool,
    ) -> Result<(), StoreError> {
        let mut rows = self
            .memories
            .entry(memories_key(memory.agent_id, table))
            .or_default();

        if unique && rows.iter().any(|m| m.id == memory.id) {
            tracing::debug!("Skipping duplicate memory {} in table {}", memory.id, table);
            return Ok(());
        }

        rows.push(memory.clone());
        if rows.len() > MAX_MEMORIES_PER_TABLE {
            let excess = rows.len() - MAX_MEMORIES_PER_TABLE;
            rows.drain(..excess);
        }
        Ok(())
    }

    async fn get_memories(
        &self,
        agent_id: Uuid,
        table: &str,
        count: usize,
    ) -> Result<Vec<Memory>, StoreError> {
        Ok(self
            .memories
            .get(&memories_key(agent_id, table))
            .map(|rows| rows.iter().rev().take(count).cloned().collect())
            .unwrap_or_default())
    }

    async fn get_cache(&self, agent_id: Uuid, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.cache.get(&cache_key(agent_id, key)).map(|v| v.clone()))
    }

    async fn set_cache(&self, agent_id: Uuid, key: &str, value: &str) -> Result<(), StoreError> {
        self.cache.insert(cache_key(agent_id, key), value.to_string());
        Ok(())
    }

    async fn delete_cache(&self, agent_id: Uuid, key: &str) -> Result<(), StoreError> {
        self.cache.remove(&cache_key(agent_id, key));
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// Redis-backed store. Memories live in one list per agent and table,
/// newest at the head; ids per table are tracked in a set for `unique`.
pub struct RedisStore {
    connection: redis::aio::ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let connection = redis::aio::ConnectionManager::new(client).await?;
        tracing::info!("Redis store connected: {}", url);
        Ok(Self { connection })
    }
}

#[async_trait]
impl MemoryStore for RedisStore {
    async fn init(&self) -> Result<(), StoreError> {
        let mut con = self.connection.clone();
        redis::cmd("PING").query_async::<_, String>(&mut con).await?;
        Ok(())
    }

    async fn create_memory(
        &self,
        memory: &Memory,
        table: &str,
        unique: bool,
    ) -> Result<(), StoreError> {
        let mut con = self.connection.clone();
        let list_key = memories_key(memory.agent_id, table);
        let ids_key = format!("{}:ids", list_key);

        if unique {
            let added: i64 = con.sadd(&ids_key, memory.id.to_string()).await?;
            if added == 0 {
                tracing::debug!("Skipping duplicate memory {} in table {}", memory.id, table);
                return Ok(());
            }
        }

        let json = serde_json::to_string(memory)?;
        con.lpush::<_, _, ()>(&list_key, json).await?;
        con.ltrim::<_, ()>(&list_key, 0, MAX_MEMORIES_PER_TABLE as isize - 1)
            .await?;
        Ok(())
    }

    async fn get_memories(
        &self,
        agent_id: Uuid,
        table: &str,
        count: usize,
    ) -> Result<Vec<Memory>, StoreError> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut con = self.connection.clone();
        let stop = isize::try_from(count).unwrap_or(isize::MAX) - 1;
        let rows: Vec<String> = con.lrange(memories_key(agent_id, table), 0, stop).await?;

        let mut memories = Vec::with_capacity(rows.len());
        for row in rows {
            match serde_json::from_str::<Memory>(&row) {
                Ok(memory) => memories.push(memory),
                Err(e) => tracing::error!("Skipping unreadable memory row: {}", e),
            }
        }
        Ok(memories)
    }

    async fn get_cache(&self, agent_id: Uuid, key: &str) -> Result<Option<String>, StoreError> {
        let mut con = self.connection.clone();
        Ok(con.get(cache_key(agent_id, key)).await?)
    }

    async fn set_cache(&self, agent_id: Uuid, key: &str, value: &str) -> Result<(), StoreError> {
        let mut con = self.connection.clone();
        con.set::<_, _, ()>(cache_key(agent_id, key), value).await?;
        Ok(())
    }

    async fn delete_cache(&self, agent_id: Uuid, key: &str) -> Result<(), StoreError> {
        let mut con = self.connection.clone();
        con.del::<_, ()>(cache_key(agent_id, key)).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
