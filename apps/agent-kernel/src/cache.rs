// [[MEMEOOORR]]/apps/agent-kernel/src/cache.rs
// Purpose: Typed, expiring cache on top of the store's cache table.
// Architecture: Persistence Layer
// Dependencies: Serde, Chrono

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::store::{MemoryStore, StoreError};

#[derive(Serialize, Deserialize)]
struct CacheEntry<T> {
    value: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

/// Cache scoped to one agent. Entries are JSON with an optional expiry;
/// an expired entry reads as absent and is removed.
#[derive(Clone)]
pub struct CacheManager {
    agent_id: Uuid,
    store: Arc<dyn MemoryStore>,
}

impl CacheManager {
    pub fn new(agent_id: Uuid, store: Arc<dyn MemoryStore>) -> Self {
        Self { agent_id, store }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let raw = match self.store.get_cache(self.agent_id, key).await? {
            Some(raw) => raw,
            None => return Ok(None),
        };

        let entry: CacheEntry<T> = serde_json::from_str(&raw)?;
        if entry.expires_at.map(|at| at <= Utc::now()).unwrap_or(false) {
            self.delete(key).await?;
            return Ok(None);
        }
        Ok(Some(entry.value))
    }

    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let entry = CacheEntry {
            value,
            expires_at: ttl.map(|ttl| Utc::now() + ttl),
        };
        let raw = serde_json::to_string(&entry)?;
        self.store.set_cache(self.agent_id, key, &raw).await
    }

    pub async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.store.delete_cache(self.agent_id, key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn cache() -> CacheManager {
        CacheManager::new(Uuid::new_v4(), Arc::new(InMemoryStore::new()))
    }

    #[tokio::test]
    async fn test_typed_round_trip() {
        let cache = cache();
        cache
            .set("last_tweet", &vec!["gm".to_string()], None)
            .await
            .unwrap();

        let value: Option<Vec<String>> = cache.get("last_tweet").await.unwrap();
        assert_eq!(value, Some(vec!["gm".to_string()]));

        cache.delete("last_tweet").await.unwrap();
        let value: Option<Vec<String>> = cache.get("last_tweet").await.unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn test_expired_entry_reads_as_absent() {
        let cache = cache();
        cache
            .set("stale", &42u32, Some(Duration::seconds(-1)))
            .await
            .unwrap();
        cache
            .set("fresh", &7u32, Some(Duration::minutes(5)))
            .await
            .unwrap();

        assert_eq!(cache.get::<u32>("stale").await.unwrap(), None);
        assert_eq!(cache.get::<u32>("fresh").await.unwrap(), Some(7));
    }
}
