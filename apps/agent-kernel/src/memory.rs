// [[MEMEOOORR]]/apps/agent-kernel/src/memory.rs
// Purpose: Event records ("memories") that flow through one trigger cycle.
// Architecture: Domain Event Layer
// Dependencies: Serde, Chrono, Uuid

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

use crate::runtime::AgentRuntime;

pub const DEFAULT_MEMORY_TEXT: &str = "Periodic check from Memeoor.";
pub const START_ACTION: &str = "START";
const SYNTHETIC_USER: &str = "memeoor-user-1";

static MEMORY_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Deterministic name-based UUID, used for every id derived from a string.
pub fn string_to_uuid(value: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, value.as_bytes())
}

/// Logical channel an event record is routed on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Room {
    #[serde(rename = "TWITTER_INTERACTION")]
    SocialInteraction,
    #[serde(rename = "TOKEN_INTERACTION")]
    AssetInteraction,
}

impl Room {
    pub fn as_str(&self) -> &'static str {
        match self {
            Room::SocialInteraction => "TWITTER_INTERACTION",
            Room::AssetInteraction => "TOKEN_INTERACTION",
        }
    }

    pub fn id(&self) -> Uuid {
        string_to_uuid(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Content {
    pub text: String,
    pub action: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    pub id: Uuid,
    pub content: Content,
    pub room: Room,
    pub room_id: Uuid,
    pub user_id: Uuid,
    pub agent_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Memory {
    pub fn new(agent_id: Uuid, room: Room, text: &str) -> Self {
        let created_at = Utc::now();
        // Nanosecond clock plus a sequence number: two records built within
        // the same clock reading still get distinct ids.
        let nanos = created_at
            .timestamp_nanos_opt()
            .unwrap_or_else(|| created_at.timestamp_micros() * 1_000);
        let seq = MEMORY_SEQUENCE.fetch_add(1, Ordering::Relaxed);

        Memory {
            id: string_to_uuid(&format!("{}-{}", nanos, seq)),
            content: Content {
                text: text.to_string(),
                action: START_ACTION.to_string(),
            },
            room,
            room_id: room.id(),
            user_id: string_to_uuid(SYNTHETIC_USER),
            agent_id,
            created_at,
        }
    }

    /// Re-routes the record; keeps `room` and `room_id` in step.
    pub fn set_room(&mut self, room: Room) {
        self.room = room;
        self.room_id = room.id();
    }
}

/// Builds a fresh START record for `room` owned by the runtime's agent.
pub fn create_memory(runtime: &AgentRuntime, room: Room, text: Option<&str>) -> Memory {
    Memory::new(runtime.agent_id(), room, text.unwrap_or(DEFAULT_MEMORY_TEXT))
}
