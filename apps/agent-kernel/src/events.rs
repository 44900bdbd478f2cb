// [[MEMEOOORR]]/apps/agent-kernel/src/events.rs
// Purpose: Event definitions broadcast to control-server subscribers.
// Architecture: Domain Event Layer
// Dependencies: Serde, Chrono, Uuid

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::autonomy::{TickOutcome, TickReport};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum EventType {
    /// A memory was persisted through the runtime
    MemoryCreated,
    /// A tick ran the sequencer to completion (published or declined)
    TickCompleted,
    /// A tick failed; the loop keeps running
    TickFailed,
    /// A tick fired while the previous one was still in flight
    TickSkipped,
    /// A tick was interrupted by loop shutdown
    TickCancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    pub id: String,
    pub agent_id: Uuid,
    pub event_type: EventType,
    pub timestamp: String,
    pub payload: Value,
}

impl AgentEvent {
    pub fn new(agent_id: Uuid, event_type: EventType, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            agent_id,
            event_type,
            timestamp: Utc::now().to_rfc3339(),
            payload,
        }
    }

    pub fn from_tick(agent_id: Uuid, report: &TickReport) -> Self {
        let event_type = match report.outcome {
            TickOutcome::Published | TickOutcome::Declined => EventType::TickCompleted,
            TickOutcome::Failed { .. } => EventType::TickFailed,
            TickOutcome::SkippedBusy => EventType::TickSkipped,
            TickOutcome::Cancelled => EventType::TickCancelled,
        };
        let payload = serde_json::to_value(report).unwrap_or(Value::Null);
        Self::new(agent_id, event_type, payload)
    }
}
