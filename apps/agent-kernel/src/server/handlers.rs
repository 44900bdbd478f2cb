// [[MEMEOOORR]]/apps/agent-kernel/src/server/handlers.rs
// Purpose: API Handlers for registered agents and their event streams.
// Architecture: API Layer
// Dependencies: Axum, Runtime

use axum::extract::ws::Message;
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        Json, Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use super::AgentDirectory;
use crate::autonomy::{LastTrigger, LAST_TRIGGER_KEY, START_TABLE};
use crate::memory::Memory;
use crate::models::AgentSummary;
use crate::observability::LoopStatsSnapshot;
use crate::plugin::ActionKey;
use crate::runtime::AgentRuntime;

const MAX_MEMORY_PAGE: usize = 100;

#[derive(Deserialize)]
pub struct MemoryQuery {
    table: Option<String>,
    count: Option<usize>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    message: String,
    agents: usize,
}

#[derive(Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    pub description: String,
    pub actions: Vec<ActionKey>,
}

#[derive(Serialize, Deserialize)]
pub struct AgentDetail {
    #[serde(flatten)]
    pub summary: AgentSummary,
    pub plugins: Vec<PluginInfo>,
    pub model_token_configured: bool,
    pub loop_stats: LoopStatsSnapshot,
    pub last_trigger: Option<LastTrigger>,
}

fn lookup(agents: &AgentDirectory, agent_id: Uuid) -> Result<Arc<AgentRuntime>, StatusCode> {
    agents
        .get(&agent_id)
        .map(|r| r.clone())
        .ok_or(StatusCode::NOT_FOUND)
}

pub async fn health(State(agents): State<AgentDirectory>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Memeooorr control server is running".to_string(),
        agents: agents.len(),
    })
}

pub async fn list_agents(State(agents): State<AgentDirectory>) -> Json<Vec<AgentSummary>> {
    let mut summaries: Vec<AgentSummary> = agents.iter().map(|r| r.summary()).collect();
    summaries.sort_by(|a, b| a.name.cmp(&b.name));
    Json(summaries)
}

pub async fn get_agent(
    State(agents): State<AgentDirectory>,
    Path(agent_id): Path<Uuid>,
) -> Result<Json<AgentDetail>, StatusCode> {
    let runtime = lookup(&agents, agent_id)?;
    let last_trigger = runtime
        .cache()
        .get::<LastTrigger>(LAST_TRIGGER_KEY)
        .await
        .unwrap_or_else(|e| {
            tracing::warn!("Failed to read last trigger for {}: {}", agent_id, e);
            None
        });

    Ok(Json(AgentDetail {
        summary: runtime.summary(),
        plugins: runtime
            .plugins()
            .iter()
            .map(|p| PluginInfo {
                name: p.name.clone(),
                description: p.description.clone(),
                actions: p.action_keys(),
            })
            .collect(),
        model_token_configured: runtime.token().is_some(),
        loop_stats: runtime.loop_stats(),
        last_trigger,
    }))
}

pub async fn get_memories(
    State(agents): State<AgentDirectory>,
    Path(agent_id): Path<Uuid>,
    Query(query): Query<MemoryQuery>,
) -> Result<Json<Vec<Memory>>, StatusCode> {
    let runtime = lookup(&agents, agent_id)?;
    let table = query.table.as_deref().unwrap_or(START_TABLE);
    let count = query.count.unwrap_or(20).min(MAX_MEMORY_PAGE);

    runtime
        .recent_memories(table, count)
        .await
        .map(Json)
        .map_err(|e| {
            tracing::error!("Failed to read memories for {}: {}", agent_id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

pub async fn ws_agent_stream(
    State(agents): State<AgentDirectory>,
    Path(agent_id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    let runtime = lookup(&agents, agent_id)?;
    Ok(ws.on_upgrade(move |socket| handle_agent_stream(socket, runtime)))
}

async fn handle_agent_stream(socket: WebSocket, runtime: Arc<AgentRuntime>) {
    let agent_id = runtime.agent_id();
    let (mut sender, mut receiver) = socket.split();
    let mut events = runtime.event_bus.subscribe();

    let initial = json!({
        "type": "stats",
        "agent_id": agent_id,
        "stats": runtime.loop_stats(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    });
    if sender.send(Message::Text(initial.to_string())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            msg = receiver.next() => {
                if matches!(msg, None | Some(Err(_)) | Some(Ok(Message::Close(_)))) {
                    tracing::info!("Client disconnected from agent stream: {}", agent_id);
                    break;
                }
            }

            event = events.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Agent stream for {} lagged, dropped {} events", agent_id, skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                let frame = match serde_json::to_string(&json!({ "type": "event", "event": event })) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::error!("Failed to serialize agent event: {}", e);
                        continue;
                    }
                };
                if sender.send(Message::Text(frame)).await.is_err() {
                    tracing::info!("Failed to send agent event, client disconnected");
                    break;
                }
            }
        }
    }
}
