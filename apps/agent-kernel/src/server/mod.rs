// [[MEMEOOORR]]/apps/agent-kernel/src/server/mod.rs
// Purpose: Embedded HTTP control server agents register with.
// Architecture: API Layer
// Dependencies: Axum, Tower HTTP, DashMap, tokio-util

pub mod handlers;

use axum::{http::Method, routing::get, Router};
use dashmap::DashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::sync::Mutex;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::runtime::AgentRuntime;

pub type AgentDirectory = Arc<DashMap<Uuid, Arc<AgentRuntime>>>;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind control server to port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
    #[error("Control server already started")]
    AlreadyStarted,
}

pub struct ControlServer {
    agents: AgentDirectory,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Default for ControlServer {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlServer {
    pub fn new() -> Self {
        Self {
            agents: Arc::new(DashMap::new()),
            shutdown: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    pub fn register_agent(&self, runtime: Arc<AgentRuntime>) {
        tracing::info!(
            "Registering agent {} ({})",
            runtime.character().name,
            runtime.agent_id()
        );
        self.agents.insert(runtime.agent_id(), runtime);
    }

    #[cfg(test)]
    pub fn agent(&self, agent_id: Uuid) -> Option<Arc<AgentRuntime>> {
        self.agents.get(&agent_id).map(|r| r.clone())
    }

    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET])
            .allow_headers(Any);

        Router::new()
            .route("/health", get(handlers::health))
            .route("/agents", get(handlers::list_agents))
            .route("/agents/:agent_id", get(handlers::get_agent))
            .route("/agents/:agent_id/memories", get(handlers::get_memories))
            .route("/ws/agents/:agent_id", get(handlers::ws_agent_stream))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(self.agents.clone())
    }

    /// Binds `0.0.0.0:port` and serves in the background until `stop`.
    pub async fn start(&self, port: u16) -> Result<SocketAddr, ServerError> {
        let mut slot = self.task.lock().await;
        if self.shutdown.is_cancelled() || slot.is_some() {
            return Err(ServerError::AlreadyStarted);
        }

        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { port, source })?;
        let local = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { port, source })?;

        let app = self.router();
        let shutdown = self.shutdown.clone();
        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
            if let Err(e) = result {
                tracing::error!("Control server error: {}", e);
            }
        });

        *slot = Some(task);
        tracing::info!("Control server listening on http://{}", local);
        Ok(local)
    }

    pub async fn stop(&self) {
        self.shutdown.cancel();
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!("Control server task ended abnormally: {}", e);
            }
        }
        tracing::info!("Control server stopped");
    }
}
