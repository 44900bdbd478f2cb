// [[MEMEOOORR]]/apps/agent-kernel/src/plugin.rs
// Purpose: Action capabilities and the plugins that provide them by name.
// Architecture: Capability Layer
// Dependencies: async-trait, reqwest, Serde

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::sync::Arc;
use thiserror::Error;

use crate::memory::Memory;
use crate::runtime::AgentRuntime;

/// Stable names the sequencer resolves actions by.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ActionKey {
    Publish,
    React,
}

impl ActionKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKey::Publish => "publish",
            ActionKey::React => "react",
        }
    }
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Completed(bool),
    /// Opaque handler result, judged by JSON truthiness.
    Value(Value),
}

impl ActionOutcome {
    pub fn is_success(&self) -> bool {
        match self {
            ActionOutcome::Completed(ok) => *ok,
            ActionOutcome::Value(value) => is_truthy(value),
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[async_trait]
pub trait Action: Send + Sync {
    fn name(&self) -> &str;

    async fn handle(&self, runtime: &AgentRuntime, memory: &Memory) -> anyhow::Result<ActionOutcome>;
}

pub struct Plugin {
    pub name: String,
    pub description: String,
    actions: HashMap<ActionKey, Arc<dyn Action>>,
}

impl Plugin {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            actions: HashMap::new(),
        }
    }

    pub fn with_action(mut self, key: ActionKey, action: Arc<dyn Action>) -> Self {
        tracing::debug!("Plugin {} provides {} via {}", self.name, key, action.name());
        self.actions.insert(key, action);
        self
    }

    pub fn action(&self, key: ActionKey) -> Option<Arc<dyn Action>> {
        self.actions.get(&key).cloned()
    }

    pub fn action_keys(&self) -> Vec<ActionKey> {
        let mut keys: Vec<ActionKey> = self.actions.keys().copied().collect();
        keys.sort_by_key(|k| k.as_str());
        keys
    }
}

#[derive(Error, Debug)]
pub enum RoutesError {
    #[error("Failed to parse action routes file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Paths on the action service, relative to its base URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionRoutes {
    pub publish: String,
    pub react: String,
}

impl Default for ActionRoutes {
    fn default() -> Self {
        Self {
            publish: "/actions/tweet".to_string(),
            react: "/actions/meme-interact".to_string(),
        }
    }
}

impl ActionRoutes {
    /// A missing file falls back to the default routes; a malformed one is an error.
    pub fn load_from_disk(path: &str) -> Result<Self, RoutesError> {
        match fs::read_to_string(path) {
            Ok(data) => serde_json::from_str(&data).map_err(|source| RoutesError::Parse {
                path: path.to_string(),
                source,
            }),
            Err(_) => {
                tracing::warn!("Action routes file not found at '{}'. Loading fallback defaults.", path);
                Ok(Self::default())
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct RemoteActionResponse {
    success: bool,
    #[serde(default)]
    output: Option<Value>,
}

/// Action executed by the external action service over HTTP.
pub struct RemoteAction {
    name: String,
    url: String,
}

impl RemoteAction {
    pub fn new(name: impl Into<String>, base_url: &str, route: &str) -> Self {
        Self {
            name: name.into(),
            url: format!("{}{}", base_url.trim_end_matches('/'), route),
        }
    }
}

#[async_trait]
impl Action for RemoteAction {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, runtime: &AgentRuntime, memory: &Memory) -> anyhow::Result<ActionOutcome> {
        tracing::debug!("Sending {} request to: {}", self.name, self.url);

        let mut request = runtime.http_client().post(&self.url).json(&json!({
            "agent_id": runtime.agent_id(),
            "character": runtime.character().name,
            "memory": memory,
        }));
        if let Some(token) = runtime.get_setting("ACTION_SERVICE_TOKEN") {
            request = request.bearer_auth(token);
        }

        let response: RemoteActionResponse = request
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        // The success flag decides; output only rides along when it agrees.
        match response.output {
            Some(output) if response.success && is_truthy(&output) => {
                tracing::debug!("{} returned output: {}", self.name, output);
                Ok(ActionOutcome::Value(output))
            }
            _ => Ok(ActionOutcome::Completed(response.success)),
        }
    }
}

/// The publish/react plugin backed by the action service.
pub fn memeooorr_plugin(base_url: &str, routes: &ActionRoutes) -> Plugin {
    Plugin::new("memeooorr", "Tweets and interacts with meme tokens")
        .with_action(
            ActionKey::Publish,
            Arc::new(RemoteAction::new("TWEET", base_url, &routes.publish)),
        )
        .with_action(
            ActionKey::React,
            Arc::new(RemoteAction::new("MEME_INTERACT", base_url, &routes.react)),
        )
}
