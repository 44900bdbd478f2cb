// Shared fixtures for the unit tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::memory::{Memory, Room};
use crate::models::Character;
use crate::plugin::{Action, ActionKey, ActionOutcome, Plugin};
use crate::runtime::AgentRuntime;
use crate::store::InMemoryStore;

pub fn character(name: &str) -> Character {
    serde_json::from_value(serde_json::json!({ "name": name })).unwrap()
}

pub fn runtime_with_plugins(plugins: Vec<Plugin>) -> AgentRuntime {
    AgentRuntime::new(character("Memeooorr"), None, plugins, Arc::new(InMemoryStore::new()))
}

pub fn runtime_with_actions(publish: Arc<ScriptedAction>, react: Arc<ScriptedAction>) -> AgentRuntime {
    runtime_with_plugins(vec![Plugin::new("scripted", "test actions")
        .with_action(ActionKey::Publish, publish)
        .with_action(ActionKey::React, react)])
}

type Script = Box<dyn Fn(usize) -> anyhow::Result<ActionOutcome> + Send + Sync>;

/// Action whose result is a function of the call number. Records the room
/// of every memory it sees and the peak number of concurrent calls.
pub struct ScriptedAction {
    script: Script,
    delay: Option<Duration>,
    calls: AtomicUsize,
    running: AtomicUsize,
    peak: AtomicUsize,
    rooms: Mutex<Vec<Room>>,
}

impl ScriptedAction {
    pub fn new(
        script: impl Fn(usize) -> anyhow::Result<ActionOutcome> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Self::build(Box::new(script), None)
    }

    pub fn always(outcome: ActionOutcome) -> Arc<Self> {
        Self::new(move |_| Ok(outcome.clone()))
    }

    pub fn failing(message: &'static str) -> Arc<Self> {
        Self::new(move |_| Err(anyhow::anyhow!(message)))
    }

    pub fn slow(outcome: ActionOutcome, delay: Duration) -> Arc<Self> {
        Self::build(Box::new(move |_| Ok(outcome.clone())), Some(delay))
    }

    fn build(script: Script, delay: Option<Duration>) -> Arc<Self> {
        Arc::new(Self {
            script,
            delay,
            calls: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            rooms: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn rooms(&self) -> Vec<Room> {
        self.rooms.lock().unwrap().clone()
    }
}

#[async_trait]
impl Action for ScriptedAction {
    fn name(&self) -> &str {
        "SCRIPTED"
    }

    async fn handle(&self, _runtime: &AgentRuntime, memory: &Memory) -> anyhow::Result<ActionOutcome> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.rooms.lock().unwrap().push(memory.room);

        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);

        (self.script)(call)
    }
}
