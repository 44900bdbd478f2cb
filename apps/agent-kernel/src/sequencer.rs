// [[MEMEOOORR]]/apps/agent-kernel/src/sequencer.rs
// Purpose: Two-stage action pipeline: publish, then react on success.
// Architecture: Domain Logic Layer
// Dependencies: Runtime, Plugin

use thiserror::Error;

use crate::memory::{Memory, Room};
use crate::plugin::ActionKey;
use crate::runtime::AgentRuntime;

#[derive(Error, Debug)]
pub enum TriggerError {
    #[error("No installed plugin provides the '{0}' action")]
    MissingAction(ActionKey),
    #[error("Action '{key}' failed: {source:#}")]
    Action {
        key: ActionKey,
        #[source]
        source: anyhow::Error,
    },
}

/// Runs the publish action and, if it succeeds, the react action.
///
/// Before the react step the memory is re-routed to the asset room, so the
/// react handler always observes `Room::AssetInteraction`. Returns whether
/// the publish step succeeded; a declined publish is not an error.
pub async fn trigger_actions(
    runtime: &AgentRuntime,
    memory: &mut Memory,
) -> Result<bool, TriggerError> {
    let publish = runtime
        .find_action(ActionKey::Publish)
        .ok_or(TriggerError::MissingAction(ActionKey::Publish))?;
    let react = runtime
        .find_action(ActionKey::React)
        .ok_or(TriggerError::MissingAction(ActionKey::React))?;

    tracing::info!("[Trigger] Executing {} action...", publish.name());
    let published = publish
        .handle(runtime, memory)
        .await
        .map_err(|source| TriggerError::Action {
            key: ActionKey::Publish,
            source,
        })?
        .is_success();

    if published {
        tracing::info!(
            "[Trigger] {} was successful. Executing {}...",
            publish.name(),
            react.name()
        );
        memory.set_room(Room::AssetInteraction);

        let reacted = react
            .handle(runtime, memory)
            .await
            .map_err(|source| TriggerError::Action {
                key: ActionKey::React,
                source,
            })?;
        tracing::debug!("[Trigger] {} finished: {:?}", react.name(), reacted);
    } else {
        tracing::warn!("[Trigger] {} was unsuccessful, skipping {}", publish.name(), react.name());
    }

    Ok(published)
}
