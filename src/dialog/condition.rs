//! Dialog condition evaluation.

use super::definition::DialogCondition;
use crate::error::CoreResult;
use crate::state::DialogProfileState;
use crate::world::GameContext;

/// Evaluate `conditions` with AND logic against the profile's memory.
/// An empty list always holds.
pub fn conditions_hold<C: GameContext>(
    ctx: &C,
    memory: &DialogProfileState,
    conditions: &[DialogCondition],
) -> CoreResult<bool> {
    for cond in conditions {
        if !condition_holds(ctx, memory, cond)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn condition_holds<C: GameContext>(
    ctx: &C,
    memory: &DialogProfileState,
    cond: &DialogCondition,
) -> CoreResult<bool> {
    let holds = match cond {
        DialogCondition::CharacterCulture { character, culture } => {
            ctx.character_def(character)?.culture_id.as_ref() == Some(culture)
        }
        DialogCondition::PlayerCulture { culture } => {
            ctx.player_info().player_culture.as_ref() == Some(culture)
        }
        DialogCondition::TopicSeen { topic, seen } => memory.is_topic_seen(topic) == *seen,
        DialogCondition::TopicUnlocked { topic, unlocked } => {
            memory.is_topic_unlocked(topic) == *unlocked
        }
        DialogCondition::ResponseSeen { response, seen } => {
            memory.is_response_seen(response) == *seen
        }
        DialogCondition::Memory { key, set } => memory.has_memory(key) == *set,
    };
    Ok(holds)
}
