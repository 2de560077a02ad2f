//! The outward-facing calls quest and dialog logic make into the game.

use serde::{Deserialize, Serialize};

use crate::defs::CharacterDef;
use crate::error::CoreResult;
use crate::event_bus::Event;
use crate::ids::{CharacterDefId, CultureId, DialogProfileId, LockId, MapId, ScenarioId};
use crate::npc::TaskDef;
use crate::registry::DefinitionRegistry;
use crate::state::DialogProfileState;

/// Facts about the player that dialog text and conditions read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub player_name: String,
    #[serde(default)]
    pub player_culture: Option<CultureId>,
}

/// Game-level operations available to quest actions and dialog effects.
///
/// Implementations must not hold internal borrows while calling
/// [`broadcast`](GameContext::broadcast): subscribers may call straight back
/// into the context.
pub trait GameContext {
    fn definitions(&self) -> &DefinitionRegistry;

    /// Hand a task to a unique NPC through its assign-task event.
    fn assign_task_to_npc(&self, npc: &CharacterDefId, task: &TaskDef) -> CoreResult<()>;

    /// Queue a scenario onto its map, creating the map state if needed.
    fn queue_scenario(&self, scenario: &ScenarioId) -> CoreResult<()>;

    fn unlock_map_lock(&self, map: &MapId, lock: &LockId) -> CoreResult<()>;

    fn add_gold(&self, amount: u64) -> CoreResult<()>;

    fn player_info(&self) -> PlayerInfo;

    fn set_player_name(&self, name: &str) -> CoreResult<()>;

    fn broadcast(&self, event: Event) -> CoreResult<()>;

    fn character_def(&self, id: &CharacterDefId) -> CoreResult<&CharacterDef> {
        self.definitions().character(id)
    }

    /// Copy of a dialog profile's memory, created on first access.
    fn dialog_state(&self, profile: &DialogProfileId) -> CoreResult<DialogProfileState>;

    /// Mutate a dialog profile's memory in place, created on first access.
    fn update_dialog_state(
        &self,
        profile: &DialogProfileId,
        update: &mut dyn FnMut(&mut DialogProfileState),
    ) -> CoreResult<()>;
}
