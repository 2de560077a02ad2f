//! Maps, scenarios and shopkeepers.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::ids::{
    CharacterDefId, DialogProfileId, ItemId, LockId, MapId, ScenarioId, ScheduleId, ShopId,
    TilePos,
};
use crate::registry::Definition;

// ============================================================================
// Maps
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapDef {
    pub id: MapId,
    pub display_name: String,
    /// Locks present on the map; all start locked
    #[serde(default)]
    pub locks: Vec<LockId>,
}

impl Definition for MapDef {
    type Id = MapId;
    const KIND: &'static str = "map";

    fn id(&self) -> &MapId {
        &self.id
    }

    fn validate(&self) -> CoreResult<()> {
        let mut seen = HashSet::new();
        for lock in &self.locks {
            if lock.is_empty() {
                return Err(CoreError::invalid(Self::KIND, &self.id, "lock id is empty"));
            }
            if !seen.insert(lock) {
                return Err(CoreError::invalid(
                    Self::KIND,
                    &self.id,
                    format!("duplicate lock {}", lock),
                ));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Scenarios
// ============================================================================

/// A character placed on a map when a scenario runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioCharacter {
    pub char_def_id: CharacterDefId,
    #[serde(default)]
    pub schedule_id: Option<ScheduleId>,
    /// Overrides the character def's own profile
    #[serde(default)]
    pub dialog_profile_id: Option<DialogProfileId>,
    pub spawn: TilePos,
}

/// A set of characters queued onto a map, spawned the next time it loads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDef {
    pub id: ScenarioId,
    pub map_id: MapId,
    pub characters: Vec<ScenarioCharacter>,
}

impl Definition for ScenarioDef {
    type Id = ScenarioId;
    const KIND: &'static str = "scenario";

    fn id(&self) -> &ScenarioId {
        &self.id
    }

    fn validate(&self) -> CoreResult<()> {
        if self.map_id.is_empty() {
            return Err(CoreError::invalid(Self::KIND, &self.id, "map id is empty"));
        }
        if self.characters.is_empty() {
            return Err(CoreError::invalid(Self::KIND, &self.id, "no characters"));
        }
        if self.characters.iter().any(|c| c.char_def_id.is_empty()) {
            return Err(CoreError::invalid(Self::KIND, &self.id, "character id is empty"));
        }
        Ok(())
    }
}

// ============================================================================
// Shopkeepers
// ============================================================================

/// An item stocked by a shop with its restock configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopStock {
    pub item_id: ItemId,
    /// Starting and maximum quantity
    pub quantity: u32,
    #[serde(default)]
    pub restock_rate: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShopkeeperDef {
    pub id: ShopId,
    pub shop_name: String,
    #[serde(default)]
    pub base_gold: u64,
    pub stock: Vec<ShopStock>,
}

impl Definition for ShopkeeperDef {
    type Id = ShopId;
    const KIND: &'static str = "shopkeeper";

    fn id(&self) -> &ShopId {
        &self.id
    }

    fn validate(&self) -> CoreResult<()> {
        if self.shop_name.is_empty() {
            return Err(CoreError::invalid(Self::KIND, &self.id, "shop name is empty"));
        }
        if self.stock.is_empty() {
            return Err(CoreError::invalid(Self::KIND, &self.id, "stock is empty"));
        }
        Ok(())
    }
}
