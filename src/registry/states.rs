//! State Registry
//!
//! Owns every mutable state object. Mirrors the definitions registry: loads
//! reject empty and duplicate ids, lookups reject unknown ones. Map and dialog
//! profile states are created on first need; `*_exists` is the one lookup
//! that treats absence as ordinary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::definitions::DefinitionRegistry;
use crate::defs::CharacterDef;
use crate::error::{CoreError, CoreResult};
use crate::ids::{CharacterDefId, CharacterStateId, DialogProfileId, MapId, ShopId};
use crate::state::{CharacterState, DialogProfileState, MapState, ShopkeeperState};

/// Length of the random suffix on non-unique character state ids
const STATE_ID_SUFFIX_LEN: usize = 8;

/// Every state object, for handing to a save layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub characters: Vec<CharacterState>,
    pub maps: Vec<MapState>,
    pub dialog_profiles: Vec<DialogProfileState>,
    pub shopkeepers: Vec<ShopkeeperState>,
}

#[derive(Debug, Clone, Default)]
pub struct StateRegistry {
    characters: BTreeMap<CharacterStateId, CharacterState>,
    maps: BTreeMap<MapId, MapState>,
    dialog_profiles: BTreeMap<DialogProfileId, DialogProfileState>,
    shopkeepers: BTreeMap<ShopId, ShopkeeperState>,
}

impl StateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Characters
    // ========================================================================

    /// State id for a new instance of `def`. Unique characters always get
    /// their def id; others get the def id plus a random suffix.
    pub fn new_char_state_id(&self, def: &CharacterDef) -> CoreResult<CharacterStateId> {
        if def.unique {
            return Ok(CharacterStateId::new(def.id.as_str()));
        }
        let suffix = Uuid::new_v4().simple().to_string();
        let id = CharacterStateId::new(format!(
            "{}_{}",
            def.id,
            &suffix[..STATE_ID_SUFFIX_LEN]
        ));
        if self.characters.contains_key(&id) {
            return Err(CoreError::invariant(format!(
                "generated character state id {} already exists",
                id
            )));
        }
        Ok(id)
    }

    /// Create and store a state for `def_id`, returning its id.
    pub fn create_character_state(
        &mut self,
        defs: &DefinitionRegistry,
        def_id: &CharacterDefId,
    ) -> CoreResult<CharacterStateId> {
        let def = defs.character(def_id)?;
        let id = self.new_char_state_id(def)?;
        let state = CharacterState::from_def(id.clone(), def, defs)?;
        self.load_character_state(state)?;
        Ok(id)
    }

    pub fn load_character_state(&mut self, state: CharacterState) -> CoreResult<()> {
        if state.id.is_empty() {
            return Err(CoreError::EmptyId { kind: "character state" });
        }
        if self.characters.contains_key(&state.id) {
            return Err(CoreError::duplicate("character state", &state.id));
        }
        debug!("Loaded character state {} ({})", state.id, state.def_id);
        self.characters.insert(state.id.clone(), state);
        Ok(())
    }

    pub fn character_state_exists(&self, id: &CharacterStateId) -> bool {
        self.characters.contains_key(id)
    }

    pub fn character_state(&self, id: &CharacterStateId) -> CoreResult<&CharacterState> {
        if id.is_empty() {
            return Err(CoreError::EmptyId { kind: "character state" });
        }
        self.characters
            .get(id)
            .ok_or_else(|| CoreError::not_found("character state", id))
    }

    pub fn character_state_mut(&mut self, id: &CharacterStateId) -> CoreResult<&mut CharacterState> {
        if id.is_empty() {
            return Err(CoreError::EmptyId { kind: "character state" });
        }
        self.characters
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found("character state", id))
    }

    pub fn remove_character_state(&mut self, id: &CharacterStateId) -> CoreResult<CharacterState> {
        self.characters
            .remove(id)
            .ok_or_else(|| CoreError::not_found("character state", id))
    }

    // ========================================================================
    // Maps
    // ========================================================================

    pub fn map_state_exists(&self, id: &MapId) -> bool {
        self.maps.contains_key(id)
    }

    /// Get the map's state, creating it from its def on first use.
    pub fn ensure_map_state(&mut self, defs: &DefinitionRegistry, id: &MapId) -> CoreResult<&mut MapState> {
        if !self.maps.contains_key(id) {
            let state = MapState::new(defs.map(id)?);
            info!("Created map state {}", id);
            self.maps.insert(id.clone(), state);
        }
        self.map_state_mut(id)
    }

    pub fn map_state(&self, id: &MapId) -> CoreResult<&MapState> {
        self.maps.get(id).ok_or_else(|| CoreError::not_found("map state", id))
    }

    pub fn map_state_mut(&mut self, id: &MapId) -> CoreResult<&mut MapState> {
        self.maps
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found("map state", id))
    }

    pub fn load_map_state(&mut self, state: MapState) -> CoreResult<()> {
        if state.id.is_empty() {
            return Err(CoreError::EmptyId { kind: "map state" });
        }
        if self.maps.contains_key(&state.id) {
            return Err(CoreError::duplicate("map state", &state.id));
        }
        self.maps.insert(state.id.clone(), state);
        Ok(())
    }

    // ========================================================================
    // Dialog profiles
    // ========================================================================

    pub fn dialog_profile_state_exists(&self, id: &DialogProfileId) -> bool {
        self.dialog_profiles.contains_key(id)
    }

    pub fn ensure_dialog_profile_state(
        &mut self,
        defs: &DefinitionRegistry,
        id: &DialogProfileId,
    ) -> CoreResult<&mut DialogProfileState> {
        if !self.dialog_profiles.contains_key(id) {
            defs.dialog_profile(id)?;
            self.dialog_profiles
                .insert(id.clone(), DialogProfileState::new(id.clone()));
        }
        self.dialog_profile_state_mut(id)
    }

    pub fn dialog_profile_state(&self, id: &DialogProfileId) -> CoreResult<&DialogProfileState> {
        self.dialog_profiles
            .get(id)
            .ok_or_else(|| CoreError::not_found("dialog profile state", id))
    }

    pub fn dialog_profile_state_mut(
        &mut self,
        id: &DialogProfileId,
    ) -> CoreResult<&mut DialogProfileState> {
        self.dialog_profiles
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found("dialog profile state", id))
    }

    pub fn load_dialog_profile_state(&mut self, state: DialogProfileState) -> CoreResult<()> {
        if state.profile_id.is_empty() {
            return Err(CoreError::EmptyId { kind: "dialog profile state" });
        }
        if self.dialog_profiles.contains_key(&state.profile_id) {
            return Err(CoreError::duplicate("dialog profile state", &state.profile_id));
        }
        self.dialog_profiles.insert(state.profile_id.clone(), state);
        Ok(())
    }

    // ========================================================================
    // Shopkeepers
    // ========================================================================

    pub fn ensure_shopkeeper_state(
        &mut self,
        defs: &DefinitionRegistry,
        id: &ShopId,
    ) -> CoreResult<&mut ShopkeeperState> {
        if !self.shopkeepers.contains_key(id) {
            let state = ShopkeeperState::new(defs.shopkeeper(id)?);
            self.shopkeepers.insert(id.clone(), state);
        }
        self.shopkeeper_state_mut(id)
    }

    pub fn shopkeeper_state_mut(&mut self, id: &ShopId) -> CoreResult<&mut ShopkeeperState> {
        self.shopkeepers
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found("shopkeeper state", id))
    }

    pub fn load_shopkeeper_state(&mut self, state: ShopkeeperState) -> CoreResult<()> {
        if state.shop_id.is_empty() {
            return Err(CoreError::EmptyId { kind: "shopkeeper state" });
        }
        if self.shopkeepers.contains_key(&state.shop_id) {
            return Err(CoreError::duplicate("shopkeeper state", &state.shop_id));
        }
        self.shopkeepers.insert(state.shop_id.clone(), state);
        Ok(())
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            characters: self.characters.values().cloned().collect(),
            maps: self.maps.values().cloned().collect(),
            dialog_profiles: self.dialog_profiles.values().cloned().collect(),
            shopkeepers: self.shopkeepers.values().cloned().collect(),
        }
    }

    pub fn from_snapshot(snapshot: StateSnapshot) -> CoreResult<Self> {
        let mut registry = Self::new();
        for state in snapshot.characters {
            registry.load_character_state(state)?;
        }
        for state in snapshot.maps {
            registry.load_map_state(state)?;
        }
        for state in snapshot.dialog_profiles {
            registry.load_dialog_profile_state(state)?;
        }
        for state in snapshot.shopkeepers {
            registry.load_shopkeeper_state(state)?;
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defs::{ItemDef, ItemKind, MapDef, ShopStock, ShopkeeperDef};
    use crate::dialog::DialogProfileDef;
    use crate::ids::{ItemId, LockId};

    fn defs() -> DefinitionRegistry {
        let mut defs = DefinitionRegistry::new();
        defs.load_character(CharacterDef::new("captain", "Captain Vell", true)).unwrap();
        defs.load_character(CharacterDef::new("guard", "Guard", false)).unwrap();
        defs.load_map(MapDef {
            id: MapId::new("keep"),
            display_name: "Keep".into(),
            locks: vec![LockId::new("gate")],
        })
        .unwrap();
        defs
    }

    #[test]
    fn test_unique_state_id_is_def_id() {
        let defs = defs();
        let mut states = StateRegistry::new();
        let captain = defs.character(&CharacterDefId::new("captain")).unwrap();

        for _ in 0..3 {
            assert_eq!(states.new_char_state_id(captain).unwrap().as_str(), "captain");
        }

        let id = states
            .create_character_state(&defs, &CharacterDefId::new("captain"))
            .unwrap();
        assert_eq!(id.as_str(), "captain");
        assert_eq!(states.new_char_state_id(captain).unwrap().as_str(), "captain");

        let err = states
            .create_character_state(&defs, &CharacterDefId::new("captain"))
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateId { .. }));
    }

    #[test]
    fn test_non_unique_ids_are_suffixed() {
        let defs = defs();
        let mut states = StateRegistry::new();
        let a = states.create_character_state(&defs, &CharacterDefId::new("guard")).unwrap();
        let b = states.create_character_state(&defs, &CharacterDefId::new("guard")).unwrap();

        assert_ne!(a, b);
        assert!(a.as_str().starts_with("guard_"));
        assert_eq!(a.as_str().len(), "guard_".len() + STATE_ID_SUFFIX_LEN);
        assert_eq!(states.character_state(&b).unwrap().def_id.as_str(), "guard");
    }

    #[test]
    fn test_lookup_failures() {
        let states = StateRegistry::new();
        assert!(matches!(
            states.character_state(&CharacterStateId::new("nobody")),
            Err(CoreError::NotFound { .. })
        ));
        assert!(matches!(
            states.character_state(&CharacterStateId::new("")),
            Err(CoreError::EmptyId { .. })
        ));
    }

    #[test]
    fn test_map_state_is_lazy() {
        let defs = defs();
        let mut states = StateRegistry::new();
        let keep = MapId::new("keep");

        assert!(!states.map_state_exists(&keep));
        states.ensure_map_state(&defs, &keep).unwrap().unlock(&LockId::new("gate")).unwrap();
        assert!(states.map_state_exists(&keep));
        // second ensure returns the same state, not a fresh one
        assert!(states
            .ensure_map_state(&defs, &keep)
            .unwrap()
            .is_unlocked(&LockId::new("gate"))
            .unwrap());
        assert!(states.ensure_map_state(&defs, &MapId::new("nowhere")).is_err());
    }

    #[test]
    fn test_remove_and_lazy_profile_and_shop_states() {
        let mut defs = defs();
        let profile: DialogProfileDef = toml::from_str(
            r#"
id = "captain_talk"
greeting = [{ text = "State your business." }]
"#,
        )
        .unwrap();
        defs.load_dialog_profile(profile).unwrap();
        defs.load_item(ItemDef::new("rope", "Rope", ItemKind::Misc, 3)).unwrap();
        defs.load_shopkeeper(ShopkeeperDef {
            id: ShopId::new("chandler"),
            shop_name: "Chandler".into(),
            base_gold: 20,
            stock: vec![ShopStock {
                item_id: ItemId::new("rope"),
                quantity: 4,
                restock_rate: 1,
            }],
        })
        .unwrap();
        let mut states = StateRegistry::new();

        let captain = states.create_character_state(&defs, &CharacterDefId::new("captain")).unwrap();
        assert_eq!(states.remove_character_state(&captain).unwrap().def_id.as_str(), "captain");
        assert!(states.remove_character_state(&captain).is_err());

        let profile = DialogProfileId::new("captain_talk");
        assert!(!states.dialog_profile_state_exists(&profile));
        assert!(states.dialog_profile_state(&profile).is_err());
        states.ensure_dialog_profile_state(&defs, &profile).unwrap();
        assert!(states.dialog_profile_state_exists(&profile));
        assert_eq!(states.dialog_profile_state(&profile).unwrap().profile_id, profile);

        let shop = ShopId::new("chandler");
        states.ensure_shopkeeper_state(&defs, &shop).unwrap().take_stock(&ItemId::new("rope"), 3).unwrap();
        let state = states.ensure_shopkeeper_state(&defs, &shop).unwrap();
        assert_eq!(state.quantity(&ItemId::new("rope")), 1);
        assert_eq!(state.gold, 20);
        assert!(states.ensure_shopkeeper_state(&defs, &ShopId::new("nowhere")).is_err());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let defs = defs();
        let mut states = StateRegistry::new();
        states.create_character_state(&defs, &CharacterDefId::new("captain")).unwrap();
        states.ensure_map_state(&defs, &MapId::new("keep")).unwrap();

        let snapshot = states.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: StateSnapshot = serde_json::from_str(&json).unwrap();
        let restored = StateRegistry::from_snapshot(parsed).unwrap();
        assert_eq!(restored.snapshot(), snapshot);

        let mut doubled = snapshot.clone();
        doubled.characters.extend(snapshot.characters.clone());
        assert!(StateRegistry::from_snapshot(doubled).is_err());
    }
}
