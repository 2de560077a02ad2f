//! World
//!
//! The single-threaded game side: shared definitions, the state registry,
//! the event bus, the player and the clock, plus the coordinator of the map
//! currently loaded. `World` is a cheap handle; clones share everything.
//!
//! No `RefCell` borrow is held across [`EventBus::publish`], so subscribers
//! may call straight back into the world.

mod clock;
mod context;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use tracing::{info, warn};

pub use clock::{GameClock, MINUTES_PER_DAY, MINUTES_PER_HOUR};
pub use context::{GameContext, PlayerInfo};

use crate::config::CoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::event_bus::{Event, EventBus, event_types, keys, npc_assign_task_type};
use crate::ids::{CharacterDefId, CharacterStateId, DialogProfileId, LockId, MapId, ScenarioId};
use crate::npc::{DialogRequest, NavGrid, NpcCoordinator, NpcSpawn, TaskDef};
use crate::registry::{DefinitionRegistry, StateRegistry, StateSnapshot};
use crate::state::DialogProfileState;

struct ActiveMap {
    coordinator: Arc<NpcCoordinator>,
    /// Assign-task subscriptions of the map's unique NPCs
    subscriptions: Vec<String>,
}

/// What a map load has set up so far, for rollback.
#[derive(Default)]
struct MapSpawn {
    created_states: Vec<CharacterStateId>,
    subscriptions: Vec<String>,
}

#[derive(Clone)]
pub struct World {
    defs: Arc<DefinitionRegistry>,
    config: Arc<CoreConfig>,
    states: Rc<RefCell<StateRegistry>>,
    bus: Rc<EventBus>,
    player: Rc<RefCell<PlayerInfo>>,
    player_state: CharacterStateId,
    clock: Rc<RefCell<GameClock>>,
    active_map: Rc<RefCell<Option<ActiveMap>>>,
}

impl World {
    /// Build a world and create the player's character state from
    /// `player_def`.
    pub fn new(
        defs: Arc<DefinitionRegistry>,
        config: CoreConfig,
        player_def: &CharacterDefId,
        player: PlayerInfo,
    ) -> CoreResult<Self> {
        config.validate()?;
        let mut states = StateRegistry::new();
        let player_state = states.create_character_state(&defs, player_def)?;
        info!("World ready, player state {}", player_state);

        Ok(Self {
            defs,
            config: Arc::new(config),
            states: Rc::new(RefCell::new(states)),
            bus: Rc::new(EventBus::new()),
            player: Rc::new(RefCell::new(player)),
            player_state,
            clock: Rc::new(RefCell::new(GameClock::default())),
            active_map: Rc::new(RefCell::new(None)),
        })
    }

    pub fn bus(&self) -> Rc<EventBus> {
        Rc::clone(&self.bus)
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn player_state_id(&self) -> &CharacterStateId {
        &self.player_state
    }

    pub fn player_money(&self) -> CoreResult<u64> {
        Ok(self.states.borrow().character_state(&self.player_state)?.money())
    }

    /// Read access to the state registry. `f` must not publish events.
    pub fn with_states<R>(&self, f: impl FnOnce(&StateRegistry) -> R) -> R {
        f(&self.states.borrow())
    }

    /// Write access to the state registry. `f` must not publish events.
    pub fn with_states_mut<R>(&self, f: impl FnOnce(&mut StateRegistry) -> R) -> R {
        f(&mut self.states.borrow_mut())
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.states.borrow().snapshot()
    }

    // ========================================================================
    // Time
    // ========================================================================

    pub fn clock(&self) -> GameClock {
        *self.clock.borrow()
    }

    pub fn set_clock(&self, clock: GameClock) {
        *self.clock.borrow_mut() = clock;
    }

    /// Move the clock forward, publishing `time_pass` for every hour entered.
    pub fn advance_time(&self, minutes: u32) -> CoreResult<()> {
        let hours = self.clock.borrow_mut().advance(minutes);
        for hour in hours {
            self.broadcast(Event::new(event_types::TIME_PASS).with(keys::HOUR, hour))?;
        }
        Ok(())
    }

    // ========================================================================
    // Maps
    // ========================================================================

    /// Load a map: run its queued scenarios into a fresh coordinator, wire up
    /// assign-task events for its unique NPCs and publish `visit_map`. Any
    /// previously loaded map is unloaded first. Starting the background loop
    /// is left to the caller.
    ///
    /// On failure the scenarios go back on the queue and the character
    /// states and subscriptions made so far are removed.
    pub fn load_map(&self, map_id: &MapId, grid: NavGrid) -> CoreResult<Arc<NpcCoordinator>> {
        self.unload_map();

        let scenarios = self
            .states
            .borrow_mut()
            .ensure_map_state(&self.defs, map_id)?
            .take_queued_scenarios();

        let coordinator = NpcCoordinator::new(map_id.clone(), grid, self.config.npc.clone());
        let mut spawn = MapSpawn::default();
        if let Err(e) = self.run_scenarios(map_id, &coordinator, &scenarios, &mut spawn) {
            warn!("Loading map {} failed, rolling back: {}", map_id, e);
            self.roll_back_load(map_id, scenarios, spawn);
            return Err(e);
        }

        *self.active_map.borrow_mut() = Some(ActiveMap {
            coordinator: Arc::clone(&coordinator),
            subscriptions: spawn.subscriptions,
        });
        info!("Loaded map {} with {} NPCs", map_id, coordinator.len());
        self.broadcast(Event::new(event_types::VISIT_MAP).with(keys::MAP_ID, map_id.as_str()))?;
        Ok(coordinator)
    }

    fn run_scenarios(
        &self,
        map_id: &MapId,
        coordinator: &Arc<NpcCoordinator>,
        scenarios: &[ScenarioId],
        spawn: &mut MapSpawn,
    ) -> CoreResult<()> {
        for scenario_id in scenarios {
            let scenario = self.defs.scenario(scenario_id)?;
            if &scenario.map_id != map_id {
                return Err(CoreError::invariant(format!(
                    "scenario {} targets {} but was queued on {}",
                    scenario_id, scenario.map_id, map_id
                )));
            }
            info!("Running scenario {} on {}", scenario_id, map_id);

            for character in &scenario.characters {
                let def = self.defs.character(&character.char_def_id)?;
                let npc_id = self.spawn_character_state(&def.id, def.unique, spawn)?;
                let schedule = character
                    .schedule_id
                    .as_ref()
                    .map(|id| self.defs.schedule(id).cloned())
                    .transpose()?;
                coordinator.add_npc(NpcSpawn {
                    npc_id: npc_id.clone(),
                    def_id: def.id.clone(),
                    position: character.spawn,
                    schedule,
                    dialog_profile: character
                        .dialog_profile_id
                        .clone()
                        .or_else(|| def.dialog_profile_id.clone()),
                })?;
                if def.unique {
                    spawn
                        .subscriptions
                        .push(coordinator.subscribe_npc_events(&self.bus, &npc_id)?);
                }
            }
        }
        Ok(())
    }

    fn roll_back_load(&self, map_id: &MapId, scenarios: Vec<ScenarioId>, spawn: MapSpawn) {
        for sub in &spawn.subscriptions {
            self.bus.unsubscribe(sub);
        }
        let mut states = self.states.borrow_mut();
        for id in &spawn.created_states {
            if let Err(e) = states.remove_character_state(id) {
                warn!("Rollback of {} could not remove {}: {}", map_id, id, e);
            }
        }
        match states.map_state_mut(map_id) {
            Ok(map) => map.restore_queued_scenarios(scenarios),
            Err(e) => warn!("Rollback of {} could not restore its scenarios: {}", map_id, e),
        }
    }

    /// Unique characters keep one state across maps; others get a new one
    /// each spawn.
    fn spawn_character_state(
        &self,
        def_id: &CharacterDefId,
        unique: bool,
        spawn: &mut MapSpawn,
    ) -> CoreResult<CharacterStateId> {
        let mut states = self.states.borrow_mut();
        let existing = CharacterStateId::new(def_id.as_str());
        if existing == self.player_state {
            return Err(CoreError::invalid(
                "scenario character",
                def_id,
                "is the player character",
            ));
        }
        if unique && states.character_state_exists(&existing) {
            return Ok(existing);
        }
        let id = states.create_character_state(&self.defs, def_id)?;
        spawn.created_states.push(id.clone());
        Ok(id)
    }

    /// Stop the loaded map's background loop and drop its NPC subscriptions.
    /// Returns the coordinator so an async caller can join its loop.
    pub fn unload_map(&self) -> Option<Arc<NpcCoordinator>> {
        let active = self.active_map.borrow_mut().take()?;
        active.coordinator.stop_background_jobs();
        for sub in &active.subscriptions {
            self.bus.unsubscribe(sub);
        }
        info!("Unloaded map {}", active.coordinator.map_id());
        Some(active.coordinator)
    }

    pub fn active_coordinator(&self) -> Option<Arc<NpcCoordinator>> {
        self.active_map
            .borrow()
            .as_ref()
            .map(|m| Arc::clone(&m.coordinator))
    }

    /// Run one NPC frame on the loaded map at the clock's hour.
    pub fn update_frame(&self) -> CoreResult<Vec<DialogRequest>> {
        let Some(coordinator) = self.active_coordinator() else {
            return Err(CoreError::misuse("world", "no map loaded"));
        };
        coordinator.update_frame(self.clock().hour())
    }
}

impl GameContext for World {
    fn definitions(&self) -> &DefinitionRegistry {
        &self.defs
    }

    fn assign_task_to_npc(&self, npc: &CharacterDefId, task: &TaskDef) -> CoreResult<()> {
        let def = self.defs.character(npc)?;
        if !def.unique {
            return Err(CoreError::invalid(
                "character",
                npc,
                "tasks can only be assigned to unique characters",
            ));
        }
        let payload = serde_json::to_value(task)
            .map_err(|e| CoreError::invariant(format!("task {} did not serialize: {}", task.task_id, e)))?;
        self.broadcast(Event::new(npc_assign_task_type(npc)).with(keys::TASK_DEF, payload))
    }

    fn queue_scenario(&self, scenario: &ScenarioId) -> CoreResult<()> {
        let map_id = self.defs.scenario(scenario)?.map_id.clone();
        self.states
            .borrow_mut()
            .ensure_map_state(&self.defs, &map_id)?
            .queue_scenario(scenario.clone())
    }

    fn unlock_map_lock(&self, map: &MapId, lock: &LockId) -> CoreResult<()> {
        self.states
            .borrow_mut()
            .ensure_map_state(&self.defs, map)?
            .unlock(lock)
    }

    fn add_gold(&self, amount: u64) -> CoreResult<()> {
        self.states
            .borrow_mut()
            .character_state_mut(&self.player_state)?
            .earn_money(amount, &self.config.economy)
    }

    fn player_info(&self) -> PlayerInfo {
        self.player.borrow().clone()
    }

    fn set_player_name(&self, name: &str) -> CoreResult<()> {
        if name.trim().is_empty() {
            return Err(CoreError::misuse("player", "name is empty"));
        }
        info!("Player name set to {}", name);
        self.player.borrow_mut().player_name = name.to_string();
        Ok(())
    }

    fn broadcast(&self, event: Event) -> CoreResult<()> {
        self.bus.publish(event)
    }

    fn dialog_state(&self, profile: &DialogProfileId) -> CoreResult<DialogProfileState> {
        Ok(self
            .states
            .borrow_mut()
            .ensure_dialog_profile_state(&self.defs, profile)?
            .clone())
    }

    fn update_dialog_state(
        &self,
        profile: &DialogProfileId,
        update: &mut dyn FnMut(&mut DialogProfileState),
    ) -> CoreResult<()> {
        let mut states = self.states.borrow_mut();
        update(states.ensure_dialog_profile_state(&self.defs, profile)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defs::{CharacterDef, MapDef, ScenarioCharacter, ScenarioDef};
    use crate::error::ErrorCategory;
    use crate::ids::TilePos;
    use crate::npc::TaskPriority;
    use serde_json::json;

    fn world() -> World {
        let mut defs = DefinitionRegistry::new();
        defs.load_character(CharacterDef::new("player", "Player", true)).unwrap();
        defs.load_character(CharacterDef::new("harbormaster", "Harbormaster", true)).unwrap();
        defs.load_character(CharacterDef::new("dockhand", "Dockhand", false)).unwrap();
        defs.load_map(MapDef {
            id: MapId::new("harbor"),
            display_name: "Harbor".into(),
            locks: vec![LockId::new("warehouse")],
        })
        .unwrap();
        defs.load_scenario(ScenarioDef {
            id: ScenarioId::new("morning_shift"),
            map_id: MapId::new("harbor"),
            characters: vec![
                ScenarioCharacter {
                    char_def_id: CharacterDefId::new("harbormaster"),
                    schedule_id: None,
                    dialog_profile_id: None,
                    spawn: TilePos::new(0, 0),
                },
                ScenarioCharacter {
                    char_def_id: CharacterDefId::new("dockhand"),
                    schedule_id: None,
                    dialog_profile_id: None,
                    spawn: TilePos::new(1, 0),
                },
            ],
        })
        .unwrap();
        defs.load_scenario(ScenarioDef {
            id: ScenarioId::new("crowded_quay"),
            map_id: MapId::new("harbor"),
            characters: vec![ScenarioCharacter {
                char_def_id: CharacterDefId::new("dockhand"),
                schedule_id: None,
                dialog_profile_id: None,
                spawn: TilePos::new(0, 0),
            }],
        })
        .unwrap();
        World::new(
            Arc::new(defs),
            CoreConfig::default(),
            &CharacterDefId::new("player"),
            PlayerInfo::default(),
        )
        .unwrap()
    }

    fn record(world: &World, event_type: &str) -> Rc<RefCell<Vec<Event>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        world
            .bus()
            .subscribe(&format!("test_{}", event_type), event_type, move |e| {
                sink.borrow_mut().push(e.clone());
                Ok(())
            })
            .unwrap();
        log
    }

    #[test]
    fn test_queue_scenario_and_load_map() {
        let world = world();
        let visits = record(&world, event_types::VISIT_MAP);

        world.queue_scenario(&ScenarioId::new("morning_shift")).unwrap();
        assert!(world.queue_scenario(&ScenarioId::new("morning_shift")).is_err());
        assert!(world.with_states(|s| s.map_state_exists(&MapId::new("harbor"))));

        let coordinator = world.load_map(&MapId::new("harbor"), NavGrid::open(4, 4)).unwrap();
        assert_eq!(coordinator.len(), 2);
        assert_eq!(visits.borrow().len(), 1);
        assert_eq!(visits.borrow()[0].get_str(keys::MAP_ID), Some("harbor"));
        assert!(world.with_states(|s| s.map_state(&MapId::new("harbor")).unwrap().queued_scenarios.is_empty()));

        // unique character keeps its state id; the dockhand got a suffixed one
        let ids = coordinator.npc_ids();
        assert!(ids.contains(&CharacterStateId::new("harbormaster")));
        assert!(ids.iter().any(|id| id.as_str().starts_with("dockhand_")));
    }

    #[test]
    fn test_unique_state_reused_across_loads() {
        let world = world();
        world.queue_scenario(&ScenarioId::new("morning_shift")).unwrap();
        world.load_map(&MapId::new("harbor"), NavGrid::open(4, 4)).unwrap();
        world.queue_scenario(&ScenarioId::new("morning_shift")).unwrap();
        let coordinator = world.load_map(&MapId::new("harbor"), NavGrid::open(4, 4)).unwrap();

        assert_eq!(coordinator.len(), 2);
        // player, one harbormaster, two dockhands
        assert_eq!(world.snapshot().characters.len(), 4);
    }

    #[test]
    fn test_failed_load_restores_queue_states_and_bus() {
        let world = world();
        let harbor = MapId::new("harbor");
        world.queue_scenario(&ScenarioId::new("morning_shift")).unwrap();
        world.queue_scenario(&ScenarioId::new("crowded_quay")).unwrap();

        // the quay dockhand spawns onto the harbormaster's tile
        for _ in 0..2 {
            let err = world.load_map(&harbor, NavGrid::open(4, 4)).unwrap_err();
            assert_eq!(err.category(), ErrorCategory::Misuse);

            let queued = world.with_states(|s| s.map_state(&harbor).unwrap().queued_scenarios.clone());
            assert_eq!(
                queued,
                vec![ScenarioId::new("morning_shift"), ScenarioId::new("crowded_quay")]
            );
            assert_eq!(world.snapshot().characters.len(), 1);
            assert!(!world.bus().is_subscribed("npc_coordinator_harbor_harbormaster_assign_task"));
            assert!(world.active_coordinator().is_none());
        }
    }

    #[test]
    fn test_assign_task_reaches_npc_until_unload() {
        let world = world();
        world.queue_scenario(&ScenarioId::new("morning_shift")).unwrap();
        let coordinator = world.load_map(&MapId::new("harbor"), NavGrid::open(4, 4)).unwrap();

        let task = TaskDef::new("goto", TaskPriority::Assigned, json!({ "x": 3, "y": 3 }));
        world.assign_task_to_npc(&CharacterDefId::new("harbormaster"), &task).unwrap();
        let view = coordinator.npc(&CharacterStateId::new("harbormaster")).unwrap();
        assert_eq!(view.task_id.unwrap().as_str(), "goto");

        assert!(
            world
                .assign_task_to_npc(&CharacterDefId::new("dockhand"), &task)
                .is_err()
        );

        let unloaded = world.unload_map().unwrap();
        assert!(Arc::ptr_eq(&unloaded, &coordinator));
        assert!(world.active_coordinator().is_none());
        assert!(world.update_frame().is_err());
        // nobody listens any more; publishing still succeeds
        world.assign_task_to_npc(&CharacterDefId::new("harbormaster"), &task).unwrap();
    }

    #[test]
    fn test_time_pass_per_hour() {
        let world = world();
        let ticks = record(&world, event_types::TIME_PASS);
        world.set_clock(GameClock::at(6, 45).unwrap());

        world.advance_time(90).unwrap();

        let hours: Vec<_> = ticks.borrow().iter().filter_map(|e| e.get_u64(keys::HOUR)).collect();
        assert_eq!(hours, vec![7, 8]);
        assert_eq!(world.clock().hour(), 8);
    }

    #[test]
    fn test_gold_locks_and_player() {
        let world = world();
        world.add_gold(37).unwrap();
        assert_eq!(world.player_money().unwrap(), 37);
        let player = world.player_state_id().clone();
        world
            .with_states_mut(|s| s.remove_character_state(&player))
            .unwrap();
        assert!(world.player_money().is_err());

        let harbor = MapId::new("harbor");
        world.unlock_map_lock(&harbor, &LockId::new("warehouse")).unwrap();
        assert!(world.with_states(|s| s.map_state(&harbor).unwrap().is_unlocked(&LockId::new("warehouse")).unwrap()));
        assert!(world.unlock_map_lock(&harbor, &LockId::new("vault")).is_err());

        assert!(world.set_player_name("  ").is_err());
        world.set_player_name("Mira").unwrap();
        assert_eq!(world.player_info().player_name, "Mira");
    }
}
