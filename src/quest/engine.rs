//! Quest Engine
//!
//! Purely reactive: every published event is offered to the engine, which
//! starts quests whose trigger matches, advances objectives, then runs at
//! most one stage reaction per active quest. Internal state is only borrowed
//! for short bookkeeping steps so actions may publish events that re-enter
//! the engine.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::definition::{QuestAction, QuestCondition, QuestReactionDef, TerminalStatus};
use super::objective::{self, ObjectiveUpdate};
use super::state::{ObjectiveProgress, QuestState, QuestStatus};
use crate::error::{CoreError, CoreResult};
use crate::event_bus::{Event, EventBus, event_types, keys};
use crate::ids::{ObjectiveId, QuestId, QuestStageId};
use crate::world::GameContext;

const MACHINE: &str = "quest engine";
pub const QUEST_ENGINE_SUBSCRIBER: &str = "quest_engine";

#[derive(Debug, Default)]
struct QuestBook {
    /// Started quests; anything absent is not started
    states: BTreeMap<QuestId, QuestState>,
    start_triggers_by_event: HashMap<String, Vec<QuestId>>,
    stage_reactions_by_event: HashMap<String, Vec<QuestId>>,
}

pub struct QuestEngine<C: GameContext> {
    ctx: C,
    book: RefCell<QuestBook>,
}

impl<C: GameContext + 'static> QuestEngine<C> {
    pub fn new(ctx: C) -> Rc<Self> {
        let engine = Rc::new(Self {
            ctx,
            book: RefCell::new(QuestBook::default()),
        });
        engine.rebuild_indices();
        info!("Quest engine ready ({} quests)", engine.ctx.definitions().quest_ids().len());
        engine
    }

    /// Receive every event published on `bus`.
    pub fn attach(self: &Rc<Self>, bus: &EventBus) -> CoreResult<()> {
        let weak = Rc::downgrade(self);
        bus.subscribe_all(QUEST_ENGINE_SUBSCRIBER, move |event| match weak.upgrade() {
            Some(engine) => engine.on_event(event),
            None => Ok(()),
        })
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn quest_status(&self, quest_id: &QuestId) -> CoreResult<QuestStatus> {
        self.ctx.definitions().quest(quest_id)?;
        Ok(self
            .book
            .borrow()
            .states
            .get(quest_id)
            .map(|s| s.status)
            .unwrap_or(QuestStatus::NotStarted))
    }

    pub fn quest_state(&self, quest_id: &QuestId) -> Option<QuestState> {
        self.book.borrow().states.get(quest_id).cloned()
    }

    pub fn current_stage(&self, quest_id: &QuestId) -> Option<QuestStageId> {
        self.book
            .borrow()
            .states
            .get(quest_id)
            .and_then(|s| s.current_stage.clone())
    }

    pub fn objective_progress(
        &self,
        quest_id: &QuestId,
        objective_id: &ObjectiveId,
    ) -> CoreResult<ObjectiveProgress> {
        let book = self.book.borrow();
        let state = book
            .states
            .get(quest_id)
            .ok_or_else(|| CoreError::misuse(MACHINE, format!("quest {} not started", quest_id)))?;
        state
            .objective(objective_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("objective", format!("{}/{}", quest_id, objective_id)))
    }

    /// Quest ids in a status bucket, sorted.
    pub fn quests_with_status(&self, status: QuestStatus) -> Vec<QuestId> {
        let book = self.book.borrow();
        self.ctx
            .definitions()
            .quest_ids()
            .into_iter()
            .filter(|id| book.states.get(id).map(|s| s.status).unwrap_or_default() == status)
            .collect()
    }

    /// Every started quest, for saving.
    pub fn quest_states(&self) -> Vec<QuestState> {
        self.book.borrow().states.values().cloned().collect()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Restore saved quest states. Each must name a known quest, be started,
    /// and (if active) sit on a stage that exists.
    pub fn load_quest_states(&self, states: Vec<QuestState>) -> CoreResult<()> {
        let defs = self.ctx.definitions();
        {
            let mut book = self.book.borrow_mut();
            for state in states {
                let def = defs.quest(&state.quest_id)?;
                if state.status == QuestStatus::NotStarted {
                    return Err(CoreError::invalid(
                        "quest state",
                        &state.quest_id,
                        "saved state cannot be not_started",
                    ));
                }
                if state.status == QuestStatus::Active {
                    let stage = state.current_stage.as_ref().ok_or_else(|| {
                        CoreError::invalid("quest state", &state.quest_id, "active without a stage")
                    })?;
                    def.stage(stage)?;
                }
                if book.states.contains_key(&state.quest_id) {
                    return Err(CoreError::duplicate("quest state", &state.quest_id));
                }
                book.states.insert(state.quest_id.clone(), state);
            }
        }
        self.rebuild_indices();
        Ok(())
    }

    pub fn start_quest(&self, quest_id: &QuestId) -> CoreResult<()> {
        let def = self.ctx.definitions().quest(quest_id)?;
        {
            let mut book = self.book.borrow_mut();
            if book.states.contains_key(quest_id) {
                return Err(CoreError::misuse(
                    MACHINE,
                    format!("start_quest({}) but it is already started", quest_id),
                ));
            }
            book.states.insert(quest_id.clone(), QuestState::start(def));
        }
        self.rebuild_indices();
        info!("Quest started: {} ({})", def.name, quest_id);

        self.ctx.broadcast(
            Event::new(event_types::QUEST_STARTED).with(keys::QUEST_ID, quest_id.as_str()),
        )?;
        self.enter_stage(quest_id, &def.start_stage)
    }

    pub fn complete_quest(&self, quest_id: &QuestId) -> CoreResult<()> {
        self.finish(quest_id, TerminalStatus::Complete)
    }

    pub fn fail_quest(&self, quest_id: &QuestId) -> CoreResult<()> {
        self.finish(quest_id, TerminalStatus::Fail)
    }

    fn finish(&self, quest_id: &QuestId, terminal: TerminalStatus) -> CoreResult<()> {
        {
            let mut book = self.book.borrow_mut();
            let state = book
                .states
                .get_mut(quest_id)
                .filter(|s| s.status == QuestStatus::Active)
                .ok_or_else(|| {
                    CoreError::misuse(MACHINE, format!("finishing {} which is not active", quest_id))
                })?;
            match terminal {
                TerminalStatus::Complete => state.complete(),
                TerminalStatus::Fail => state.fail(),
            }
        }
        self.rebuild_indices();

        let event_type = match terminal {
            TerminalStatus::Complete => {
                info!("Quest completed: {}", quest_id);
                event_types::QUEST_COMPLETED
            }
            TerminalStatus::Fail => {
                info!("Quest failed: {}", quest_id);
                event_types::QUEST_FAILED
            }
        };
        self.ctx
            .broadcast(Event::new(event_type).with(keys::QUEST_ID, quest_id.as_str()))
    }

    /// Record the new stage, then fire its entry actions.
    fn enter_stage(&self, quest_id: &QuestId, stage_id: &QuestStageId) -> CoreResult<()> {
        let def = self.ctx.definitions().quest(quest_id)?;
        let stage = def.stage(stage_id)?;
        {
            let mut book = self.book.borrow_mut();
            let state = book
                .states
                .get_mut(quest_id)
                .ok_or_else(|| CoreError::invariant(format!("entering stage of unstarted {}", quest_id)))?;
            state.current_stage = Some(stage_id.clone());
        }
        self.rebuild_indices();
        info!("Quest {} entered stage {} ({})", quest_id, stage_id, stage.title);

        self.fire_actions(quest_id, &stage.on_enter)
    }

    // ========================================================================
    // Events
    // ========================================================================

    pub fn on_event(&self, event: &Event) -> CoreResult<()> {
        // Quests started by this event do not also react to it.
        let reacting: Vec<QuestId> = self
            .book
            .borrow()
            .stage_reactions_by_event
            .get(&event.event_type)
            .cloned()
            .unwrap_or_default();

        self.run_start_triggers(event)?;
        self.run_objectives(event)?;

        for quest_id in reacting {
            self.run_reaction(&quest_id, event)?;
        }
        Ok(())
    }

    fn run_start_triggers(&self, event: &Event) -> CoreResult<()> {
        let candidates = self
            .book
            .borrow()
            .start_triggers_by_event
            .get(&event.event_type)
            .cloned()
            .unwrap_or_default();

        for quest_id in candidates {
            if self.quest_status(&quest_id)? != QuestStatus::NotStarted {
                continue;
            }
            let def = self.ctx.definitions().quest(&quest_id)?;
            if self.conditions_hold(&quest_id, &def.start_trigger.conditions, event)? {
                self.start_quest(&quest_id)?;
            }
        }
        Ok(())
    }

    fn run_objectives(&self, event: &Event) -> CoreResult<()> {
        let defs = self.ctx.definitions();
        let updates: Vec<ObjectiveUpdate> = {
            let mut book = self.book.borrow_mut();
            let mut updates = Vec::new();
            for state in book.states.values_mut() {
                if state.status != QuestStatus::Active {
                    continue;
                }
                let def = defs.quest(&state.quest_id)?;
                updates.extend(objective::apply_event(def, state, event));
            }
            updates
        };

        for update in updates {
            debug!(
                "Quest {} objective {}: {}/{}",
                update.quest_id, update.objective_id, update.new_progress, update.target
            );
            if update.objective_completed {
                info!("Quest {} objective {} complete", update.quest_id, update.objective_id);
                self.ctx.broadcast(
                    Event::new(event_types::QUEST_OBJECTIVE_COMPLETED)
                        .with(keys::QUEST_ID, update.quest_id.as_str())
                        .with(keys::OBJECTIVE_ID, update.objective_id.as_str()),
                )?;
            }
        }
        Ok(())
    }

    fn run_reaction(&self, quest_id: &QuestId, event: &Event) -> CoreResult<()> {
        let Some(stage_id) = self.active_stage(quest_id) else {
            return Ok(());
        };
        let def = self.ctx.definitions().quest(quest_id)?;
        let stage = def.stage(&stage_id)?;

        let mut chosen: Option<&QuestReactionDef> = None;
        for reaction in stage.reactions.iter().filter(|r| r.subscribe_event == event.event_type) {
            if self.conditions_hold(quest_id, &reaction.conditions, event)? {
                chosen = Some(reaction);
                break;
            }
        }
        let Some(reaction) = chosen else {
            return Ok(());
        };

        debug!("Quest {} stage {} reacting to {}", quest_id, stage_id, event.event_type);
        self.fire_actions(quest_id, &reaction.actions)?;

        if self.active_stage(quest_id).as_ref() != Some(&stage_id) {
            warn!("Quest {} moved on while its reaction fired; skipping transition", quest_id);
            return Ok(());
        }
        match (&reaction.next_stage, reaction.terminal_status) {
            (Some(next), _) => self.enter_stage(quest_id, next),
            (None, Some(terminal)) => self.finish(quest_id, terminal),
            (None, None) => Err(CoreError::invariant(format!(
                "quest {} reaction without an outcome passed validation",
                quest_id
            ))),
        }
    }

    fn active_stage(&self, quest_id: &QuestId) -> Option<QuestStageId> {
        self.book
            .borrow()
            .states
            .get(quest_id)
            .filter(|s| s.status == QuestStatus::Active)
            .and_then(|s| s.current_stage.clone())
    }

    // ========================================================================
    // Conditions and actions
    // ========================================================================

    fn conditions_hold(
        &self,
        quest_id: &QuestId,
        conditions: &[QuestCondition],
        event: &Event,
    ) -> CoreResult<bool> {
        for cond in conditions {
            let holds = match cond {
                QuestCondition::EventData { key, equals } => match event.get(key) {
                    Some(Value::String(s)) => s == equals,
                    Some(other) => other.to_string() == *equals,
                    None => false,
                },
                QuestCondition::QuestStatus { quest, status } => self.quest_status(quest)? == *status,
                QuestCondition::ObjectivesComplete => self
                    .book
                    .borrow()
                    .states
                    .get(quest_id)
                    .is_some_and(|s| s.all_objectives_complete()),
            };
            if !holds {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn fire_actions(&self, quest_id: &QuestId, actions: &[QuestAction]) -> CoreResult<()> {
        for action in actions {
            debug!("Quest {} action {:?}", quest_id, action);
            match action {
                QuestAction::AssignTask { character, task } => {
                    self.ctx.assign_task_to_npc(character, task)?
                }
                QuestAction::QueueScenario { scenario } => self.ctx.queue_scenario(scenario)?,
                QuestAction::UnlockMapLock { map, lock } => self.ctx.unlock_map_lock(map, lock)?,
                QuestAction::AddGold { amount } => self.ctx.add_gold(*amount)?,
                QuestAction::Broadcast { event_type, data } => self.ctx.broadcast(Event {
                    event_type: event_type.clone(),
                    data: data.clone(),
                })?,
            }
        }
        Ok(())
    }

    fn rebuild_indices(&self) {
        let defs = self.ctx.definitions();
        let mut book = self.book.borrow_mut();
        let mut triggers: HashMap<String, Vec<QuestId>> = HashMap::new();
        let mut reactions: HashMap<String, Vec<QuestId>> = HashMap::new();

        for def in defs.quests() {
            match book.states.get(&def.id) {
                None => triggers
                    .entry(def.start_trigger.event_type.clone())
                    .or_default()
                    .push(def.id.clone()),
                Some(state) if state.status == QuestStatus::Active => {
                    let Some(stage) = state.current_stage.as_ref().and_then(|s| def.stages.get(s)) else {
                        continue;
                    };
                    for reaction in &stage.reactions {
                        let ids = reactions.entry(reaction.subscribe_event.clone()).or_default();
                        if !ids.contains(&def.id) {
                            ids.push(def.id.clone());
                        }
                    }
                }
                Some(_) => {}
            }
        }

        for ids in triggers.values_mut().chain(reactions.values_mut()) {
            ids.sort();
        }
        book.start_triggers_by_event = triggers;
        book.stage_reactions_by_event = reactions;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::defs::CharacterDef;
    use crate::ids::CharacterDefId;
    use crate::registry::DefinitionRegistry;
    use crate::world::{PlayerInfo, World};
    use std::sync::Arc;

    const KILL_WOLF: &str = r#"
id = "kill_wolf"
name = "Wolf at the Door"
start_stage = "hunt"

[start_trigger]
event_type = "talk"
conditions = [{ type = "event_data", key = "target", equals = "farmer_jon" }]

[[objectives]]
id = "wolf_dead"
type = "kill"
target = "wolf_01"

[stages.hunt]
title = "Hunt the wolf"
on_enter = [{ type = "broadcast", event_type = "hunt_begun" }]

[[stages.hunt.reactions]]
subscribe_event = "talk"
conditions = [
    { type = "event_data", key = "target", equals = "farmer_jon" },
    { type = "objectives_complete" },
]
actions = [{ type = "add_gold", amount = 25 }]
terminal_status = "complete"

[[stages.hunt.reactions]]
subscribe_event = "kill"
conditions = [{ type = "event_data", key = "target", equals = "farmer_jon" }]
terminal_status = "fail"
"#;

    const FOLLOW_UP: &str = r#"
id = "wolf_pelt"
name = "A Fine Pelt"
start_stage = "sell"

[start_trigger]
event_type = "quest_completed"
conditions = [{ type = "quest_status", quest = "kill_wolf", status = "completed" }]

[stages.sell]
title = "Sell the pelt"

[[stages.sell.reactions]]
subscribe_event = "get_item"
terminal_status = "complete"
"#;

    fn setup() -> (World, Rc<QuestEngine<World>>) {
        let mut defs = DefinitionRegistry::new();
        defs.load_character(CharacterDef::new("player", "Player", true)).unwrap();
        defs.load_quest(toml::from_str(KILL_WOLF).unwrap()).unwrap();
        defs.load_quest(toml::from_str(FOLLOW_UP).unwrap()).unwrap();
        let world = World::new(
            Arc::new(defs),
            CoreConfig::default(),
            &CharacterDefId::new("player"),
            PlayerInfo::default(),
        )
        .unwrap();
        let engine = QuestEngine::new(world.clone());
        engine.attach(&world.bus()).unwrap();
        (world, engine)
    }

    fn kill(target: &str) -> Event {
        Event::new(event_types::KILL).with(keys::TARGET, target)
    }

    fn talk(target: &str) -> Event {
        Event::new(event_types::TALK).with(keys::TARGET, target)
    }

    #[test]
    fn test_start_trigger_conditions() {
        let (world, engine) = setup();
        let quest = QuestId::new("kill_wolf");

        world.broadcast(talk("innkeeper")).unwrap();
        assert_eq!(engine.quest_status(&quest).unwrap(), QuestStatus::NotStarted);

        world.broadcast(talk("farmer_jon")).unwrap();
        assert_eq!(engine.quest_status(&quest).unwrap(), QuestStatus::Active);
        assert_eq!(engine.current_stage(&quest), Some(QuestStageId::new("hunt")));
        // the starting event did not also satisfy the hunt stage's talk reaction
        assert!(engine.quest_state(&quest).unwrap().started_at.is_some());
    }

    #[test]
    fn test_objective_completes_once_and_stays_complete() {
        let (world, engine) = setup();
        let quest = QuestId::new("kill_wolf");
        let objective = ObjectiveId::new("wolf_dead");
        engine.start_quest(&quest).unwrap();

        world.broadcast(kill("wolf_01")).unwrap();
        assert!(engine.objective_progress(&quest, &objective).unwrap().completed);

        world.broadcast(kill("wolf_01")).unwrap();
        let progress = engine.objective_progress(&quest, &objective).unwrap();
        assert!(progress.completed);
        assert_eq!(progress.current, 1);
        assert_eq!(engine.quest_status(&quest).unwrap(), QuestStatus::Active);
    }

    #[test]
    fn test_reaction_completes_and_chains_next_quest() {
        let (world, engine) = setup();
        let quest = QuestId::new("kill_wolf");
        engine.start_quest(&quest).unwrap();

        // objectives not complete yet, so reporting back does nothing
        world.broadcast(talk("farmer_jon")).unwrap();
        assert_eq!(engine.quest_status(&quest).unwrap(), QuestStatus::Active);

        world.broadcast(kill("wolf_01")).unwrap();
        world.broadcast(talk("farmer_jon")).unwrap();

        assert_eq!(engine.quest_status(&quest).unwrap(), QuestStatus::Completed);
        assert_eq!(world.player_money().unwrap(), 25);
        assert_eq!(
            engine.quest_status(&QuestId::new("wolf_pelt")).unwrap(),
            QuestStatus::Active
        );
        assert_eq!(engine.quests_with_status(QuestStatus::Completed), vec![quest]);
    }

    #[test]
    fn test_fail_reaction() {
        let (world, engine) = setup();
        let quest = QuestId::new("kill_wolf");
        engine.start_quest(&quest).unwrap();

        world.broadcast(kill("farmer_jon")).unwrap();
        assert_eq!(engine.quest_status(&quest).unwrap(), QuestStatus::Failed);
        assert!(engine.quest_state(&quest).unwrap().finished_at.is_some());
        assert!(engine.complete_quest(&quest).is_err());
    }

    #[test]
    fn test_lifecycle_misuse() {
        let (_world, engine) = setup();
        let quest = QuestId::new("kill_wolf");

        assert!(engine.complete_quest(&quest).is_err());
        engine.start_quest(&quest).unwrap();
        assert!(engine.start_quest(&quest).is_err());
        assert!(engine.start_quest(&QuestId::new("unknown")).is_err());
        assert!(engine.quest_status(&QuestId::new("unknown")).is_err());

        engine.fail_quest(&quest).unwrap();
        assert_eq!(engine.quest_status(&quest).unwrap(), QuestStatus::Failed);
        assert!(engine.quest_state(&quest).unwrap().finished_at.is_some());
        assert!(engine.fail_quest(&quest).is_err());
    }

    #[test]
    fn test_load_quest_states() {
        let (_world, engine) = setup();
        let (_other_world, other) = setup();
        engine.start_quest(&QuestId::new("kill_wolf")).unwrap();
        let saved = engine.quest_states();

        other.load_quest_states(saved.clone()).unwrap();
        assert_eq!(
            other.quest_status(&QuestId::new("kill_wolf")).unwrap(),
            QuestStatus::Active
        );
        assert!(other.load_quest_states(saved.clone()).is_err());

        let mut not_started = saved[0].clone();
        not_started.status = QuestStatus::NotStarted;
        let (_w, fresh) = setup();
        assert!(fresh.load_quest_states(vec![not_started]).is_err());
    }
}
