//! Quest Definition Structures
//!
//! A quest is a graph of stages. Each stage owns reactions: "on event E, if
//! conditions C hold, fire actions A, then move to stage S or end with
//! terminal status T". Objectives are a separate counter-based tracker.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::state::QuestStatus;
use crate::error::{CoreError, CoreResult};
use crate::ids::{CharacterDefId, LockId, MapId, ObjectiveId, QuestId, QuestStageId, ScenarioId};
use crate::event_bus::event_types;
use crate::npc::TaskDef;
use crate::registry::Definition;

// ============================================================================
// Conditions and Actions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestCondition {
    /// The event payload has a string `key` equal to `equals`
    EventData { key: String, equals: String },
    /// Another (or this) quest is in the given status
    QuestStatus { quest: QuestId, status: QuestStatus },
    /// Every objective of this quest is complete
    ObjectivesComplete,
}

impl QuestCondition {
    fn validate(&self) -> Result<(), String> {
        match self {
            QuestCondition::EventData { key, .. } if key.is_empty() => {
                Err("event_data condition has an empty key".into())
            }
            QuestCondition::QuestStatus { quest, .. } if quest.is_empty() => {
                Err("quest_status condition has an empty quest id".into())
            }
            _ => Ok(()),
        }
    }
}

/// World-side effect fired by a reaction or on stage entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestAction {
    AssignTask {
        character: CharacterDefId,
        task: TaskDef,
    },
    QueueScenario {
        scenario: ScenarioId,
    },
    UnlockMapLock {
        map: MapId,
        lock: LockId,
    },
    AddGold {
        amount: u64,
    },
    Broadcast {
        event_type: String,
        #[serde(default)]
        data: Map<String, Value>,
    },
}

impl QuestAction {
    fn validate(&self) -> Result<(), String> {
        let bad = match self {
            QuestAction::AssignTask { character, task } => {
                character.is_empty() || task.task_id.is_empty()
            }
            QuestAction::QueueScenario { scenario } => scenario.is_empty(),
            QuestAction::UnlockMapLock { map, lock } => map.is_empty() || lock.is_empty(),
            QuestAction::AddGold { .. } => false,
            QuestAction::Broadcast { event_type, .. } => event_type.is_empty(),
        };
        if bad {
            return Err(format!("action {:?} has an empty parameter", self));
        }
        Ok(())
    }
}

/// Reaction outcome that ends the quest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalStatus {
    Complete,
    Fail,
}

// ============================================================================
// Stages
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestStartTrigger {
    pub event_type: String,
    #[serde(default)]
    pub conditions: Vec<QuestCondition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestReactionDef {
    pub subscribe_event: String,
    #[serde(default)]
    pub conditions: Vec<QuestCondition>,
    #[serde(default)]
    pub actions: Vec<QuestAction>,
    #[serde(default)]
    pub next_stage: Option<QuestStageId>,
    #[serde(default)]
    pub terminal_status: Option<TerminalStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestStageDef {
    pub title: String,
    /// Short player-facing goal
    #[serde(default)]
    pub objective: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub on_enter: Vec<QuestAction>,
    pub reactions: Vec<QuestReactionDef>,
}

// ============================================================================
// Objectives
// ============================================================================

/// Objective types supported by the quest system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveType {
    /// Kill X of target Y
    #[serde(alias = "kill_monster")]
    Kill,
    /// Land X hits on target Y
    Attack,
    /// Talk to a specific NPC
    #[serde(alias = "talk_to")]
    Talk,
    /// Acquire X of item Y
    #[serde(alias = "collect", alias = "collect_item")]
    GetItem,
    /// Enter a specific map
    #[serde(alias = "reach", alias = "reach_location")]
    VisitMap,
}

impl ObjectiveType {
    /// Event type that advances this objective
    pub fn event_type(&self) -> &'static str {
        match self {
            ObjectiveType::Kill => event_types::KILL,
            ObjectiveType::Attack => event_types::ATTACK,
            ObjectiveType::Talk => event_types::TALK,
            ObjectiveType::GetItem => event_types::GET_ITEM,
            ObjectiveType::VisitMap => event_types::VISIT_MAP,
        }
    }
}

fn default_count() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveDef {
    pub id: ObjectiveId,
    #[serde(rename = "type")]
    pub objective_type: ObjectiveType,
    /// Target entity/item/npc/map id
    pub target: String,
    /// Number required (1 for talk and visit)
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default)]
    pub description: String,
}

// ============================================================================
// Quest
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestDef {
    pub id: QuestId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub start_trigger: QuestStartTrigger,
    pub stages: BTreeMap<QuestStageId, QuestStageDef>,
    pub start_stage: QuestStageId,
    #[serde(default)]
    pub objectives: Vec<ObjectiveDef>,
}

impl QuestDef {
    pub fn stage(&self, id: &QuestStageId) -> CoreResult<&QuestStageDef> {
        self.stages.get(id).ok_or_else(|| {
            CoreError::not_found("quest stage", format!("{}/{}", self.id, id))
        })
    }

    /// Every condition in the quest, for reference checks.
    pub fn conditions(&self) -> impl Iterator<Item = &QuestCondition> {
        self.start_trigger.conditions.iter().chain(
            self.stages
                .values()
                .flat_map(|s| s.reactions.iter().flat_map(|r| r.conditions.iter())),
        )
    }

    /// Every action in the quest, for reference checks.
    pub fn actions(&self) -> impl Iterator<Item = &QuestAction> {
        self.stages.values().flat_map(|s| {
            s.on_enter
                .iter()
                .chain(s.reactions.iter().flat_map(|r| r.actions.iter()))
        })
    }

    fn invalid(&self, reason: impl Into<String>) -> CoreError {
        CoreError::invalid(Self::KIND, &self.id, reason)
    }
}

impl Definition for QuestDef {
    type Id = QuestId;
    const KIND: &'static str = "quest";

    fn id(&self) -> &QuestId {
        &self.id
    }

    fn validate(&self) -> CoreResult<()> {
        if self.name.is_empty() {
            return Err(self.invalid("name is empty"));
        }
        if self.start_trigger.event_type.is_empty() {
            return Err(self.invalid("start trigger has no event type"));
        }
        if self.stages.is_empty() {
            return Err(self.invalid("no stages"));
        }
        if !self.stages.contains_key(&self.start_stage) {
            return Err(self.invalid(format!("start stage '{}' does not exist", self.start_stage)));
        }

        for (stage_id, stage) in &self.stages {
            if stage_id.is_empty() {
                return Err(self.invalid("stage with empty id"));
            }
            if stage.reactions.is_empty() {
                return Err(self.invalid(format!("stage '{}' has no reactions", stage_id)));
            }
            for reaction in &stage.reactions {
                if reaction.subscribe_event.is_empty() {
                    return Err(self.invalid(format!(
                        "stage '{}' has a reaction with no subscribed event",
                        stage_id
                    )));
                }
                match (&reaction.next_stage, reaction.terminal_status) {
                    (Some(next), None) => {
                        if !self.stages.contains_key(next) {
                            return Err(self.invalid(format!(
                                "stage '{}' moves to unknown stage '{}'",
                                stage_id, next
                            )));
                        }
                    }
                    (None, Some(_)) => {}
                    _ => {
                        return Err(self.invalid(format!(
                            "stage '{}' has a reaction without exactly one of next_stage or terminal_status",
                            stage_id
                        )));
                    }
                }
            }
        }

        for cond in self.conditions() {
            cond.validate().map_err(|reason| self.invalid(reason))?;
        }
        for action in self.actions() {
            action.validate().map_err(|reason| self.invalid(reason))?;
        }

        let mut seen = HashSet::new();
        for objective in &self.objectives {
            if objective.id.is_empty() || objective.target.is_empty() {
                return Err(self.invalid("objective with empty id or target"));
            }
            if objective.count == 0 {
                return Err(self.invalid(format!("objective '{}' has count 0", objective.id)));
            }
            if !seen.insert(&objective.id) {
                return Err(self.invalid(format!("duplicate objective '{}'", objective.id)));
            }
        }
        Ok(())
    }
}
