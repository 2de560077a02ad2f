//! Quest System
//!
//! Event-driven quests. A quest starts when its trigger event arrives with
//! matching conditions, then moves through stages as reactions fire.
//! Objectives are counted separately from stages; a reaction can wait on
//! them with the `objectives_complete` condition.

pub mod definition;
mod engine;
mod objective;
pub mod state;

pub use definition::{
    ObjectiveDef, ObjectiveType, QuestAction, QuestCondition, QuestDef, QuestReactionDef,
    QuestStageDef, QuestStartTrigger, TerminalStatus,
};
pub use engine::{QUEST_ENGINE_SUBSCRIBER, QuestEngine};
pub use objective::{ObjectiveUpdate, apply_event};
pub use state::{ObjectiveProgress, QuestState, QuestStatus};
