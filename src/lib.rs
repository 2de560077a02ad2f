//! RPG engine core: content registries, per-playthrough state, branching
//! dialog, event-driven quests and scheduled NPC tasks, wired together by a
//! synchronous event bus.

pub mod config;
pub mod content;
pub mod defs;
pub mod dialog;
pub mod economy;
pub mod error;
pub mod event_bus;
pub mod ids;
pub mod npc;
pub mod quest;
pub mod registry;
pub mod state;
pub mod world;

pub use error::{CoreError, CoreResult};
