//! NPC Tasks and Schedules
//!
//! Schedules say what an NPC does at each hour; assigned and emergency
//! tasks override them until they finish. The per-map coordinator runs the
//! tasks, resolves collisions and jams, and hosts the background loop that
//! plans paths.

mod coordinator;
mod jam;
mod pathfinding;
mod schedule;
mod task;

pub use coordinator::{AssignOutcome, DialogRequest, JamResolution, NpcCoordinator, NpcSpawn, NpcView};
pub use jam::{Jam, StuckNpc};
pub use pathfinding::{NavGrid, find_path};
pub use schedule::{HOURS_PER_DAY, ScheduleDef, TaskDef, TaskPriority, build_schedule};
pub use task::{Task, TaskStatus, TaskStep, task_ids, validate_task_chain};
