//! Runnable NPC tasks.
//!
//! A [`Task`] is built from a [`TaskDef`] by decoding its params for the
//! task kind named by `task_id`. The coordinator drives it through
//! `NotStarted -> Started -> InProgress -> Ended`.

use std::collections::HashSet;
use std::collections::VecDeque;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::pathfinding::{NavGrid, find_path};
use super::schedule::{TaskDef, TaskPriority};
use crate::error::{CoreError, CoreResult};
use crate::ids::{DialogProfileId, TaskId, TilePos};

/// Built-in task ids.
pub mod task_ids {
    pub const IDLE: &str = "idle";
    pub const WAIT: &str = "wait";
    pub const GOTO: &str = "goto";
    pub const START_DIALOG: &str = "start_dialog";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    NotStarted,
    Started,
    InProgress,
    Ended,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WaitParams {
    frames: u32,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GotoParams {
    x: i32,
    y: i32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct DialogParams {
    /// Falls back to the NPC's own profile
    profile: Option<DialogProfileId>,
}

#[derive(Debug, Clone, PartialEq)]
enum TaskKind {
    Idle,
    Wait {
        remaining: u32,
    },
    Goto {
        goal: TilePos,
        /// Remaining steps, next step first
        path: VecDeque<TilePos>,
        needs_path: bool,
        /// Last path request found no route
        unreachable: bool,
    },
    StartDialog {
        profile: Option<DialogProfileId>,
    },
}

fn decode<T: DeserializeOwned>(def: &TaskDef) -> CoreResult<T> {
    serde_json::from_value(def.params.clone())
        .map_err(|e| CoreError::invalid("task", &def.task_id, format!("bad params: {}", e)))
}

impl TaskKind {
    fn from_def(def: &TaskDef) -> CoreResult<Self> {
        match def.task_id.as_str() {
            task_ids::IDLE => Ok(TaskKind::Idle),
            task_ids::WAIT => {
                let p: WaitParams = decode(def)?;
                Ok(TaskKind::Wait { remaining: p.frames })
            }
            task_ids::GOTO => {
                let p: GotoParams = decode(def)?;
                Ok(TaskKind::Goto {
                    goal: TilePos::new(p.x, p.y),
                    path: VecDeque::new(),
                    needs_path: false,
                    unreachable: false,
                })
            }
            task_ids::START_DIALOG => {
                let p: DialogParams = if def.params.is_null() {
                    DialogParams::default()
                } else {
                    decode(def)?
                };
                if p.profile.as_ref().is_some_and(|id| id.is_empty()) {
                    return Err(CoreError::invalid("task", &def.task_id, "dialog profile is empty"));
                }
                Ok(TaskKind::StartDialog { profile: p.profile })
            }
            other => Err(CoreError::invalid("task", other, "unknown task id")),
        }
    }
}

/// Check that `def` and every chained task decode.
pub fn validate_task_chain(def: &TaskDef) -> CoreResult<()> {
    let mut next = Some(def);
    while let Some(def) = next {
        TaskKind::from_def(def)?;
        next = def.next_task.as_deref();
    }
    Ok(())
}

/// What one frame of a task wants from the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskStep {
    /// Nothing to do this frame
    Stay,
    /// Walk onto the given adjacent tile
    MoveTo(TilePos),
    /// Route is missing or unreachable; counts as blocked
    Blocked,
    /// Ask the host to open a dialog; `None` means the NPC's own profile
    Dialog(Option<DialogProfileId>),
}

#[derive(Debug, Clone)]
pub struct Task {
    def: TaskDef,
    kind: TaskKind,
    status: TaskStatus,
}

impl Task {
    pub fn from_def(def: &TaskDef) -> CoreResult<Self> {
        Ok(Self {
            kind: TaskKind::from_def(def)?,
            def: def.clone(),
            status: TaskStatus::NotStarted,
        })
    }

    pub fn def(&self) -> &TaskDef {
        &self.def
    }

    pub fn task_id(&self) -> &TaskId {
        &self.def.task_id
    }

    pub fn priority(&self) -> TaskPriority {
        self.def.priority
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn is_ended(&self) -> bool {
        self.status == TaskStatus::Ended
    }

    pub fn goal(&self) -> Option<TilePos> {
        match &self.kind {
            TaskKind::Goto { goal, .. } => Some(*goal),
            _ => None,
        }
    }

    pub fn start(&mut self, position: TilePos) -> CoreResult<()> {
        if self.status != TaskStatus::NotStarted {
            return Err(CoreError::misuse(
                "task",
                format!("{} already started", self.def.task_id),
            ));
        }
        if let TaskKind::Goto { goal, needs_path, .. } = &mut self.kind {
            if *goal == position {
                return Err(CoreError::invalid(
                    "task",
                    &self.def.task_id,
                    format!("goto goal {} is the current position", goal),
                ));
            }
            *needs_path = true;
        }
        self.status = TaskStatus::Started;
        debug!("Task {} started at {}", self.def.task_id, position);
        Ok(())
    }

    /// Decide this frame's action. Position changes are applied by the
    /// caller through [`Task::moved`].
    pub fn step(&mut self, position: TilePos) -> TaskStep {
        if self.status == TaskStatus::Started {
            self.status = TaskStatus::InProgress;
        }
        if self.status != TaskStatus::InProgress {
            return TaskStep::Stay;
        }

        match &mut self.kind {
            TaskKind::Idle => TaskStep::Stay,
            TaskKind::Wait { remaining } => {
                *remaining = remaining.saturating_sub(1);
                if *remaining == 0 {
                    self.status = TaskStatus::Ended;
                }
                TaskStep::Stay
            }
            TaskKind::StartDialog { profile } => {
                let profile = profile.clone();
                self.status = TaskStatus::Ended;
                TaskStep::Dialog(profile)
            }
            TaskKind::Goto {
                goal,
                path,
                needs_path,
                unreachable,
            } => {
                if position == *goal {
                    self.status = TaskStatus::Ended;
                    return TaskStep::Stay;
                }
                match path.front() {
                    Some(next) if position.is_adjacent(*next) => TaskStep::MoveTo(*next),
                    Some(_) => {
                        // displaced off the route
                        path.clear();
                        *needs_path = true;
                        TaskStep::Blocked
                    }
                    None if *unreachable => TaskStep::Blocked,
                    None => {
                        *needs_path = true;
                        TaskStep::Blocked
                    }
                }
            }
        }
    }

    /// Finish without running, e.g. a goto whose goal is already reached.
    pub fn end(&mut self) {
        self.status = TaskStatus::Ended;
    }

    /// The NPC arrived on the tile returned by the last `MoveTo`.
    pub fn moved(&mut self, position: TilePos) {
        if let TaskKind::Goto { goal, path, .. } = &mut self.kind {
            if path.front() == Some(&position) {
                path.pop_front();
            }
            if position == *goal {
                self.status = TaskStatus::Ended;
            }
        }
    }

    /// Drop the current route; the next background pass plans a new one.
    pub fn request_repath(&mut self) {
        if let TaskKind::Goto {
            path,
            needs_path,
            unreachable,
            ..
        } = &mut self.kind
        {
            path.clear();
            *needs_path = true;
            *unreachable = false;
        }
    }

    pub fn needs_path(&self) -> bool {
        matches!(self.kind, TaskKind::Goto { needs_path: true, .. })
    }

    /// Off-frame work. Plans routes for goto tasks, treating `occupied`
    /// tiles as blocked.
    pub fn background_assist(
        &mut self,
        position: TilePos,
        grid: &NavGrid,
        occupied: &HashSet<TilePos>,
        max_iterations: usize,
    ) {
        if matches!(self.status, TaskStatus::NotStarted | TaskStatus::Ended) {
            return;
        }
        let TaskKind::Goto {
            goal,
            path,
            needs_path,
            unreachable,
        } = &mut self.kind
        else {
            return;
        };
        if !*needs_path {
            return;
        }
        *needs_path = false;
        match find_path(position, *goal, grid, occupied, max_iterations) {
            Some(route) => {
                debug!("Planned {} steps from {} to {}", route.len(), position, goal);
                *path = route.into();
                *unreachable = false;
            }
            None => {
                warn!("No route from {} to {}", position, goal);
                path.clear();
                *unreachable = true;
            }
        }
    }
}
