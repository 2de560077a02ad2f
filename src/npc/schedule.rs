//! Task and schedule definitions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, CoreResult};
use crate::ids::{ScheduleId, TaskId};
use crate::registry::Definition;

pub const HOURS_PER_DAY: u8 = 24;

/// How strongly a task holds on to its NPC. Higher overrides lower.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    #[default]
    Schedule,
    Assigned,
    Emergency,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Schedule => "schedule",
            TaskPriority::Assigned => "assigned",
            TaskPriority::Emergency => "emergency",
        }
    }
}

/// Which task logic to run, with what parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDef {
    pub task_id: TaskId,
    #[serde(default)]
    pub priority: TaskPriority,
    /// Task-specific parameters, decoded by the task when it is built
    #[serde(default)]
    pub params: Value,
    /// Runs as soon as this task ends
    #[serde(default)]
    pub next_task: Option<Box<TaskDef>>,
}

impl TaskDef {
    pub fn new(task_id: &str, priority: TaskPriority, params: Value) -> Self {
        Self {
            task_id: TaskId::new(task_id),
            priority,
            params,
            next_task: None,
        }
    }

    pub fn then(mut self, next: TaskDef) -> Self {
        self.next_task = Some(Box::new(next));
        self
    }

    fn check_ids(&self) -> bool {
        !self.task_id.is_empty() && self.next_task.as_ref().is_none_or(|n| n.check_ids())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleDef {
    pub id: ScheduleId,
    pub hourly: BTreeMap<u8, TaskDef>,
}

impl ScheduleDef {
    pub fn task_for_hour(&self, hour: u8) -> CoreResult<&TaskDef> {
        self.hourly
            .get(&hour)
            .ok_or_else(|| CoreError::invalid(Self::KIND, &self.id, format!("no task for hour {}", hour)))
    }
}

impl Definition for ScheduleDef {
    type Id = ScheduleId;
    const KIND: &'static str = "schedule";

    fn id(&self) -> &ScheduleId {
        &self.id
    }

    fn validate(&self) -> CoreResult<()> {
        if self.hourly.len() != HOURS_PER_DAY as usize {
            return Err(CoreError::invalid(
                Self::KIND,
                &self.id,
                format!("expected 24 hourly entries, found {}", self.hourly.len()),
            ));
        }
        for hour in 0..HOURS_PER_DAY {
            let task = self.hourly.get(&hour).ok_or_else(|| {
                CoreError::invalid(Self::KIND, &self.id, format!("hour {} missing", hour))
            })?;
            if !task.check_ids() {
                return Err(CoreError::invalid(
                    Self::KIND,
                    &self.id,
                    format!("hour {} has an empty task id", hour),
                ));
            }
        }
        Ok(())
    }
}

/// Fill a full day from a few explicitly set hours. Each unset hour repeats
/// the most recent set hour; hours before the first set one wrap around and
/// take the last task of the day.
pub fn build_schedule(id: ScheduleId, sparse: BTreeMap<u8, TaskDef>) -> CoreResult<ScheduleDef> {
    if let Some(hour) = sparse.keys().find(|h| **h >= HOURS_PER_DAY) {
        return Err(CoreError::invalid(
            ScheduleDef::KIND,
            &id,
            format!("hour {} is out of range", hour),
        ));
    }

    let mut hourly = BTreeMap::new();
    let mut last: Option<&TaskDef> = None;
    for hour in 0..HOURS_PER_DAY {
        if let Some(task) = sparse.get(&hour) {
            last = Some(task);
        }
        if let Some(task) = last {
            hourly.insert(hour, task.clone());
        }
    }

    let Some(wrap) = last else {
        return Err(CoreError::invalid(ScheduleDef::KIND, &id, "schedule is empty"));
    };
    for hour in 0..HOURS_PER_DAY {
        if hourly.contains_key(&hour) {
            break;
        }
        hourly.insert(hour, wrap.clone());
    }

    let schedule = ScheduleDef { id, hourly };
    schedule.validate()?;
    Ok(schedule)
}
