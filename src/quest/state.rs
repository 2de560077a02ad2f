//! Quest State Tracking
//!
//! Tracks quest status, current stage and objective progress.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::definition::QuestDef;
use crate::ids::{ObjectiveId, QuestId, QuestStageId};

/// Lifecycle status of a quest
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
    /// Waiting for its start trigger
    #[default]
    NotStarted,
    /// Started and progressing through stages
    Active,
    Completed,
    Failed,
}

impl QuestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestStatus::NotStarted => "not_started",
            QuestStatus::Active => "active",
            QuestStatus::Completed => "completed",
            QuestStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, QuestStatus::Completed | QuestStatus::Failed)
    }
}

/// Progress on a single objective
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectiveProgress {
    pub objective_id: ObjectiveId,
    pub current: u32,
    pub target: u32,
    pub completed: bool,
}

impl ObjectiveProgress {
    pub fn new(objective_id: ObjectiveId, target: u32) -> Self {
        Self {
            objective_id,
            current: 0,
            target,
            completed: false,
        }
    }

    /// Add progress and return true if newly completed
    pub fn add_progress(&mut self, amount: u32) -> bool {
        if self.completed {
            return false;
        }
        self.current = self.current.saturating_add(amount).min(self.target);
        if self.current >= self.target {
            self.completed = true;
            true
        } else {
            false
        }
    }

    pub fn progress_percent(&self) -> f32 {
        if self.target == 0 {
            return 1.0;
        }
        self.current as f32 / self.target as f32
    }
}

/// Runtime state of one started quest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestState {
    pub quest_id: QuestId,
    pub status: QuestStatus,
    /// Set once the start stage is entered
    pub current_stage: Option<QuestStageId>,
    /// Progress on each objective (keyed by objective id)
    pub objectives: BTreeMap<ObjectiveId, ObjectiveProgress>,
    pub started_at: Option<DateTime<Utc>>,
    /// When the quest completed or failed
    pub finished_at: Option<DateTime<Utc>>,
}

impl QuestState {
    /// Fresh active state for `def`, before any stage has been entered.
    pub fn start(def: &QuestDef) -> Self {
        let objectives = def
            .objectives
            .iter()
            .map(|o| (o.id.clone(), ObjectiveProgress::new(o.id.clone(), o.count)))
            .collect();

        Self {
            quest_id: def.id.clone(),
            status: QuestStatus::Active,
            current_stage: None,
            objectives,
            started_at: Some(Utc::now()),
            finished_at: None,
        }
    }

    pub fn objective(&self, objective_id: &ObjectiveId) -> Option<&ObjectiveProgress> {
        self.objectives.get(objective_id)
    }

    /// True when every objective is done (vacuously true with none).
    pub fn all_objectives_complete(&self) -> bool {
        self.objectives.values().all(|o| o.completed)
    }

    pub fn complete(&mut self) {
        self.status = QuestStatus::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn fail(&mut self) {
        self.status = QuestStatus::Failed;
        self.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_objective_progress() {
        let mut obj = ObjectiveProgress::new(ObjectiveId::new("kill_slimes"), 5);
        assert!(!obj.completed);
        assert_eq!(obj.current, 0);

        obj.add_progress(3);
        assert!(!obj.completed);
        assert_eq!(obj.current, 3);

        let completed = obj.add_progress(4);
        assert!(completed);
        assert!(obj.completed);
        assert_eq!(obj.current, 5);

        // Can't add more after complete
        let completed = obj.add_progress(1);
        assert!(!completed);
        assert_eq!(obj.current, 5);
        assert_eq!(obj.progress_percent(), 1.0);
    }

    #[test]
    fn test_status_strings() {
        for status in [
            QuestStatus::NotStarted,
            QuestStatus::Active,
            QuestStatus::Completed,
            QuestStatus::Failed,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            assert_eq!(serde_json::from_str::<QuestStatus>(&json).unwrap(), status);
        }
        assert!(serde_json::from_str::<QuestStatus>("\"abandoned\"").is_err());
        assert!(QuestStatus::Failed.is_terminal());
        assert!(!QuestStatus::Active.is_terminal());
    }
}
