//! Objective progress from gameplay events.
//!
//! Counter-based tracking that runs alongside the stage/reaction model. An
//! event advances every unfinished objective whose type maps to the event
//! type and whose target matches the event's `target`.

use super::definition::QuestDef;
use super::state::QuestState;
use crate::event_bus::{Event, keys};
use crate::ids::{ObjectiveId, QuestId};

/// Result of applying an event to one objective
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectiveUpdate {
    pub quest_id: QuestId,
    pub objective_id: ObjectiveId,
    pub new_progress: u32,
    pub target: u32,
    /// Whether the objective was just completed
    pub objective_completed: bool,
}

/// Advance matching objectives of `state`. Returns one update per objective
/// that moved.
pub fn apply_event(def: &QuestDef, state: &mut QuestState, event: &Event) -> Vec<ObjectiveUpdate> {
    let Some(target) = event.get_str(keys::TARGET) else {
        return Vec::new();
    };
    let amount = event
        .get_u64(keys::COUNT)
        .map(|c| u32::try_from(c).unwrap_or(u32::MAX))
        .unwrap_or(1);
    if amount == 0 {
        return Vec::new();
    }

    let mut updates = Vec::new();
    for objective in &def.objectives {
        if objective.objective_type.event_type() != event.event_type || objective.target != target {
            continue;
        }
        let Some(progress) = state.objectives.get_mut(&objective.id) else {
            continue;
        };
        if progress.completed {
            continue;
        }
        let objective_completed = progress.add_progress(amount);
        updates.push(ObjectiveUpdate {
            quest_id: def.id.clone(),
            objective_id: objective.id.clone(),
            new_progress: progress.current,
            target: progress.target,
            objective_completed,
        });
    }
    updates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::event_types;
    use crate::quest::definition::{ObjectiveDef, ObjectiveType, QuestStartTrigger};
    use std::collections::BTreeMap;

    fn hunt() -> QuestDef {
        QuestDef {
            id: QuestId::new("slime_hunt"),
            name: "Slime Hunt".into(),
            description: String::new(),
            start_trigger: QuestStartTrigger {
                event_type: event_types::TALK.into(),
                conditions: vec![],
            },
            stages: BTreeMap::new(),
            start_stage: Default::default(),
            objectives: vec![
                ObjectiveDef {
                    id: ObjectiveId::new("slimes"),
                    objective_type: ObjectiveType::Kill,
                    target: "slime".into(),
                    count: 3,
                    description: String::new(),
                },
                ObjectiveDef {
                    id: ObjectiveId::new("cores"),
                    objective_type: ObjectiveType::GetItem,
                    target: "slime_core".into(),
                    count: 2,
                    description: String::new(),
                },
            ],
        }
    }

    #[test]
    fn test_matching_type_and_target_only() {
        let def = hunt();
        let mut state = QuestState::start(&def);

        let updates = apply_event(&def, &mut state, &Event::new(event_types::KILL).with(keys::TARGET, "wolf"));
        assert!(updates.is_empty());

        let updates = apply_event(
            &def,
            &mut state,
            &Event::new(event_types::GET_ITEM).with(keys::TARGET, "slime"),
        );
        assert!(updates.is_empty());

        let updates = apply_event(
            &def,
            &mut state,
            &Event::new(event_types::KILL).with(keys::TARGET, "slime").with(keys::COUNT, 2),
        );
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].new_progress, 2);
        assert!(!updates[0].objective_completed);
    }

    #[test]
    fn test_completion_reported_once() {
        let def = hunt();
        let mut state = QuestState::start(&def);
        let event = Event::new(event_types::GET_ITEM)
            .with(keys::TARGET, "slime_core")
            .with(keys::COUNT, 5);

        let updates = apply_event(&def, &mut state, &event);
        assert!(updates[0].objective_completed);
        assert_eq!(updates[0].new_progress, 2);

        assert!(apply_event(&def, &mut state, &event).is_empty());
        assert!(state.objective(&ObjectiveId::new("cores")).unwrap().completed);
        assert!(!state.all_objectives_complete());
    }
}
