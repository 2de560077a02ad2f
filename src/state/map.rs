//! Map State
//!
//! Created lazily the first time a map is needed. Holds scenarios queued to
//! run on the next load and the open/closed state of the map's locks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::defs::MapDef;
use crate::error::{CoreError, CoreResult};
use crate::ids::{LockId, MapId, ScenarioId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapState {
    pub id: MapId,
    /// Run in order the next time the map loads
    pub queued_scenarios: Vec<ScenarioId>,
    /// lock id -> unlocked
    pub locks: BTreeMap<LockId, bool>,
}

impl MapState {
    pub fn new(def: &MapDef) -> Self {
        Self {
            id: def.id.clone(),
            queued_scenarios: Vec::new(),
            locks: def.locks.iter().map(|l| (l.clone(), false)).collect(),
        }
    }

    pub fn queue_scenario(&mut self, scenario_id: ScenarioId) -> CoreResult<()> {
        if scenario_id.is_empty() {
            return Err(CoreError::EmptyId { kind: "scenario" });
        }
        if self.queued_scenarios.contains(&scenario_id) {
            return Err(CoreError::misuse(
                "map state",
                format!("scenario {} already queued on {}", scenario_id, self.id),
            ));
        }
        info!("Queued scenario {} on map {}", scenario_id, self.id);
        self.queued_scenarios.push(scenario_id);
        Ok(())
    }

    /// Drain the queue; called when the map loads.
    pub fn take_queued_scenarios(&mut self) -> Vec<ScenarioId> {
        std::mem::take(&mut self.queued_scenarios)
    }

    /// Put drained scenarios back ahead of anything queued since, after a
    /// load that failed.
    pub fn restore_queued_scenarios(&mut self, mut scenarios: Vec<ScenarioId>) {
        scenarios.retain(|s| !self.queued_scenarios.contains(s));
        scenarios.append(&mut self.queued_scenarios);
        self.queued_scenarios = scenarios;
    }

    pub fn unlock(&mut self, lock_id: &LockId) -> CoreResult<()> {
        let unlocked = self
            .locks
            .get_mut(lock_id)
            .ok_or_else(|| CoreError::not_found("lock", format!("{}/{}", self.id, lock_id)))?;
        *unlocked = true;
        info!("Unlocked {} on map {}", lock_id, self.id);
        Ok(())
    }

    pub fn is_unlocked(&self, lock_id: &LockId) -> CoreResult<bool> {
        self.locks
            .get(lock_id)
            .copied()
            .ok_or_else(|| CoreError::not_found("lock", format!("{}/{}", self.id, lock_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keep() -> MapState {
        MapState::new(&MapDef {
            id: MapId::new("keep"),
            display_name: "Keep".into(),
            locks: vec![LockId::new("gate")],
        })
    }

    #[test]
    fn test_queue_and_drain() {
        let mut map = keep();
        map.queue_scenario(ScenarioId::new("siege")).unwrap();
        assert!(map.queue_scenario(ScenarioId::new("siege")).is_err());
        map.queue_scenario(ScenarioId::new("feast")).unwrap();

        let queued = map.take_queued_scenarios();
        assert_eq!(queued, vec![ScenarioId::new("siege"), ScenarioId::new("feast")]);
        assert!(map.queued_scenarios.is_empty());

        map.queue_scenario(ScenarioId::new("harvest")).unwrap();
        map.restore_queued_scenarios(queued);
        assert_eq!(
            map.queued_scenarios,
            vec![
                ScenarioId::new("siege"),
                ScenarioId::new("feast"),
                ScenarioId::new("harvest")
            ]
        );
    }

    #[test]
    fn test_unlock() {
        let mut map = keep();
        let gate = LockId::new("gate");
        assert!(!map.is_unlocked(&gate).unwrap());
        map.unlock(&gate).unwrap();
        assert!(map.is_unlocked(&gate).unwrap());
        assert!(map.unlock(&LockId::new("postern")).is_err());
    }
}
