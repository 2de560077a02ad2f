//! Jam detection: groups of stuck NPCs standing on 4-adjacent tiles.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::ids::{CharacterStateId, TilePos};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StuckNpc {
    pub npc_id: CharacterStateId,
    pub position: TilePos,
    /// Resolution priority; lower resolves first
    pub priority: u32,
}

/// One cluster of mutually adjacent stuck NPCs, sorted by priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Jam {
    pub members: Vec<StuckNpc>,
}

impl Jam {
    /// The member with precedence
    pub fn leader(&self) -> Option<&StuckNpc> {
        self.members.first()
    }
}

/// Cluster stuck NPCs by 4-adjacency. Jams are ordered by their leader's
/// priority so the earliest-spawned NPC's jam resolves first.
pub fn find_jams(stuck: &[StuckNpc]) -> Vec<Jam> {
    let by_pos: HashMap<TilePos, &StuckNpc> = stuck.iter().map(|s| (s.position, s)).collect();
    let mut seen: HashSet<TilePos> = HashSet::new();
    let mut jams = Vec::new();

    for npc in stuck {
        if !seen.insert(npc.position) {
            continue;
        }
        let mut members = Vec::new();
        let mut queue = VecDeque::from([npc.position]);
        while let Some(pos) = queue.pop_front() {
            if let Some(member) = by_pos.get(&pos) {
                members.push((*member).clone());
            }
            for next in pos.neighbors() {
                if by_pos.contains_key(&next) && seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        members.sort_by_key(|m| m.priority);
        jams.push(Jam { members });
    }

    jams.sort_by_key(|j| j.leader().map(|l| l.priority).unwrap_or(u32::MAX));
    jams
}
