//! Typed string identifiers.
//!
//! Every catalog and state table is keyed by its own id type so an item id can
//! never be handed to a quest lookup by accident.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($($(#[$meta:meta])* $name:ident),+ $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(String);

            impl $name {
                pub fn new(id: impl Into<String>) -> Self {
                    Self(id.into())
                }

                pub fn as_str(&self) -> &str {
                    &self.0
                }

                pub fn is_empty(&self) -> bool {
                    self.0.is_empty()
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.0)
                }
            }

            impl From<&str> for $name {
                fn from(s: &str) -> Self {
                    Self(s.to_string())
                }
            }

            impl From<String> for $name {
                fn from(s: String) -> Self {
                    Self(s)
                }
            }

            impl AsRef<str> for $name {
                fn as_ref(&self) -> &str {
                    &self.0
                }
            }
        )+
    };
}

string_id!(
    ItemId,
    MapId,
    ScenarioId,
    ShopId,
    TopicId,
    DialogProfileId,
    /// Optional id on a dialog response, needed for `once` tracking
    ResponseId,
    ScheduleId,
    TaskId,
    CharacterDefId,
    /// Instance id; equals the def id for unique characters
    CharacterStateId,
    TraitId,
    AttributeId,
    SkillId,
    ClassId,
    CultureId,
    QuestId,
    QuestStageId,
    ObjectiveId,
    LockId,
);

/// Tile coordinate on a map grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TilePos {
    pub x: i32,
    pub y: i32,
}

impl TilePos {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// 4-directional neighbours (N, S, W, E)
    pub fn neighbors(&self) -> [TilePos; 4] {
        [
            TilePos::new(self.x, self.y - 1),
            TilePos::new(self.x, self.y + 1),
            TilePos::new(self.x - 1, self.y),
            TilePos::new(self.x + 1, self.y),
        ]
    }

    pub fn manhattan(&self, other: TilePos) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    pub fn is_adjacent(&self, other: TilePos) -> bool {
        self.manhattan(other) == 1
    }
}

impl fmt::Display for TilePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_serde_is_transparent() {
        let id = ItemId::new("currency_value_5");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"currency_value_5\"");
        let back: ItemId = serde_json::from_str("\"apple\"").unwrap();
        assert_eq!(back.as_str(), "apple");
    }

    #[test]
    fn test_adjacency() {
        let a = TilePos::new(2, 2);
        assert!(a.is_adjacent(TilePos::new(2, 3)));
        assert!(!a.is_adjacent(TilePos::new(3, 3)));
        assert!(a.neighbors().contains(&TilePos::new(1, 2)));
    }
}
