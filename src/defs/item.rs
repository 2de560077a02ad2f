use serde::{Deserialize, Serialize};

use crate::economy::denomination_of;
use crate::error::{CoreError, CoreResult};
use crate::ids::ItemId;
use crate::registry::Definition;

// ============================================================================
// Item Kinds
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    #[default]
    Misc,
    Weapon,
    Armor,
    Consumable,
    /// Coin; the item id encodes its denomination
    Currency,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Misc => "misc",
            ItemKind::Weapon => "weapon",
            ItemKind::Armor => "armor",
            ItemKind::Consumable => "consumable",
            ItemKind::Currency => "currency",
        }
    }
}

// ============================================================================
// Item Definition
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDef {
    pub id: ItemId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub kind: ItemKind,
    /// Base trade value in the smallest coin unit
    #[serde(default)]
    pub value: u64,
    #[serde(default)]
    pub weight: f32,
}

impl ItemDef {
    pub fn new(id: &str, name: &str, kind: ItemKind, value: u64) -> Self {
        Self {
            id: ItemId::new(id),
            name: name.to_string(),
            description: String::new(),
            kind,
            value,
            weight: 0.0,
        }
    }

    pub fn is_currency(&self) -> bool {
        self.kind == ItemKind::Currency
    }
}

impl Definition for ItemDef {
    type Id = ItemId;
    const KIND: &'static str = "item";

    fn id(&self) -> &ItemId {
        &self.id
    }

    fn validate(&self) -> CoreResult<()> {
        if self.name.is_empty() {
            return Err(CoreError::invalid(Self::KIND, &self.id, "name is empty"));
        }
        if self.weight < 0.0 {
            return Err(CoreError::invalid(Self::KIND, &self.id, "weight is negative"));
        }
        if self.is_currency() {
            match denomination_of(&self.id) {
                Some(denom) if denom == self.value && denom > 0 => {}
                _ => {
                    return Err(CoreError::invalid(
                        Self::KIND,
                        &self.id,
                        "currency items must be named currency_value_<n> with value n > 0",
                    ));
                }
            }
        }
        Ok(())
    }
}
