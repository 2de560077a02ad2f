//! Shopkeeper State

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::defs::ShopkeeperDef;
use crate::error::{CoreError, CoreResult};
use crate::ids::{ItemId, ShopId};

/// Current stock and gold of one shop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopkeeperState {
    pub shop_id: ShopId,
    pub stock: BTreeMap<ItemId, u32>,
    pub gold: u64,
}

impl ShopkeeperState {
    /// Stock starts at each item's maximum quantity
    pub fn new(def: &ShopkeeperDef) -> Self {
        Self {
            shop_id: def.id.clone(),
            stock: def
                .stock
                .iter()
                .map(|s| (s.item_id.clone(), s.quantity))
                .collect(),
            gold: def.base_gold,
        }
    }

    pub fn quantity(&self, item_id: &ItemId) -> u32 {
        self.stock.get(item_id).copied().unwrap_or(0)
    }

    /// Restock all items by their restock_rate, capped at the def quantity
    pub fn restock(&mut self, def: &ShopkeeperDef) {
        for item in &def.stock {
            let current = self.stock.entry(item.item_id.clone()).or_insert(0);
            *current = current.saturating_add(item.restock_rate).min(item.quantity);
        }
    }

    pub fn take_stock(&mut self, item_id: &ItemId, quantity: u32) -> CoreResult<()> {
        let held = self.quantity(item_id);
        if quantity == 0 || held < quantity {
            return Err(CoreError::misuse(
                "shop",
                format!("{} has {} x {}, cannot take {}", self.shop_id, held, item_id, quantity),
            ));
        }
        self.stock.insert(item_id.clone(), held - quantity);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defs::ShopStock;

    #[test]
    fn test_take_and_restock() {
        let def = ShopkeeperDef {
            id: ShopId::new("general"),
            shop_name: "General Goods".into(),
            base_gold: 500,
            stock: vec![ShopStock {
                item_id: ItemId::new("bread"),
                quantity: 10,
                restock_rate: 3,
            }],
        };
        let bread = ItemId::new("bread");
        let mut shop = ShopkeeperState::new(&def);
        assert_eq!(shop.gold, 500);

        shop.take_stock(&bread, 9).unwrap();
        assert!(shop.take_stock(&bread, 2).is_err());

        shop.restock(&def);
        assert_eq!(shop.quantity(&bread), 4);
        shop.restock(&def);
        shop.restock(&def);
        shop.restock(&def);
        assert_eq!(shop.quantity(&bread), 10);
    }
}
