//! Character State
//!
//! A live character instance: stats copied from its def at creation, an
//! inventory and a coin wallet made of currency items.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EconomyConfig;
use crate::defs::{CharacterDef, Vitals};
use crate::economy::{self, CoinSet, Payment};
use crate::error::{CoreError, CoreResult};
use crate::ids::{AttributeId, CharacterDefId, CharacterStateId, ItemId, SkillId, TraitId};
use crate::registry::{Definition, DefinitionRegistry};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterState {
    pub id: CharacterStateId,
    /// Def this state was created from; used for profile and culture lookups
    pub def_id: CharacterDefId,
    pub display_name: String,
    /// Base levels after culture mods, without trait modifiers
    pub attributes: BTreeMap<AttributeId, i32>,
    pub skills: BTreeMap<SkillId, i32>,
    pub traits: Vec<TraitId>,
    pub vitals: Vitals,
    pub inventory: BTreeMap<ItemId, u32>,
}

impl CharacterState {
    /// Build a fresh state from `def`. Fails if two initial traits conflict
    /// or the def references unknown traits or cultures.
    pub fn from_def(
        id: CharacterStateId,
        def: &CharacterDef,
        defs: &DefinitionRegistry,
    ) -> CoreResult<Self> {
        for (i, a) in def.initial_traits.iter().enumerate() {
            let a_def = defs.trait_def(a)?;
            for b in &def.initial_traits[i + 1..] {
                let b_def = defs.trait_def(b)?;
                if a_def.conflicts_with(b) || b_def.conflicts_with(a) {
                    return Err(CoreError::invalid(
                        CharacterDef::KIND,
                        &def.id,
                        format!("initial traits '{}' and '{}' conflict", a, b),
                    ));
                }
            }
        }

        let mut attributes = def.base_attributes.clone();
        let mut skills = def.base_skills.clone();
        if let Some(culture_id) = &def.culture_id {
            let culture = defs.culture(culture_id)?;
            for (attr, delta) in &culture.attribute_mods {
                *attributes.entry(attr.clone()).or_insert(0) += delta;
            }
            for (skill, delta) in &culture.skill_mods {
                *skills.entry(skill.clone()).or_insert(0) += delta;
            }
        }

        let mut inventory = BTreeMap::new();
        for entry in &def.initial_inventory {
            *inventory.entry(entry.item_id.clone()).or_insert(0) += entry.quantity;
        }

        Ok(Self {
            id,
            def_id: def.id.clone(),
            display_name: def.display_name.clone(),
            attributes,
            skills,
            traits: def.initial_traits.clone(),
            vitals: def.base_vitals,
            inventory,
        })
    }

    /// Attribute level including trait modifiers.
    pub fn attribute(&self, defs: &DefinitionRegistry, attr: &AttributeId) -> CoreResult<i32> {
        let mods = defs.net_trait_modifiers(&self.traits)?;
        let base = self.attributes.get(attr).copied().unwrap_or(0);
        Ok(base + mods.attributes.get(attr).copied().unwrap_or(0))
    }

    /// Skill level including trait modifiers.
    pub fn skill(&self, defs: &DefinitionRegistry, skill: &SkillId) -> CoreResult<i32> {
        let mods = defs.net_trait_modifiers(&self.traits)?;
        let base = self.skills.get(skill).copied().unwrap_or(0);
        Ok(base + mods.skills.get(skill).copied().unwrap_or(0))
    }

    // ========================================================================
    // Inventory
    // ========================================================================

    pub fn count(&self, item_id: &ItemId) -> u32 {
        self.inventory.get(item_id).copied().unwrap_or(0)
    }

    pub fn add_item(&mut self, item_id: &ItemId, quantity: u32) -> CoreResult<()> {
        if item_id.is_empty() {
            return Err(CoreError::EmptyId { kind: "item" });
        }
        if quantity == 0 {
            return Err(CoreError::misuse("inventory", format!("add {} with quantity 0", item_id)));
        }
        let held = self.inventory.entry(item_id.clone()).or_insert(0);
        *held = held.checked_add(quantity).ok_or_else(|| {
            CoreError::invariant(format!("{} x {} overflows {}'s inventory", quantity, item_id, self.id))
        })?;
        Ok(())
    }

    pub fn remove_item(&mut self, item_id: &ItemId, quantity: u32) -> CoreResult<()> {
        let held = self.count(item_id);
        if quantity == 0 || held < quantity {
            return Err(CoreError::misuse(
                "inventory",
                format!("{} holds {} x {}, cannot remove {}", self.id, held, item_id, quantity),
            ));
        }
        if held == quantity {
            self.inventory.remove(item_id);
        } else {
            self.inventory.insert(item_id.clone(), held - quantity);
        }
        Ok(())
    }

    // ========================================================================
    // Money
    // ========================================================================

    /// Coins currently held, derived from currency items in the inventory.
    pub fn wallet(&self) -> CoinSet {
        let mut coins = CoinSet::new();
        for (item_id, qty) in &self.inventory {
            if let Some(denom) = economy::denomination_of(item_id) {
                coins.add(denom, *qty as u64);
            }
        }
        coins
    }

    pub fn money(&self) -> u64 {
        self.wallet().total()
    }

    pub fn earn_money(&mut self, amount: u64, economy: &EconomyConfig) -> CoreResult<()> {
        if amount == 0 {
            return Ok(());
        }
        let coins = economy::calculate_coins(amount, &economy.denominations)?;
        self.add_coins(&coins)?;
        debug!("{} earned {} (now {})", self.id, amount, self.money());
        Ok(())
    }

    /// Pay `price` from the wallet and take the change back.
    pub fn spend_money(&mut self, price: u64, economy: &EconomyConfig) -> CoreResult<Payment> {
        let wallet = self.wallet();
        let payment = economy::best_payment(
            price,
            &wallet,
            &economy.denominations,
            economy.effective_prune_slack(),
        )?
        .ok_or_else(|| {
            CoreError::misuse(
                "wallet",
                format!("{} cannot pay {} with {}", self.id, price, wallet.total()),
            )
        })?;

        for (denom, count) in payment.coins.iter() {
            let qty = u32::try_from(count)
                .map_err(|_| CoreError::invariant(format!("coin count {} overflows", count)))?;
            self.remove_item(&economy::currency_item_id(denom), qty)?;
        }
        let change = economy::calculate_coins(payment.overpay, &economy.denominations)?;
        self.add_coins(&change)?;
        debug!(
            "{} paid {} with {} (change {})",
            self.id, price, payment.total, payment.overpay
        );
        Ok(payment)
    }

    fn add_coins(&mut self, coins: &CoinSet) -> CoreResult<()> {
        for (denom, count) in coins.iter() {
            let qty = u32::try_from(count)
                .map_err(|_| CoreError::invariant(format!("coin count {} overflows", count)))?;
            self.add_item(&economy::currency_item_id(denom), qty)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defs::{CultureDef, InventoryEntry, TraitDef};
    use crate::ids::CultureId;

    fn registry() -> DefinitionRegistry {
        let mut defs = DefinitionRegistry::new();
        let mut attribute_mods = BTreeMap::new();
        attribute_mods.insert(AttributeId::new("str"), 2);
        defs.load_culture(CultureDef {
            id: CultureId::new("nord"),
            display_name: "Nord".into(),
            attribute_mods,
            skill_mods: BTreeMap::new(),
        })
        .unwrap();

        let mut attribute_changes = BTreeMap::new();
        attribute_changes.insert(AttributeId::new("str"), 3);
        defs.load_trait(TraitDef {
            id: TraitId::new("strong"),
            name: "Strong".into(),
            description: String::new(),
            conflicts: vec![TraitId::new("frail")],
            attribute_changes,
            skill_changes: BTreeMap::new(),
        })
        .unwrap();
        defs.load_trait(TraitDef {
            id: TraitId::new("frail"),
            name: "Frail".into(),
            description: String::new(),
            conflicts: vec![],
            attribute_changes: BTreeMap::new(),
            skill_changes: BTreeMap::new(),
        })
        .unwrap();
        defs
    }

    fn smith() -> CharacterDef {
        let mut def = CharacterDef::new("smith", "Smith", true);
        def.culture_id = Some(CultureId::new("nord"));
        def.base_attributes.insert(AttributeId::new("str"), 10);
        def.initial_traits.push(TraitId::new("strong"));
        def.initial_inventory.push(InventoryEntry {
            item_id: ItemId::new("hammer"),
            quantity: 1,
        });
        def
    }

    #[test]
    fn test_from_def_applies_culture_and_traits() {
        let defs = registry();
        let state = CharacterState::from_def(CharacterStateId::new("smith"), &smith(), &defs).unwrap();

        assert_eq!(state.attributes[&AttributeId::new("str")], 12);
        assert_eq!(state.attribute(&defs, &AttributeId::new("str")).unwrap(), 15);
        assert_eq!(state.count(&ItemId::new("hammer")), 1);
    }

    #[test]
    fn test_conflicting_traits_rejected() {
        let defs = registry();
        let mut def = smith();
        def.initial_traits.push(TraitId::new("frail"));
        let err = CharacterState::from_def(CharacterStateId::new("smith"), &def, &defs).unwrap_err();
        assert!(err.to_string().contains("conflict"));
    }

    #[test]
    fn test_inventory_add_remove() {
        let defs = registry();
        let mut state = CharacterState::from_def(CharacterStateId::new("smith"), &smith(), &defs).unwrap();
        let ore = ItemId::new("iron_ore");

        assert!(state.add_item(&ore, 0).is_err());
        state.add_item(&ore, 3).unwrap();
        state.remove_item(&ore, 2).unwrap();
        assert_eq!(state.count(&ore), 1);
        assert!(state.remove_item(&ore, 2).is_err());
        state.remove_item(&ore, 1).unwrap();
        assert!(!state.inventory.contains_key(&ore));

        state.add_item(&ore, u32::MAX).unwrap();
        let err = state.add_item(&ore, 1).unwrap_err();
        assert!(matches!(err, CoreError::Invariant(_)));
        assert_eq!(state.count(&ore), u32::MAX);
    }

    #[test]
    fn test_earn_and_spend_money() {
        let defs = registry();
        let economy = EconomyConfig::default();
        let mut state = CharacterState::from_def(CharacterStateId::new("smith"), &smith(), &defs).unwrap();

        state.earn_money(250, &economy).unwrap();
        assert_eq!(state.money(), 250);
        assert_eq!(state.count(&economy::currency_item_id(100)), 2);

        let payment = state.spend_money(137, &economy).unwrap();
        assert_eq!(payment.total, 150);
        assert_eq!(state.money(), 113);

        assert!(state.spend_money(1000, &economy).is_err());
        assert_eq!(state.money(), 113);
    }
}
