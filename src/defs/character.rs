//! Character Definitions
//!
//! Characters plus the catalogs that shape them: attributes, skills, traits,
//! classes and cultures.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::ids::{
    AttributeId, CharacterDefId, ClassId, CultureId, DialogProfileId, ItemId, SkillId, TraitId,
};
use crate::registry::Definition;

/// Starting vitals for a character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vitals {
    pub health: u32,
    pub stamina: u32,
}

impl Default for Vitals {
    fn default() -> Self {
        Self {
            health: 100,
            stamina: 100,
        }
    }
}

/// A stack of items in an inventory or starting kit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub item_id: ItemId,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterDef {
    pub id: CharacterDefId,
    pub display_name: String,
    /// At most one live state may exist for a unique character
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub dialog_profile_id: Option<DialogProfileId>,
    #[serde(default)]
    pub culture_id: Option<CultureId>,
    #[serde(default)]
    pub class_id: Option<ClassId>,
    #[serde(default)]
    pub base_attributes: BTreeMap<AttributeId, i32>,
    #[serde(default)]
    pub base_skills: BTreeMap<SkillId, i32>,
    #[serde(default)]
    pub initial_traits: Vec<TraitId>,
    #[serde(default)]
    pub base_vitals: Vitals,
    #[serde(default)]
    pub initial_inventory: Vec<InventoryEntry>,
}

impl CharacterDef {
    pub fn new(id: &str, display_name: &str, unique: bool) -> Self {
        Self {
            id: CharacterDefId::new(id),
            display_name: display_name.to_string(),
            unique,
            dialog_profile_id: None,
            culture_id: None,
            class_id: None,
            base_attributes: BTreeMap::new(),
            base_skills: BTreeMap::new(),
            initial_traits: Vec::new(),
            base_vitals: Vitals::default(),
            initial_inventory: Vec::new(),
        }
    }
}

impl Definition for CharacterDef {
    type Id = CharacterDefId;
    const KIND: &'static str = "character";

    fn id(&self) -> &CharacterDefId {
        &self.id
    }

    fn validate(&self) -> CoreResult<()> {
        if self.display_name.is_empty() {
            return Err(CoreError::invalid(Self::KIND, &self.id, "display name is empty"));
        }
        if let Some(entry) = self.initial_inventory.iter().find(|e| e.quantity == 0) {
            return Err(CoreError::invalid(
                Self::KIND,
                &self.id,
                format!("inventory entry {} has quantity 0", entry.item_id),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDef {
    pub id: AttributeId,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl Definition for AttributeDef {
    type Id = AttributeId;
    const KIND: &'static str = "attribute";

    fn id(&self) -> &AttributeId {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillDef {
    pub id: SkillId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub governing_attributes: Vec<AttributeId>,
}

impl Definition for SkillDef {
    type Id = SkillId;
    const KIND: &'static str = "skill";

    fn id(&self) -> &SkillId {
        &self.id
    }

    fn validate(&self) -> CoreResult<()> {
        if self.governing_attributes.is_empty() {
            return Err(CoreError::invalid(
                Self::KIND,
                &self.id,
                "no governing attributes",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitDef {
    pub id: TraitId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Traits that cannot be held together with this one
    #[serde(default)]
    pub conflicts: Vec<TraitId>,
    #[serde(default)]
    pub attribute_changes: BTreeMap<AttributeId, i32>,
    #[serde(default)]
    pub skill_changes: BTreeMap<SkillId, i32>,
}

impl TraitDef {
    pub fn conflicts_with(&self, other: &TraitId) -> bool {
        self.conflicts.contains(other)
    }
}

impl Definition for TraitDef {
    type Id = TraitId;
    const KIND: &'static str = "trait";

    fn id(&self) -> &TraitId {
        &self.id
    }

    fn validate(&self) -> CoreResult<()> {
        if self.conflicts.contains(&self.id) {
            return Err(CoreError::invalid(Self::KIND, &self.id, "conflicts with itself"));
        }
        Ok(())
    }
}

/// Summed attribute and skill changes of a set of traits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraitModifiers {
    pub attributes: BTreeMap<AttributeId, i32>,
    pub skills: BTreeMap<SkillId, i32>,
}

impl TraitModifiers {
    pub fn add(&mut self, def: &TraitDef) {
        for (attr, delta) in &def.attribute_changes {
            *self.attributes.entry(attr.clone()).or_insert(0) += delta;
        }
        for (skill, delta) in &def.skill_changes {
            *self.skills.entry(skill.clone()).or_insert(0) += delta;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDef {
    pub id: ClassId,
    pub name: String,
    #[serde(default)]
    pub favored_attributes: Vec<AttributeId>,
    #[serde(default)]
    pub favored_skills: Vec<SkillId>,
}

impl Definition for ClassDef {
    type Id = ClassId;
    const KIND: &'static str = "class";

    fn id(&self) -> &ClassId {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CultureDef {
    pub id: CultureId,
    pub display_name: String,
    #[serde(default)]
    pub attribute_mods: BTreeMap<AttributeId, i32>,
    #[serde(default)]
    pub skill_mods: BTreeMap<SkillId, i32>,
}

impl Definition for CultureDef {
    type Id = CultureId;
    const KIND: &'static str = "culture";

    fn id(&self) -> &CultureId {
        &self.id
    }
}
