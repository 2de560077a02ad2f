//! Static content definitions that do not belong to a larger subsystem.
//! Dialog, quest and schedule definitions live with their engines.

mod character;
mod item;
mod world;

pub use character::{
    AttributeDef, CharacterDef, ClassDef, CultureDef, InventoryEntry, SkillDef, TraitDef,
    TraitModifiers, Vitals,
};
pub use item::{ItemDef, ItemKind};
pub use world::{MapDef, ScenarioCharacter, ScenarioDef, ShopStock, ShopkeeperDef};
