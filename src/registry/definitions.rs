//! Definitions Registry
//!
//! Load-once, read-many catalogs for every content type. Loading rejects
//! empty, duplicate and structurally invalid definitions; lookups reject
//! empty and unknown ids. After all content is in, `validate_references`
//! checks every cross-reference between catalogs.

use tracing::info;

use super::catalog::{Catalog, Definition};
use crate::defs::{
    AttributeDef, CharacterDef, ClassDef, CultureDef, ItemDef, MapDef, ScenarioDef, ShopkeeperDef,
    SkillDef, TraitDef, TraitModifiers,
};
use crate::dialog::{DialogProfileDef, DialogResponse, DialogTopic};
use crate::error::{CoreError, CoreResult};
use crate::ids::{
    AttributeId, CharacterDefId, ClassId, CultureId, DialogProfileId, ItemId, MapId, QuestId,
    ScenarioId, ScheduleId, ShopId, SkillId, TopicId, TraitId,
};
use crate::npc::{ScheduleDef, validate_task_chain};
use crate::quest::{QuestAction, QuestCondition, QuestDef};

macro_rules! catalog_accessors {
    ($($field:ident: $def:ty, $id:ty => $load:ident, $get:ident, $contains:ident, $ids:ident;)+) => {
        impl DefinitionRegistry {
            $(
                pub fn $load(&mut self, def: $def) -> CoreResult<()> {
                    self.$field.load(def)
                }

                pub fn $get(&self, id: &$id) -> CoreResult<&$def> {
                    self.$field.get(id)
                }

                pub fn $contains(&self, id: &$id) -> bool {
                    self.$field.contains(id)
                }

                pub fn $ids(&self) -> Vec<$id> {
                    self.$field.ids()
                }
            )+

            /// Total number of definitions across all catalogs.
            pub fn len(&self) -> usize {
                0 $(+ self.$field.len())+
            }

            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }

            fn log_counts(&self) {
                $(
                    if !self.$field.is_empty() {
                        info!("  {} {} definitions", self.$field.len(), <$def as Definition>::KIND);
                    }
                )+
            }
        }
    };
}

/// Every static content catalog.
#[derive(Debug, Clone, Default)]
pub struct DefinitionRegistry {
    items: Catalog<ItemDef>,
    maps: Catalog<MapDef>,
    scenarios: Catalog<ScenarioDef>,
    shopkeepers: Catalog<ShopkeeperDef>,
    dialog_topics: Catalog<DialogTopic>,
    dialog_profiles: Catalog<DialogProfileDef>,
    schedules: Catalog<ScheduleDef>,
    characters: Catalog<CharacterDef>,
    traits: Catalog<TraitDef>,
    attributes: Catalog<AttributeDef>,
    skills: Catalog<SkillDef>,
    classes: Catalog<ClassDef>,
    cultures: Catalog<CultureDef>,
    quests: Catalog<QuestDef>,
}

catalog_accessors! {
    items: ItemDef, ItemId => load_item, item, contains_item, item_ids;
    maps: MapDef, MapId => load_map, map, contains_map, map_ids;
    scenarios: ScenarioDef, ScenarioId => load_scenario, scenario, contains_scenario, scenario_ids;
    shopkeepers: ShopkeeperDef, ShopId => load_shopkeeper, shopkeeper, contains_shopkeeper, shopkeeper_ids;
    dialog_topics: DialogTopic, TopicId => load_dialog_topic, dialog_topic, contains_dialog_topic, dialog_topic_ids;
    dialog_profiles: DialogProfileDef, DialogProfileId => load_dialog_profile, dialog_profile, contains_dialog_profile, dialog_profile_ids;
    schedules: ScheduleDef, ScheduleId => load_schedule, schedule, contains_schedule, schedule_ids;
    characters: CharacterDef, CharacterDefId => load_character, character, contains_character, character_ids;
    traits: TraitDef, TraitId => load_trait, trait_def, contains_trait, trait_ids;
    attributes: AttributeDef, AttributeId => load_attribute, attribute, contains_attribute, attribute_ids;
    skills: SkillDef, SkillId => load_skill, skill, contains_skill, skill_ids;
    classes: ClassDef, ClassId => load_class, class, contains_class, class_ids;
    cultures: CultureDef, CultureId => load_culture, culture, contains_culture, culture_ids;
    quests: QuestDef, QuestId => load_quest, quest, contains_quest, quest_ids;
}

impl DefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quests(&self) -> impl Iterator<Item = &QuestDef> {
        self.quests.iter()
    }

    /// Sum the attribute and skill changes of `trait_ids`.
    pub fn net_trait_modifiers(&self, trait_ids: &[TraitId]) -> CoreResult<TraitModifiers> {
        let mut mods = TraitModifiers::default();
        for id in trait_ids {
            mods.add(self.trait_def(id)?);
        }
        Ok(mods)
    }

    /// Check every cross-catalog reference. Run once after all content loads.
    pub fn validate_references(&self) -> CoreResult<()> {
        for character in self.characters.iter() {
            let kind = CharacterDef::KIND;
            let id = &character.id;
            if let Some(profile) = &character.dialog_profile_id {
                dangling(kind, id, "dialog profile", profile, self.contains_dialog_profile(profile))?;
            }
            if let Some(culture) = &character.culture_id {
                dangling(kind, id, "culture", culture, self.contains_culture(culture))?;
            }
            if let Some(class) = &character.class_id {
                dangling(kind, id, "class", class, self.contains_class(class))?;
            }
            for t in &character.initial_traits {
                dangling(kind, id, "trait", t, self.contains_trait(t))?;
            }
            for attr in character.base_attributes.keys() {
                dangling(kind, id, "attribute", attr, self.contains_attribute(attr))?;
            }
            for skill in character.base_skills.keys() {
                dangling(kind, id, "skill", skill, self.contains_skill(skill))?;
            }
            for entry in &character.initial_inventory {
                dangling(kind, id, "item", &entry.item_id, self.contains_item(&entry.item_id))?;
            }
        }

        for profile in self.dialog_profiles.iter() {
            for topic in &profile.topics {
                dangling(DialogProfileDef::KIND, &profile.id, "topic", topic, self.contains_dialog_topic(topic))?;
            }
            self.check_response_topics(DialogProfileDef::KIND, &profile.id, &profile.greeting)?;
        }

        for topic in self.dialog_topics.iter() {
            self.check_response_topics(DialogTopic::KIND, &topic.id, &topic.responses)?;
        }

        for scenario in self.scenarios.iter() {
            let kind = ScenarioDef::KIND;
            let id = &scenario.id;
            dangling(kind, id, "map", &scenario.map_id, self.contains_map(&scenario.map_id))?;
            for c in &scenario.characters {
                dangling(kind, id, "character", &c.char_def_id, self.contains_character(&c.char_def_id))?;
                if let Some(schedule) = &c.schedule_id {
                    dangling(kind, id, "schedule", schedule, self.contains_schedule(schedule))?;
                }
                if let Some(profile) = &c.dialog_profile_id {
                    dangling(kind, id, "dialog profile", profile, self.contains_dialog_profile(profile))?;
                }
            }
        }

        for shop in self.shopkeepers.iter() {
            for stock in &shop.stock {
                dangling(ShopkeeperDef::KIND, &shop.id, "item", &stock.item_id, self.contains_item(&stock.item_id))?;
            }
        }

        for skill in self.skills.iter() {
            for attr in &skill.governing_attributes {
                dangling(SkillDef::KIND, &skill.id, "attribute", attr, self.contains_attribute(attr))?;
            }
        }

        for schedule in self.schedules.iter() {
            for task in schedule.hourly.values() {
                validate_task_chain(task)?;
            }
        }

        for t in self.traits.iter() {
            for other in &t.conflicts {
                dangling(TraitDef::KIND, &t.id, "trait", other, self.contains_trait(other))?;
            }
        }

        for quest in self.quests.iter() {
            self.check_quest_references(quest)?;
        }

        info!("Definition references validated ({} definitions)", self.len());
        self.log_counts();
        Ok(())
    }

    fn check_response_topics(
        &self,
        kind: &'static str,
        owner: &impl std::fmt::Display,
        responses: &[DialogResponse],
    ) -> CoreResult<()> {
        let mut topics = Vec::new();
        for response in responses {
            response.referenced_topics(&mut topics);
        }
        for topic in &topics {
            dangling(kind, owner, "topic", topic, self.contains_dialog_topic(topic))?;
        }
        Ok(())
    }

    fn check_quest_references(&self, quest: &QuestDef) -> CoreResult<()> {
        let kind = QuestDef::KIND;
        let id = &quest.id;
        for cond in quest.conditions() {
            if let QuestCondition::QuestStatus { quest: other, .. } = cond {
                dangling(kind, id, "quest", other, self.contains_quest(other))?;
            }
        }
        for action in quest.actions() {
            match action {
                QuestAction::AssignTask { character, task } => {
                    let def = self.character(character).map_err(|_| {
                        CoreError::invalid(kind, id, format!("references unknown character '{}'", character))
                    })?;
                    if !def.unique {
                        return Err(CoreError::invalid(
                            kind,
                            id,
                            format!("assigns a task to non-unique character '{}'", character),
                        ));
                    }
                    validate_task_chain(task)?;
                }
                QuestAction::QueueScenario { scenario } => {
                    dangling(kind, id, "scenario", scenario, self.contains_scenario(scenario))?;
                }
                QuestAction::UnlockMapLock { map, lock } => {
                    let map_def = self.map(map).map_err(|_| {
                        CoreError::invalid(kind, id, format!("references unknown map '{}'", map))
                    })?;
                    if !map_def.locks.contains(lock) {
                        return Err(CoreError::invalid(
                            kind,
                            id,
                            format!("references unknown lock '{}' on map '{}'", lock, map),
                        ));
                    }
                }
                QuestAction::AddGold { .. } | QuestAction::Broadcast { .. } => {}
            }
        }
        Ok(())
    }
}

fn dangling(
    kind: &'static str,
    owner: &impl std::fmt::Display,
    target_kind: &str,
    target: &impl std::fmt::Display,
    exists: bool,
) -> CoreResult<()> {
    if exists {
        return Ok(());
    }
    Err(CoreError::invalid(
        kind,
        owner,
        format!("references unknown {} '{}'", target_kind, target),
    ))
}
