//! Content Loading
//!
//! Reads every `*.toml` file under a directory tree into a fresh
//! [`DefinitionRegistry`]. A file may hold any mix of content arrays; files
//! load in path order and cross-references are checked once at the end.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::defs::{
    AttributeDef, CharacterDef, ClassDef, CultureDef, ItemDef, MapDef, ScenarioDef, ShopkeeperDef,
    SkillDef, TraitDef,
};
use crate::dialog::{DialogProfileDef, DialogTopic};
use crate::error::{CoreError, CoreResult};
use crate::ids::ScheduleId;
use crate::npc::{ScheduleDef, TaskDef, build_schedule};
use crate::quest::QuestDef;
use crate::registry::DefinitionRegistry;

/// One hour of a sparse schedule as authored
#[derive(Debug, Deserialize)]
struct RawScheduleEntry {
    hour: u8,
    task: TaskDef,
}

#[derive(Debug, Deserialize)]
struct RawSchedule {
    id: ScheduleId,
    entries: Vec<RawScheduleEntry>,
}

impl RawSchedule {
    fn build(self) -> CoreResult<ScheduleDef> {
        let mut sparse = BTreeMap::new();
        for entry in self.entries {
            if sparse.insert(entry.hour, entry.task).is_some() {
                return Err(CoreError::invalid(
                    "schedule",
                    &self.id,
                    format!("hour {} set twice", entry.hour),
                ));
            }
        }
        build_schedule(self.id, sparse)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ContentFile {
    items: Vec<ItemDef>,
    maps: Vec<MapDef>,
    scenarios: Vec<ScenarioDef>,
    shopkeepers: Vec<ShopkeeperDef>,
    dialog_topics: Vec<DialogTopic>,
    dialog_profiles: Vec<DialogProfileDef>,
    schedules: Vec<RawSchedule>,
    characters: Vec<CharacterDef>,
    traits: Vec<TraitDef>,
    attributes: Vec<AttributeDef>,
    skills: Vec<SkillDef>,
    classes: Vec<ClassDef>,
    cultures: Vec<CultureDef>,
    quests: Vec<QuestDef>,
}

impl ContentFile {
    fn load_into(self, defs: &mut DefinitionRegistry) -> CoreResult<()> {
        for def in self.items {
            defs.load_item(def)?;
        }
        for def in self.maps {
            defs.load_map(def)?;
        }
        for def in self.scenarios {
            defs.load_scenario(def)?;
        }
        for def in self.shopkeepers {
            defs.load_shopkeeper(def)?;
        }
        for def in self.dialog_topics {
            defs.load_dialog_topic(def)?;
        }
        for def in self.dialog_profiles {
            defs.load_dialog_profile(def)?;
        }
        for raw in self.schedules {
            defs.load_schedule(raw.build()?)?;
        }
        for def in self.characters {
            defs.load_character(def)?;
        }
        for def in self.traits {
            defs.load_trait(def)?;
        }
        for def in self.attributes {
            defs.load_attribute(def)?;
        }
        for def in self.skills {
            defs.load_skill(def)?;
        }
        for def in self.classes {
            defs.load_class(def)?;
        }
        for def in self.cultures {
            defs.load_culture(def)?;
        }
        for def in self.quests {
            defs.load_quest(def)?;
        }
        Ok(())
    }
}

/// Load and validate every content file under `dir`.
pub fn load_dir(dir: &Path) -> CoreResult<DefinitionRegistry> {
    info!("Loading content from {:?}", dir);
    if !dir.is_dir() {
        return Err(CoreError::Content(format!("content directory {:?} does not exist", dir)));
    }

    let mut paths = Vec::new();
    collect_toml_files(dir, &mut paths)?;
    paths.sort();

    let mut defs = DefinitionRegistry::new();
    for path in &paths {
        load_file(path, &mut defs)?;
    }
    defs.validate_references()?;

    info!("Loaded {} definitions from {} files", defs.len(), paths.len());
    Ok(defs)
}

/// Parse one content file into `defs`. Errors name the file.
pub fn load_file(path: &Path, defs: &mut DefinitionRegistry) -> CoreResult<()> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| CoreError::Content(format!("Failed to read {:?}: {}", path, e)))?;
    let file: ContentFile = toml::from_str(&content)
        .map_err(|e| CoreError::Content(format!("Failed to parse {:?}: {}", path, e)))?;
    file.load_into(defs).map_err(|e| match e {
        CoreError::Content(msg) => CoreError::Content(format!("{:?}: {}", path, msg)),
        other => other,
    })?;
    debug!("Loaded content file {:?}", path);
    Ok(())
}

fn collect_toml_files(dir: &Path, paths: &mut Vec<PathBuf>) -> CoreResult<()> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| CoreError::Content(format!("Failed to read directory {:?}: {}", dir, e)))?;

    for entry in entries {
        let entry = entry.map_err(|e| CoreError::Content(format!("Failed to read entry: {}", e)))?;
        let path = entry.path();
        if path.is_dir() {
            collect_toml_files(&path, paths)?;
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            paths.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{CharacterDefId, ScheduleId};
    use std::fs;
    use tempfile::TempDir;

    const CHARACTERS: &str = r#"
[[characters]]
id = "smith"
display_name = "Smith"
unique = true

[[schedules]]
id = "smith_day"
entries = [
    { hour = 7, task = { task_id = "goto", params = { x = 2, y = 3 } } },
    { hour = 19, task = { task_id = "idle" } },
]
"#;

    const MAPS: &str = r#"
[[maps]]
id = "forge"
display_name = "The Forge"

[[scenarios]]
id = "forge_open"
map_id = "forge"

[[scenarios.characters]]
char_def_id = "smith"
schedule_id = "smith_day"
spawn = { x = 0, y = 0 }
"#;

    #[test]
    fn test_load_nested_dir() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("npcs")).unwrap();
        fs::write(dir.path().join("npcs/smith.toml"), CHARACTERS).unwrap();
        fs::write(dir.path().join("maps.toml"), MAPS).unwrap();
        fs::write(dir.path().join("notes.txt"), "not content").unwrap();

        let defs = load_dir(dir.path()).unwrap();
        assert!(defs.contains_character(&CharacterDefId::new("smith")));
        let schedule = defs.schedule(&ScheduleId::new("smith_day")).unwrap();
        assert_eq!(schedule.task_for_hour(3).unwrap().task_id.as_str(), "idle");
        assert_eq!(schedule.task_for_hour(12).unwrap().task_id.as_str(), "goto");
    }

    #[test]
    fn test_dangling_reference_fails_after_load() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("maps.toml"), MAPS).unwrap();
        assert!(load_dir(dir.path()).is_err());
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("broken.toml"), "[[items]]\nid = ").unwrap();
        let err = load_dir(dir.path()).unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn test_duplicate_across_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.toml"), CHARACTERS).unwrap();
        fs::write(dir.path().join("b.toml"), CHARACTERS).unwrap();
        assert!(matches!(load_dir(dir.path()), Err(CoreError::DuplicateId { .. })));
    }

    #[test]
    fn test_missing_dir_and_double_hour() {
        assert!(load_dir(Path::new("/definitely/not/here")).is_err());

        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("s.toml"),
            r#"
[[schedules]]
id = "twice"
entries = [{ hour = 1, task = { task_id = "idle" } }, { hour = 1, task = { task_id = "idle" } }]
"#,
        )
        .unwrap();
        assert!(load_dir(dir.path()).is_err());
    }
}
