//! Engine Configuration
//!
//! Loaded from a TOML file. Every field has a default so a partial (or empty)
//! file is valid.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::economy::DEFAULT_DENOMINATIONS;
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Directory scanned for content TOML files
    pub content_dir: PathBuf,
    /// Default tracing directive when RUST_LOG is unset
    pub log_filter: String,
    pub npc: NpcConfig,
    pub economy: EconomyConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NpcConfig {
    /// Minimum duration of one background jobs iteration
    pub background_min_period_ms: u64,
    /// Frames an NPC may stay blocked before it is reported stuck
    pub stuck_after_frames: u32,
    /// A* expansion cap per path request
    pub max_path_iterations: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomyConfig {
    pub denominations: Vec<u64>,
    /// Search bound for `best_payment`; defaults to the largest denomination
    pub prune_slack: Option<u64>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            content_dir: PathBuf::from("data"),
            log_filter: "rpg_core=info".to_string(),
            npc: NpcConfig::default(),
            economy: EconomyConfig::default(),
        }
    }
}

impl Default for NpcConfig {
    fn default() -> Self {
        Self {
            background_min_period_ms: 100,
            stuck_after_frames: 30,
            max_path_iterations: 1000,
        }
    }
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            denominations: DEFAULT_DENOMINATIONS.to_vec(),
            prune_slack: None,
        }
    }
}

impl EconomyConfig {
    pub fn largest_denomination(&self) -> u64 {
        self.denominations.iter().copied().max().unwrap_or(0)
    }

    pub fn effective_prune_slack(&self) -> u64 {
        self.prune_slack.unwrap_or_else(|| self.largest_denomination())
    }
}

impl CoreConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            info!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("failed to read {:?}: {}", path, e)))?;
        let config = Self::from_toml_str(&content)
            .map_err(|e| CoreError::Config(format!("{:?}: {}", path, e)))?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> CoreResult<Self> {
        let config: CoreConfig =
            toml::from_str(content).map_err(|e| CoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.npc.background_min_period_ms == 0 {
            return Err(CoreError::Config(
                "npc.background_min_period_ms must be greater than zero".into(),
            ));
        }

        let denoms = &self.economy.denominations;
        if denoms.is_empty() {
            return Err(CoreError::Config("economy.denominations is empty".into()));
        }
        if denoms.contains(&0) {
            return Err(CoreError::Config("economy.denominations contains 0".into()));
        }
        let mut sorted = denoms.clone();
        sorted.sort_unstable();
        sorted.dedup();
        if sorted.len() != denoms.len() {
            return Err(CoreError::Config("economy.denominations has duplicates".into()));
        }
        if !denoms.contains(&1) {
            // without a unit coin some change amounts cannot be made
            return Err(CoreError::Config("economy.denominations must include 1".into()));
        }
        if let Some(slack) = self.economy.prune_slack {
            let largest = self.economy.largest_denomination();
            if slack < largest {
                return Err(CoreError::Config(format!(
                    "economy.prune_slack {} is below the largest denomination {}",
                    slack, largest
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_file_is_default() {
        let config = CoreConfig::from_toml_str("").unwrap();
        assert_eq!(config, CoreConfig::default());
        assert_eq!(config.economy.effective_prune_slack(), 1000);
    }

    #[test]
    fn test_partial_override() {
        let config = CoreConfig::from_toml_str(
            r#"
content_dir = "content"

[npc]
background_min_period_ms = 25
"#,
        )
        .unwrap();
        assert_eq!(config.content_dir, PathBuf::from("content"));
        assert_eq!(config.npc.background_min_period_ms, 25);
        assert_eq!(config.npc.stuck_after_frames, 30);
    }

    #[test]
    fn test_rejects_small_prune_slack() {
        let err = CoreConfig::from_toml_str(
            r#"
[economy]
prune_slack = 50
"#,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn test_rejects_missing_unit_coin() {
        let err = CoreConfig::from_toml_str(
            r#"
[economy]
denominations = [100, 10, 5]
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("include 1"));
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("rpg.toml");
        std::fs::write(&path, "log_filter = \"rpg_core=debug\"\n").unwrap();

        let config = CoreConfig::load(&path).unwrap();
        assert_eq!(config.log_filter, "rpg_core=debug");

        let missing = CoreConfig::load(&temp_dir.path().join("nope.toml")).unwrap();
        assert_eq!(missing, CoreConfig::default());
    }
}
