//! Synchronization and classification settings.
//!
//! Every field has a default matching the live game's layout, so an empty
//! TOML document yields a working configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::aspects::DEFAULT_WORKSTATION_FILTER_ASPECTS;
use crate::error::ConfigError;

const DEFAULT_SPHERE_PREFIXES: &[&str] = &[
    "~/portage1",
    "~/portage2",
    "~/portage3",
    "~/portage4",
    "~/portage5",
    "~/hand.abilities",
    "~/hand.skills",
    "~/hand.memories",
    "~/hand.misc",
    "~/library",
    "~/fixedverbs",
];

const DEFAULT_PAYLOAD_TYPES: &[&str] = &[
    "ConnectedTerrain",
    "ElementStack",
    "Situation",
    "WorkstationSituation",
    "RoomWorkSituation",
];

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Delay between polls while the game is running.
    pub poll_interval_ms: u64,
    /// Spheres whose tokens are fetched each poll.
    pub sphere_prefixes: Vec<String>,
    /// Payload types requested from the API.
    pub payload_types: Vec<String>,
    /// Tokens under this prefix are only visible inside an unshrouded terrain.
    pub terrain_sphere_prefix: String,
    /// Path prefix of the "consider" situation.
    pub consider_path_prefix: String,
    /// Verb of the situation that unlocks terrains.
    pub terrain_unlock_verb: String,
    /// Verb prefixes that are never offered as workstations.
    pub excluded_workstation_verb_prefixes: Vec<String>,
    /// Verb prefixes of harvest stations.
    pub harvest_verb_prefixes: Vec<String>,
    /// Exact verbs of harvest stations.
    pub harvest_verbs: Vec<String>,
    /// Recipe requirement aspects that a workstation must accept.
    pub workstation_filter_aspects: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            sphere_prefixes: strings(DEFAULT_SPHERE_PREFIXES),
            payload_types: strings(DEFAULT_PAYLOAD_TYPES),
            terrain_sphere_prefix: "~/library".to_string(),
            consider_path_prefix: "~/fixedverbs!consider.".to_string(),
            terrain_unlock_verb: "terrain.unlock".to_string(),
            excluded_workstation_verb_prefixes: strings(&["library.bed.", "garden."]),
            harvest_verb_prefixes: strings(&["garden."]),
            harvest_verbs: strings(&["world.beachcombing"]),
            workstation_filter_aspects: strings(DEFAULT_WORKSTATION_FILTER_ASPECTS),
        }
    }
}

impl SyncConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse {
            detail: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "poll_interval_ms",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Never zero, even for a hand-built config that skipped validation.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Harvest stations: `garden.*` verbs and beachcombing by default.
    pub fn is_harvest_verb(&self, verb_id: &str) -> bool {
        self.harvest_verbs.iter().any(|v| v == verb_id)
            || self
                .harvest_verb_prefixes
                .iter()
                .any(|prefix| verb_id.starts_with(prefix.as_str()))
    }

    /// Workstations: every situation that is neither excluded nor a harvest
    /// station (by exact verb or by prefix).
    pub fn is_workstation_verb(&self, verb_id: &str) -> bool {
        let excluded = self
            .excluded_workstation_verb_prefixes
            .iter()
            .any(|prefix| verb_id.starts_with(prefix.as_str()));
        !excluded && !self.is_harvest_verb(verb_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = SyncConfig::from_toml_str("").unwrap();
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.sphere_prefixes.len(), 11);
    }

    #[test]
    fn partial_document_overrides_fields() {
        let config = SyncConfig::from_toml_str(
            r#"
            poll_interval_ms = 250
            harvest_verbs = ["world.fishing"]
            "#,
        )
        .unwrap();
        assert_eq!(config.poll_interval_ms, 250);
        assert!(config.is_harvest_verb("world.fishing"));
        assert!(!config.is_harvest_verb("world.beachcombing"));
        assert_eq!(config.terrain_unlock_verb, "terrain.unlock");
    }

    #[test]
    fn malformed_document_is_a_parse_error() {
        let result = SyncConfig::from_toml_str("poll_interval_ms = \"soon\"");
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let result = SyncConfig::from_toml_str("poll_interval_ms = 0");
        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                field: "poll_interval_ms",
                ..
            })
        ));

        let config = SyncConfig {
            poll_interval_ms: 0,
            ..SyncConfig::default()
        };
        assert_eq!(config.poll_interval(), Duration::from_millis(1));
    }

    #[test]
    fn workstation_classification() {
        let config = SyncConfig::default();
        assert!(config.is_workstation_verb("library.desk"));
        assert!(!config.is_workstation_verb("library.bed.guest"));
        assert!(!config.is_workstation_verb("garden.herbs"));
        assert!(!config.is_workstation_verb("world.beachcombing"));
        assert!(config.is_harvest_verb("garden.herbs"));
        assert!(config.is_harvest_verb("world.beachcombing"));
    }

    #[test]
    fn harvest_prefixes_are_never_workstations() {
        let config = SyncConfig {
            excluded_workstation_verb_prefixes: Vec::new(),
            harvest_verb_prefixes: vec!["orchard.".to_string()],
            ..SyncConfig::default()
        };
        assert!(config.is_harvest_verb("orchard.apples"));
        assert!(!config.is_workstation_verb("orchard.apples"));
        assert!(config.is_workstation_verb("library.bed.guest"));
    }

    #[test]
    fn loads_from_path() {
        let dir = std::env::temp_dir().join(format!("shgame-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("sync.toml");
        std::fs::write(&path, "terrain_sphere_prefix = \"~/house\"\n").unwrap();

        let config = SyncConfig::from_path(&path).unwrap();
        assert_eq!(config.terrain_sphere_prefix, "~/house");

        let missing = SyncConfig::from_path(&dir.join("missing.toml"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
