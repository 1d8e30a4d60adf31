use std::fs;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::layout::LayoutConfig;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TreeManifestEntry {
    pub id: String,
    pub title: String,
    /// File name relative to the data directory.
    pub file: String,
}

/// The single node whose selection configures the baseline pool/cap.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AwakeningNode {
    pub tree: String,
    pub skill: String,
    #[serde(default = "default_awakening_pool")]
    pub default_pool: i64,
    #[serde(default = "default_awakening_cap")]
    pub default_cap: i64,
}

impl Default for AwakeningNode {
    fn default() -> Self {
        Self {
            tree: "armament-tree".to_string(),
            skill: "armament_awakening".to_string(),
            default_pool: default_awakening_pool(),
            default_cap: default_awakening_cap(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "default_trees")]
    pub trees: Vec<TreeManifestEntry>,
    #[serde(default)]
    pub awakening: AwakeningNode,
    /// Used by `pool_choice` effects that do not declare a default.
    #[serde(default = "default_pool_choice")]
    pub pool_choice_default: i64,
    #[serde(default = "default_total_points")]
    pub default_total_points: u32,
    #[serde(default)]
    pub layout: LayoutConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            trees: default_trees(),
            awakening: AwakeningNode::default(),
            pool_choice_default: default_pool_choice(),
            default_total_points: default_total_points(),
            layout: LayoutConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn sanitized(mut self) -> Self {
        self.version = default_version();
        if self.trees.is_empty() {
            self.trees = default_trees();
        }
        self
    }
}

fn default_version() -> u32 {
    1
}

fn default_pool_choice() -> i64 {
    5
}

fn default_total_points() -> u32 {
    10
}

fn default_awakening_pool() -> i64 {
    5
}

fn default_awakening_cap() -> i64 {
    2
}

fn default_trees() -> Vec<TreeManifestEntry> {
    [
        ("armament-tree", "Armament Haki", "armament.json"),
        ("observation-tree", "Observation Haki", "observation.json"),
        ("conqueror-tree", "Conqueror's Haki", "conqueror.json"),
    ]
    .into_iter()
    .map(|(id, title, file)| TreeManifestEntry {
        id: id.to_string(),
        title: title.to_string(),
        file: file.to_string(),
    })
    .collect()
}

/// Locates the config file and the data/state directories from the environment.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn from_env() -> Self {
        if let Some(explicit) = std::env::var_os("HAKITREE_CONFIG") {
            return Self {
                path: PathBuf::from(explicit),
            };
        }

        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var_os("HOME").map(|home| {
                    let mut p = PathBuf::from(home);
                    p.push(".config");
                    p
                })
            })
            .unwrap_or_else(|| PathBuf::from("."));

        let mut path = base;
        path.push("hakitree");
        path.push("config.json");
        Self { path }
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Missing or unreadable config falls back to defaults.
    pub fn load(&self) -> EngineConfig {
        let Ok(bytes) = fs::read(&self.path) else {
            return EngineConfig::default();
        };
        match serde_json::from_slice::<EngineConfig>(&bytes) {
            Ok(config) => config.sanitized(),
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "ignoring unparsable config"
                );
                EngineConfig::default()
            }
        }
    }

    pub fn save(&self, config: &EngineConfig) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let text = serde_json::to_string_pretty(config)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(&self.path, text)
    }
}

pub fn data_dir_from_env() -> PathBuf {
    if let Some(p) = std::env::var_os("HAKITREE_DATA_DIR") {
        return PathBuf::from(p);
    }
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("assets")
}

pub fn state_dir_from_env() -> PathBuf {
    if let Some(p) = std::env::var_os("HAKITREE_STATE_DIR") {
        return PathBuf::from(p);
    }

    // `CARGO_MANIFEST_DIR` is `.../engine`; the workspace `target/` lives at `..`.
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("target")
        .join("hakitree")
}
