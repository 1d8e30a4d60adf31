use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::config::AwakeningNode;
use crate::error::{EngineError, EngineResult};
use crate::graph::{SkillCatalog, prerequisites_satisfied};
use crate::selection::{AuxiliaryValue, AwakeningConfig, SelectionKey, Session};
use crate::stats::{CharacterStats, session_stats};
use crate::storage::StorageBackend;

/// Autosave / explicit save record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRecord {
    #[serde(default)]
    pub selected: Vec<String>,
    #[serde(default)]
    pub total_points: Option<u32>,
    #[serde(default)]
    pub char_name: String,
    #[serde(default)]
    pub pool_choices: BTreeMap<String, i64>,
    #[serde(default)]
    pub awakening_values: BTreeMap<String, AwakeningConfig>,
}

/// Standalone character document written by export and read back by import.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    #[serde(default)]
    pub char_name: String,
    #[serde(default)]
    pub initial_pool: Option<i64>,
    #[serde(default)]
    pub initial_cap: Option<i64>,
    #[serde(default)]
    pub total_points: Option<u32>,
    #[serde(default)]
    pub selected: Vec<String>,
    #[serde(default)]
    pub pool_choices: BTreeMap<String, i64>,
    /// Derived; ignored on import.
    #[serde(default)]
    pub stats: Option<CharacterStats>,
}

/// `Monkey D. Luffy` -> `Monkey_D._Luffy.json`.
pub fn export_file_name(char_name: &str) -> String {
    let name = if char_name.trim().is_empty() {
        "character".to_string()
    } else {
        char_name.split_whitespace().collect::<Vec<_>>().join("_")
    };
    format!("{name}.json")
}

/// Converts sessions to and from their saved forms. Decoding validates against the catalog
/// and never touches the caller's current session.
#[derive(Debug, Clone, Copy)]
pub struct PersistenceCodec<'a> {
    catalog: &'a SkillCatalog,
    awakening: &'a AwakeningNode,
}

impl<'a> PersistenceCodec<'a> {
    pub fn new(catalog: &'a SkillCatalog, awakening: &'a AwakeningNode) -> Self {
        Self { catalog, awakening }
    }

    pub fn encode(&self, session: &Session) -> SaveRecord {
        let mut pool_choices = BTreeMap::new();
        let mut awakening_values = BTreeMap::new();
        for (key, value) in session.auxiliary_values() {
            match value {
                AuxiliaryValue::PoolChoice(v) => {
                    pool_choices.insert(key.skill.clone(), v);
                }
                AuxiliaryValue::Awakening(cfg) => {
                    awakening_values.insert(key.skill.clone(), cfg);
                }
            }
        }
        SaveRecord {
            selected: session.selected().map(ToString::to_string).collect(),
            total_points: Some(session.total_points),
            char_name: session.character_name.clone(),
            pool_choices,
            awakening_values,
        }
    }

    /// Rebuilds a session from `record`. `current` only supplies the budget when the record
    /// carries none.
    pub fn decode(&self, record: &SaveRecord, current: &Session) -> EngineResult<Session> {
        let selected = self.parse_selection(&record.selected)?;
        let mut auxiliary = BTreeMap::new();

        for (skill, value) in &record.pool_choices {
            let targets: Vec<&SelectionKey> = selected
                .iter()
                .filter(|k| &k.skill == skill && !self.is_awakening(k))
                .filter(|k| {
                    self.catalog
                        .node(&k.tree, &k.skill)
                        .is_some_and(|n| n.pool_choice_default().is_some())
                })
                .collect();
            if targets.is_empty() {
                tracing::warn!(
                    skill = %skill,
                    "dropping pool choice for a skill that is not selected"
                );
            }
            for key in targets {
                auxiliary.insert(key.clone(), AuxiliaryValue::PoolChoice(*value));
            }
        }

        for (skill, cfg) in &record.awakening_values {
            let key = self.awakening_key();
            if &key.skill == skill && selected.contains(&key) {
                auxiliary.insert(key, AuxiliaryValue::Awakening(*cfg));
            } else {
                tracing::warn!(
                    skill = %skill,
                    "dropping awakening values for a skill that is not the selected awakening node"
                );
            }
        }

        let session = Session::from_parts(
            record.total_points.unwrap_or(current.total_points),
            record.char_name.clone(),
            selected,
            auxiliary,
        );
        self.check_invariants(&session)?;
        Ok(session)
    }

    pub fn to_json(&self, session: &Session) -> EngineResult<String> {
        serde_json::to_string_pretty(&self.encode(session))
            .map_err(|e| EngineError::corrupt(e.to_string()))
    }

    pub fn from_json(&self, json: &str, current: &Session) -> EngineResult<Session> {
        let record: SaveRecord =
            serde_json::from_str(json).map_err(|e| EngineError::corrupt(e.to_string()))?;
        self.decode(&record, current)
    }

    pub fn export(&self, session: &Session) -> ExportDocument {
        let base = session.awakening().map(|(_, cfg)| cfg);
        let record = self.encode(session);
        ExportDocument {
            char_name: session.character_name.clone(),
            initial_pool: base.map(|cfg| cfg.pool),
            initial_cap: base.map(|cfg| cfg.cap),
            total_points: Some(session.total_points),
            selected: record.selected,
            pool_choices: record.pool_choices,
            stats: Some(session_stats(session, self.catalog)),
        }
    }

    pub fn export_json(&self, session: &Session) -> EngineResult<String> {
        serde_json::to_string_pretty(&self.export(session))
            .map_err(|e| EngineError::corrupt(e.to_string()))
    }

    /// Structural inverse of [`Self::export`]. The baseline pool/cap lands on the awakening
    /// node when that node is selected.
    pub fn import(&self, doc: &ExportDocument, current: &Session) -> EngineResult<Session> {
        let mut awakening_values = BTreeMap::new();
        if doc.initial_pool.is_some() || doc.initial_cap.is_some() {
            awakening_values.insert(
                self.awakening.skill.clone(),
                AwakeningConfig {
                    pool: doc.initial_pool.unwrap_or(0),
                    cap: doc.initial_cap.unwrap_or(0),
                },
            );
        }
        let selected = self.parse_selection(&doc.selected)?;
        if !selected.contains(&self.awakening_key()) {
            awakening_values.clear();
        }

        let record = SaveRecord {
            selected: doc.selected.clone(),
            total_points: doc.total_points,
            char_name: doc.char_name.clone(),
            pool_choices: doc.pool_choices.clone(),
            awakening_values,
        };
        self.decode(&record, current)
    }

    pub fn import_json(&self, json: &str, current: &Session) -> EngineResult<Session> {
        let doc: ExportDocument =
            serde_json::from_str(json).map_err(|e| EngineError::corrupt(e.to_string()))?;
        self.import(&doc, current)
    }

    /// Writes the session under `slot`.
    pub fn store(
        &self,
        storage: &mut dyn StorageBackend,
        slot: &str,
        session: &Session,
    ) -> EngineResult<()> {
        storage.set(slot, &self.to_json(session)?)?;
        Ok(())
    }

    /// Reads `slot`; `Ok(None)` when nothing was saved there.
    pub fn load(
        &self,
        storage: &dyn StorageBackend,
        slot: &str,
        current: &Session,
    ) -> EngineResult<Option<Session>> {
        match storage.get(slot)? {
            Some(json) => self.from_json(&json, current).map(Some),
            None => Ok(None),
        }
    }

    fn awakening_key(&self) -> SelectionKey {
        SelectionKey::new(self.awakening.tree.clone(), self.awakening.skill.clone())
    }

    fn is_awakening(&self, key: &SelectionKey) -> bool {
        key.tree == self.awakening.tree && key.skill == self.awakening.skill
    }

    fn parse_selection(&self, raw: &[String]) -> EngineResult<BTreeSet<SelectionKey>> {
        let mut selected = BTreeSet::new();
        for entry in raw {
            let key = SelectionKey::parse(entry)
                .ok_or_else(|| EngineError::corrupt(format!("malformed selection key {entry:?}")))?;
            if self.catalog.node(&key.tree, &key.skill).is_none() {
                return Err(EngineError::corrupt(format!("unknown skill {key}")));
            }
            selected.insert(key);
        }
        Ok(selected)
    }

    fn check_invariants(&self, session: &Session) -> EngineResult<()> {
        for key in session.selected() {
            let Some(node) = self.catalog.node(&key.tree, &key.skill) else {
                return Err(EngineError::corrupt(format!("unknown skill {key}")));
            };
            if !prerequisites_satisfied(node, |r| session.is_selected(&key.tree, r)) {
                return Err(EngineError::corrupt(format!(
                    "{key} is selected without its prerequisites"
                )));
            }
        }
        let spent = session.spent(self.catalog);
        if spent > session.total_points as u64 {
            return Err(EngineError::corrupt(format!(
                "selection costs {spent} but only {} points are available",
                session.total_points
            )));
        }
        Ok(())
    }
}
