use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::LoadError;

/// Designer-authored skill record, as found in the tree data files.
///
/// Everything is optional here; [`SkillTree::from_records`] applies the defaults and turns the
/// loose record into a [`SkillNode`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawSkillRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub requires: Option<OneOrMany>,
    #[serde(default, alias = "requires_operator")]
    pub requires_operator: Option<String>,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default)]
    pub effects: Vec<RawEffect>,
    #[serde(default, alias = "Tier")]
    pub tier: Option<i32>,
    #[serde(default)]
    pub position_tag: Option<String>,
    #[serde(default)]
    pub position_offset_x: Option<f64>,
    #[serde(default)]
    pub position_offset_y: Option<f64>,
    /// Older data files only carry a vertical nudge under this name.
    #[serde(default)]
    pub position_offset: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
}

/// `requires` may be written as a single id or a list of ids.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(id) => vec![id],
            Self::Many(ids) => ids,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawEffect {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub delta: Option<i64>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub slot: Option<String>,
    #[serde(default)]
    pub default: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillType {
    Offense,
    Defense,
    #[default]
    Shared,
}

impl SkillType {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("offense") => Self::Offense,
            Some("defense") => Self::Defense,
            _ => Self::Shared,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Offense => "offense",
            Self::Defense => "defense",
            Self::Shared => "shared",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequiresOperator {
    And,
    Or,
    #[default]
    Unspecified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionTag {
    Up,
    Left,
    Right,
    UpLeft,
    UpRight,
    DownLeft,
    DownRight,
    Between,
}

impl PositionTag {
    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw.trim().to_ascii_lowercase().as_str() {
            "up" => Self::Up,
            "left" => Self::Left,
            "right" => Self::Right,
            "upleft" => Self::UpLeft,
            "upright" => Self::UpRight,
            "downleft" => Self::DownLeft,
            "downright" => Self::DownRight,
            "between" => Self::Between,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Left => "left",
            Self::Right => "right",
            Self::UpLeft => "upleft",
            Self::UpRight => "upright",
            Self::DownLeft => "downleft",
            Self::DownRight => "downright",
            Self::Between => "between",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiceSlot {
    Attack,
    Defend,
    #[default]
    Both,
}

/// A typed modifier a selected node contributes to the character stats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Effect {
    Pool { delta: i64 },
    PoolChoice { default: i64 },
    Cap { delta: i64 },
    CapAttack { delta: i64 },
    CapDefend { delta: i64 },
    Dice { value: String, slot: DiceSlot },
    DiceAttack { value: String },
    DiceDefend { value: String },
    FocusModifier { delta: i64 },
    ObservationRange { delta: i64 },
}

impl Effect {
    fn from_raw(raw: RawEffect, pool_choice_default: i64) -> Result<Self, String> {
        let delta = raw.delta.unwrap_or(0);
        let die = || match &raw.value {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        let effect = match raw.kind.trim().to_ascii_lowercase().as_str() {
            "pool" => Self::Pool { delta },
            "pool_choice" => Self::PoolChoice {
                default: raw.default.unwrap_or(pool_choice_default),
            },
            "cap" => Self::Cap { delta },
            "cap_attack" => Self::CapAttack { delta },
            "cap_defend" => Self::CapDefend { delta },
            "dice" => Self::Dice {
                value: die(),
                slot: match raw.slot.as_deref().map(|s| s.trim().to_ascii_lowercase()) {
                    Some(s) if s == "attack" => DiceSlot::Attack,
                    Some(s) if s == "defend" => DiceSlot::Defend,
                    _ => DiceSlot::Both,
                },
            },
            "dice_attack" => Self::DiceAttack { value: die() },
            "dice_defend" => Self::DiceDefend { value: die() },
            "focus_modifier" => Self::FocusModifier { delta },
            "observation_range" => Self::ObservationRange { delta },
            _ => return Err(raw.kind),
        };
        Ok(effect)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillNode {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: SkillType,
    pub tier: Option<i32>,
    pub requires: Vec<String>,
    pub requires_operator: RequiresOperator,
    pub cost: u32,
    pub effects: Vec<Effect>,
    pub position_tag: Option<PositionTag>,
    pub position_offset_x: f64,
    pub position_offset_y: f64,
    pub description: Option<String>,
}

impl SkillNode {
    /// Default value of the node's `pool_choice` effect, if it declares one.
    pub fn pool_choice_default(&self) -> Option<i64> {
        self.effects.iter().find_map(|e| match e {
            Effect::PoolChoice { default } => Some(*default),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillTree {
    pub id: String,
    pub title: String,
    pub nodes: Vec<SkillNode>,
}

impl SkillTree {
    /// Normalizes raw records into nodes and validates ids and references.
    ///
    /// Cycle detection happens when the graph is indexed, see [`crate::graph::SkillGraph`].
    pub fn from_records(
        id: impl Into<String>,
        title: impl Into<String>,
        records: Vec<RawSkillRecord>,
        pool_choice_default: i64,
    ) -> Result<Self, LoadError> {
        let id = id.into();
        let mut nodes = Vec::with_capacity(records.len());
        for record in records {
            nodes.push(normalize_record(&id, record, pool_choice_default)?);
        }
        validate_references(&id, &nodes)?;
        Ok(Self {
            id,
            title: title.into(),
            nodes,
        })
    }

    pub fn from_json(
        id: impl Into<String>,
        title: impl Into<String>,
        json: &str,
        pool_choice_default: i64,
    ) -> Result<Self, LoadError> {
        let id = id.into();
        let records: Vec<RawSkillRecord> =
            serde_json::from_str(json).map_err(|source| LoadError::Json {
                tree: id.clone(),
                source,
            })?;
        Self::from_records(id, title, records, pool_choice_default)
    }
}

/// Lowercases and joins whitespace runs with `_`: "Emission Basics" -> "emission_basics".
pub fn slugify(name: &str) -> String {
    name.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

fn normalize_record(
    tree: &str,
    record: RawSkillRecord,
    pool_choice_default: i64,
) -> Result<SkillNode, LoadError> {
    let name = record.name.filter(|n| !n.trim().is_empty());
    let id = match record.id.filter(|id| !id.trim().is_empty()) {
        Some(id) => id,
        None => match &name {
            Some(name) => slugify(name),
            None => {
                return Err(LoadError::MissingName {
                    tree: tree.to_string(),
                });
            }
        },
    };
    let name = name.unwrap_or_else(|| id.clone());

    let invalid = |field: &'static str, value: String| LoadError::InvalidField {
        tree: tree.to_string(),
        id: id.clone(),
        field,
        value,
    };

    let cost = match record.cost {
        None => 0,
        Some(c) if c >= 0.0 && c.fract() == 0.0 && c <= u32::MAX as f64 => c as u32,
        Some(c) => return Err(invalid("cost", c.to_string())),
    };

    let requires_operator = match record
        .requires_operator
        .as_deref()
        .map(|s| s.trim().to_ascii_lowercase())
        .as_deref()
    {
        None | Some("") => RequiresOperator::Unspecified,
        Some("and") => RequiresOperator::And,
        Some("or") => RequiresOperator::Or,
        Some(other) => return Err(invalid("requiresOperator", other.to_string())),
    };

    let position_tag = match record.position_tag.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(
            PositionTag::parse(raw).ok_or_else(|| invalid("positionTag", raw.to_string()))?,
        ),
    };

    // Keep the first occurrence of each requirement; order decides the primary parent.
    let mut seen = HashSet::new();
    let requires: Vec<String> = record
        .requires
        .map(OneOrMany::into_vec)
        .unwrap_or_default()
        .into_iter()
        .filter(|r| !r.trim().is_empty())
        .filter(|r| seen.insert(r.clone()))
        .collect();

    let mut effects = Vec::with_capacity(record.effects.len());
    for raw in record.effects {
        let effect = Effect::from_raw(raw, pool_choice_default).map_err(|effect| {
            LoadError::UnknownEffect {
                tree: tree.to_string(),
                id: id.clone(),
                effect,
            }
        })?;
        effects.push(effect);
    }

    Ok(SkillNode {
        kind: SkillType::parse(record.kind.as_deref()),
        tier: record.tier,
        requires,
        requires_operator,
        cost,
        effects,
        position_tag,
        position_offset_x: record.position_offset_x.unwrap_or(0.0),
        position_offset_y: record
            .position_offset_y
            .or(record.position_offset)
            .unwrap_or(0.0),
        description: record.description,
        name,
        id,
    })
}

fn validate_references(tree: &str, nodes: &[SkillNode]) -> Result<(), LoadError> {
    let mut ids = HashSet::new();
    for node in nodes {
        if !ids.insert(node.id.as_str()) {
            return Err(LoadError::DuplicateId {
                tree: tree.to_string(),
                id: node.id.clone(),
            });
        }
    }

    for node in nodes {
        for req in &node.requires {
            if req == &node.id {
                return Err(LoadError::SelfRequirement {
                    tree: tree.to_string(),
                    id: node.id.clone(),
                });
            }
            if !ids.contains(req.as_str()) {
                return Err(LoadError::DanglingRequirement {
                    tree: tree.to_string(),
                    id: node.id.clone(),
                    missing: req.clone(),
                });
            }
        }
    }
    Ok(())
}
