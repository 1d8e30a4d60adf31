use serde::{Deserialize, Serialize};

use crate::graph::SkillCatalog;
use crate::selection::Session;
use crate::tree::{DiceSlot, Effect, SkillNode};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterStats {
    pub pool: i64,
    pub cap_attack: i64,
    pub cap_defend: i64,
    /// Best attack die, e.g. "d6", or "none".
    pub dice_attack: String,
    pub dice_defend: String,
    pub focus_modifier: i64,
    pub observation_range: i64,
}

/// A selected node together with its stored pool choice.
#[derive(Debug, Clone, Copy)]
pub struct SelectedNode<'a> {
    pub node: &'a SkillNode,
    pub pool_choice: Option<i64>,
}

/// d1/d2/d4/d6/d8/d10 rank by face count; anything else by its digits, or 1.
pub fn die_rank(label: &str) -> u32 {
    match label {
        "d1" => 1,
        "d2" => 2,
        "d4" => 4,
        "d6" => 6,
        "d8" => 8,
        "d10" => 10,
        other => {
            let digits: String = other.chars().filter(char::is_ascii_digit).collect();
            match digits.parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => 1,
            }
        }
    }
}

fn die_label(rank: u32) -> String {
    if rank == 0 {
        "none".to_string()
    } else {
        format!("d{rank}")
    }
}

/// Folds the effects of `selected` over the baseline pool/cap.
pub fn compute_stats<'a, I>(base_pool: i64, base_cap: i64, selected: I) -> CharacterStats
where
    I: IntoIterator<Item = SelectedNode<'a>>,
{
    let mut pool = base_pool;
    let mut cap_attack = base_cap;
    let mut cap_defend = base_cap;
    let mut best_attack = 0;
    let mut best_defend = 0;
    let mut focus_modifier = 0;
    let mut observation_range = 0;

    for selected in selected {
        let mut pool_choice_applied = false;
        for effect in &selected.node.effects {
            match effect {
                Effect::PoolChoice { default } => {
                    if !pool_choice_applied {
                        pool += selected.pool_choice.unwrap_or(*default);
                        pool_choice_applied = true;
                    }
                }
                Effect::Pool { delta } => pool += delta,
                Effect::Cap { delta } => {
                    cap_attack += delta;
                    cap_defend += delta;
                }
                Effect::CapAttack { delta } => cap_attack += delta,
                Effect::CapDefend { delta } => cap_defend += delta,
                Effect::Dice { value, slot } => {
                    let rank = die_rank(value);
                    if matches!(slot, DiceSlot::Attack | DiceSlot::Both) {
                        best_attack = best_attack.max(rank);
                    }
                    if matches!(slot, DiceSlot::Defend | DiceSlot::Both) {
                        best_defend = best_defend.max(rank);
                    }
                }
                Effect::DiceAttack { value } => best_attack = best_attack.max(die_rank(value)),
                Effect::DiceDefend { value } => best_defend = best_defend.max(die_rank(value)),
                Effect::FocusModifier { delta } => focus_modifier += delta,
                Effect::ObservationRange { delta } => observation_range += delta,
            }
        }
    }

    CharacterStats {
        pool,
        cap_attack,
        cap_defend,
        dice_attack: die_label(best_attack),
        dice_defend: die_label(best_defend),
        focus_modifier,
        observation_range,
    }
}

/// Stats of a session: the awakening config is the baseline, then every selected node.
pub fn session_stats(session: &Session, catalog: &SkillCatalog) -> CharacterStats {
    let base = session.awakening().map(|(_, cfg)| cfg).unwrap_or_default();
    let selected = session.selected().filter_map(|key| {
        catalog.node(&key.tree, &key.skill).map(|node| SelectedNode {
            node,
            pool_choice: session.pool_choice(key),
        })
    });
    compute_stats(base.pool, base.cap, selected)
}
