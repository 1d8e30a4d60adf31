use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::AwakeningNode;
use crate::error::{EngineError, EngineResult};
use crate::graph::{
    EffectiveOperator, SkillCatalog, SkillGraph, effective_operator, prerequisites_satisfied,
};
use crate::rng::Rng;
use crate::tree::{SkillNode, SkillType};

/// `(tree id, skill id)`, written as `tree::skill` in saved records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SelectionKey {
    pub tree: String,
    pub skill: String,
}

impl SelectionKey {
    pub fn new(tree: impl Into<String>, skill: impl Into<String>) -> Self {
        Self {
            tree: tree.into(),
            skill: skill.into(),
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let (tree, skill) = raw.split_once("::")?;
        if tree.is_empty() || skill.is_empty() || skill.contains("::") {
            return None;
        }
        Some(Self::new(tree, skill))
    }
}

impl fmt::Display for SelectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.tree, self.skill)
    }
}

/// Baseline pool/cap chosen when the awakening node is selected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AwakeningConfig {
    pub pool: i64,
    pub cap: i64,
}

/// User input attached to a selected node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuxiliaryValue {
    PoolChoice(i64),
    Awakening(AwakeningConfig),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuxiliaryKind {
    PoolChoice { default: i64 },
    Awakening { default: AwakeningConfig },
}

impl AuxiliaryKind {
    pub fn default_value(self) -> AuxiliaryValue {
        match self {
            Self::PoolChoice { default } => AuxiliaryValue::PoolChoice(default),
            Self::Awakening { default } => AuxiliaryValue::Awakening(default),
        }
    }

    fn accepts(self, value: AuxiliaryValue) -> bool {
        matches!(
            (self, value),
            (Self::PoolChoice { .. }, AuxiliaryValue::PoolChoice(_))
                | (Self::Awakening { .. }, AuxiliaryValue::Awakening(_))
        )
    }
}

/// A selection waiting on the auxiliary prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuxiliaryRequest {
    pub key: SelectionKey,
    pub name: String,
    pub kind: AuxiliaryKind,
}

/// Supplies auxiliary values for [`SelectionStateMachine::select_request`]. Returning `None`
/// cancels the selection.
pub trait AuxiliaryResolver {
    fn resolve(&mut self, request: &AuxiliaryRequest) -> Option<AuxiliaryValue>;
}

impl<F> AuxiliaryResolver for F
where
    F: FnMut(&AuxiliaryRequest) -> Option<AuxiliaryValue>,
{
    fn resolve(&mut self, request: &AuxiliaryRequest) -> Option<AuxiliaryValue> {
        self(request)
    }
}

/// Accepts every prompt with its default value.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultResolver;

impl AuxiliaryResolver for DefaultResolver {
    fn resolve(&mut self, request: &AuxiliaryRequest) -> Option<AuxiliaryValue> {
        Some(request.kind.default_value())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectOutcome {
    Committed(SelectionKey),
    Pending(AuxiliaryRequest),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Selected,
    Available,
    Locked,
}

/// One user's selection state. Only [`SelectionStateMachine`] and the persistence codec mutate
/// the selection set and auxiliary values.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub total_points: u32,
    pub character_name: String,
    selected: BTreeSet<SelectionKey>,
    auxiliary: BTreeMap<SelectionKey, AuxiliaryValue>,
    pending: Option<AuxiliaryRequest>,
}

impl Session {
    pub fn new(total_points: u32) -> Self {
        Self {
            total_points,
            character_name: String::new(),
            selected: BTreeSet::new(),
            auxiliary: BTreeMap::new(),
            pending: None,
        }
    }

    pub(crate) fn from_parts(
        total_points: u32,
        character_name: String,
        selected: BTreeSet<SelectionKey>,
        auxiliary: BTreeMap<SelectionKey, AuxiliaryValue>,
    ) -> Self {
        Self {
            total_points,
            character_name,
            selected,
            auxiliary,
            pending: None,
        }
    }

    pub fn is_selected(&self, tree: &str, skill: &str) -> bool {
        self.selected.contains(&SelectionKey::new(tree, skill))
    }

    pub fn contains(&self, key: &SelectionKey) -> bool {
        self.selected.contains(key)
    }

    pub fn selected(&self) -> impl Iterator<Item = &SelectionKey> {
        self.selected.iter()
    }

    pub fn selected_len(&self) -> usize {
        self.selected.len()
    }

    pub fn auxiliary(&self, key: &SelectionKey) -> Option<AuxiliaryValue> {
        self.auxiliary.get(key).copied()
    }

    pub fn auxiliary_values(&self) -> impl Iterator<Item = (&SelectionKey, AuxiliaryValue)> {
        self.auxiliary.iter().map(|(k, v)| (k, *v))
    }

    pub fn pool_choice(&self, key: &SelectionKey) -> Option<i64> {
        match self.auxiliary.get(key) {
            Some(AuxiliaryValue::PoolChoice(v)) => Some(*v),
            _ => None,
        }
    }

    /// The stored awakening config, if the awakening node is selected and configured.
    pub fn awakening(&self) -> Option<(&SelectionKey, AwakeningConfig)> {
        self.auxiliary.iter().find_map(|(k, v)| match v {
            AuxiliaryValue::Awakening(cfg) => Some((k, *cfg)),
            AuxiliaryValue::PoolChoice(_) => None,
        })
    }

    pub fn pending(&self) -> Option<&AuxiliaryRequest> {
        self.pending.as_ref()
    }

    /// Sum of costs over every selected node of every tree.
    pub fn spent(&self, catalog: &SkillCatalog) -> u64 {
        self.selected
            .iter()
            .filter_map(|k| catalog.node(&k.tree, &k.skill))
            .map(|n| n.cost as u64)
            .sum()
    }

    /// Can go negative if the budget is lowered below what is already spent.
    pub fn remaining(&self, catalog: &SkillCatalog) -> i64 {
        self.total_points as i64 - self.spent(catalog) as i64
    }

    pub fn remaining_display(&self, catalog: &SkillCatalog) -> u64 {
        self.remaining(catalog).max(0) as u64
    }

    pub fn node_status(&self, graph: &SkillGraph, id: &str) -> Option<NodeStatus> {
        let node = graph.node(id)?;
        let tree = graph.id();
        Some(if self.is_selected(tree, id) {
            NodeStatus::Selected
        } else if prerequisites_satisfied(node, |r| self.is_selected(tree, r)) {
            NodeStatus::Available
        } else {
            NodeStatus::Locked
        })
    }

    fn ensure_idle(&self) -> EngineResult<()> {
        match &self.pending {
            Some(req) => Err(EngineError::SelectionPending(req.key.clone())),
            None => Ok(()),
        }
    }

    fn commit(&mut self, key: SelectionKey, value: Option<AuxiliaryValue>) {
        if let Some(value) = value {
            self.auxiliary.insert(key.clone(), value);
        }
        self.selected.insert(key);
    }
}

/// Which nodes the randomizer may pick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RandomFilter {
    All,
    /// Nodes of one tree whose type is `role` or shared.
    Role { tree: String, role: SkillType },
}

impl RandomFilter {
    /// Parses the UI modes `all`, `arm-offense`, `arm-defense`, `obs-offense`, `obs-defense`.
    pub fn parse_mode(mode: &str) -> Option<Self> {
        if mode == "all" {
            return Some(Self::All);
        }
        let (prefix, role) = mode.split_once('-')?;
        let tree = match prefix {
            "arm" => "armament-tree",
            "obs" => "observation-tree",
            _ => return None,
        };
        let role = match role {
            "offense" => SkillType::Offense,
            "defense" => SkillType::Defense,
            _ => return None,
        };
        Some(Self::Role {
            tree: tree.to_string(),
            role,
        })
    }

    pub fn matches(&self, tree: &str, node: &SkillNode) -> bool {
        match self {
            Self::All => true,
            Self::Role { tree: t, role } => {
                t == tree && (node.kind == *role || node.kind == SkillType::Shared)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RandomizeReport {
    pub picked: Vec<SelectionKey>,
    pub remaining: i64,
}

/// Validates and commits transitions of a [`Session`] against the catalog and budget.
#[derive(Debug, Clone, Copy)]
pub struct SelectionStateMachine<'a> {
    catalog: &'a SkillCatalog,
    awakening: &'a AwakeningNode,
}

impl<'a> SelectionStateMachine<'a> {
    pub fn new(catalog: &'a SkillCatalog, awakening: &'a AwakeningNode) -> Self {
        Self { catalog, awakening }
    }

    pub fn catalog(&self) -> &'a SkillCatalog {
        self.catalog
    }

    fn lookup(&self, tree: &str, id: &str) -> EngineResult<(&'a SkillGraph, &'a SkillNode)> {
        let graph = self
            .catalog
            .graph(tree)
            .ok_or_else(|| EngineError::UnknownTree(tree.to_string()))?;
        let node = graph
            .node(id)
            .ok_or_else(|| EngineError::NotFound(SelectionKey::new(tree, id)))?;
        Ok((graph, node))
    }

    fn is_awakening(&self, tree: &str, id: &str) -> bool {
        self.awakening.tree == tree && self.awakening.skill == id
    }

    /// What the prompt must ask for, if anything. The awakening prompt wins over a
    /// `pool_choice` effect on the same node.
    fn auxiliary_kind(
        &self,
        session: &Session,
        key: &SelectionKey,
        node: &SkillNode,
    ) -> Option<AuxiliaryKind> {
        if self.is_awakening(&key.tree, &key.skill) {
            let default = match session.auxiliary(key) {
                Some(AuxiliaryValue::Awakening(cfg)) => cfg,
                _ => AwakeningConfig {
                    pool: self.awakening.default_pool,
                    cap: self.awakening.default_cap,
                },
            };
            return Some(AuxiliaryKind::Awakening { default });
        }
        node.pool_choice_default()
            .map(|default| AuxiliaryKind::PoolChoice { default })
    }

    /// Every check a selection must pass before anything is mutated.
    fn check_selectable(
        &self,
        session: &Session,
        tree: &str,
        id: &str,
    ) -> EngineResult<&'a SkillNode> {
        let (_, node) = self.lookup(tree, id)?;
        let key = SelectionKey::new(tree, id);
        if !prerequisites_satisfied(node, |r| session.is_selected(tree, r)) {
            return Err(EngineError::PrerequisiteUnmet(key));
        }
        let remaining = session.remaining(self.catalog);
        if remaining < node.cost as i64 {
            return Err(EngineError::BudgetExceeded {
                key,
                cost: node.cost,
                remaining,
            });
        }
        Ok(node)
    }

    /// First phase of a selection. Nodes without auxiliary input commit immediately; the rest
    /// leave a pending request that must be resolved or cancelled before any other transition.
    pub fn begin_select(
        &self,
        session: &mut Session,
        tree: &str,
        id: &str,
    ) -> EngineResult<SelectOutcome> {
        session.ensure_idle()?;
        let key = SelectionKey::new(tree, id);
        if session.contains(&key) {
            self.lookup(tree, id)?;
            return Ok(SelectOutcome::Committed(key));
        }
        let node = self.check_selectable(session, tree, id)?;

        match self.auxiliary_kind(session, &key, node) {
            None => {
                session.commit(key.clone(), None);
                tracing::debug!(key = %key, cost = node.cost, "selected skill");
                Ok(SelectOutcome::Committed(key))
            }
            Some(kind) => {
                let request = AuxiliaryRequest {
                    key,
                    name: node.name.clone(),
                    kind,
                };
                session.pending = Some(request.clone());
                tracing::debug!(key = %request.key, "selection waiting for auxiliary input");
                Ok(SelectOutcome::Pending(request))
            }
        }
    }

    /// Commits the pending selection with the user's value.
    pub fn resolve_pending(
        &self,
        session: &mut Session,
        value: AuxiliaryValue,
    ) -> EngineResult<SelectionKey> {
        let request = session.pending.as_ref().ok_or(EngineError::NoPendingSelection)?;
        if !request.kind.accepts(value) {
            return Err(EngineError::AuxiliaryMismatch(request.key.clone()));
        }
        let Some(request) = session.pending.take() else {
            return Err(EngineError::NoPendingSelection);
        };
        session.commit(request.key.clone(), Some(value));
        tracing::debug!(key = %request.key, ?value, "selected skill with auxiliary input");
        Ok(request.key)
    }

    /// Rolls the pending selection back; the session is exactly as before `begin_select`.
    pub fn cancel_pending(&self, session: &mut Session) -> EngineResult<SelectionKey> {
        let request = session.pending.take().ok_or(EngineError::NoPendingSelection)?;
        tracing::debug!(key = %request.key, "auxiliary input cancelled, selection rolled back");
        Ok(request.key)
    }

    /// Both phases in one call, asking `resolver` for auxiliary input when needed.
    pub fn select_request(
        &self,
        session: &mut Session,
        tree: &str,
        id: &str,
        resolver: &mut dyn AuxiliaryResolver,
    ) -> EngineResult<SelectionKey> {
        let request = match self.begin_select(session, tree, id)? {
            SelectOutcome::Committed(key) => return Ok(key),
            SelectOutcome::Pending(request) => request,
        };
        match resolver.resolve(&request) {
            Some(value) => self.resolve_pending(session, value).inspect_err(|_| {
                session.pending = None;
            }),
            None => {
                let key = self.cancel_pending(session)?;
                Err(EngineError::AuxiliaryCancelled(key))
            }
        }
    }

    pub fn deselect_request(
        &self,
        session: &mut Session,
        tree: &str,
        id: &str,
    ) -> EngineResult<()> {
        session.ensure_idle()?;
        let (graph, _) = self.lookup(tree, id)?;
        let key = SelectionKey::new(tree, id);
        if !session.contains(&key) {
            return Ok(());
        }

        for dependent in graph.dependents(id) {
            if !session.is_selected(tree, &dependent.id) {
                continue;
            }
            let covered = match effective_operator(dependent) {
                EffectiveOperator::Any => dependent
                    .requires
                    .iter()
                    .any(|r| r != id && session.is_selected(tree, r)),
                EffectiveOperator::All => false,
            };
            if !covered {
                return Err(EngineError::DependentStillSelected {
                    key,
                    dependent: SelectionKey::new(tree, dependent.id.clone()),
                });
            }
        }

        session.auxiliary.remove(&key);
        session.selected.remove(&key);
        tracing::debug!(key = %key, "deselected skill");
        Ok(())
    }

    /// Greedy random fill: repeatedly picks a uniformly random eligible node until nothing is
    /// eligible or the budget is used up. Auxiliary prompts take their defaults.
    pub fn randomize_fill<F>(
        &self,
        session: &mut Session,
        filter: F,
        rng: &mut Rng,
    ) -> EngineResult<RandomizeReport>
    where
        F: Fn(&str, &SkillNode) -> bool,
    {
        session.ensure_idle()?;
        let mut report = RandomizeReport {
            picked: Vec::new(),
            remaining: session.remaining(self.catalog),
        };

        while report.remaining > 0 {
            let eligible: Vec<(&str, &SkillNode)> = self
                .catalog
                .graphs()
                .iter()
                .flat_map(|g| g.nodes().iter().map(move |n| (g.id(), n)))
                .filter(|&(tree, node)| {
                    filter(tree, node)
                        && !session.is_selected(tree, &node.id)
                        && node.cost as i64 <= report.remaining
                        && prerequisites_satisfied(node, |r| session.is_selected(tree, r))
                })
                .collect();
            if eligible.is_empty() {
                break;
            }

            let (tree, node) = eligible[rng.index(eligible.len())];
            let key = SelectionKey::new(tree, node.id.clone());
            let value = self
                .auxiliary_kind(session, &key, node)
                .map(AuxiliaryKind::default_value);
            session.commit(key.clone(), value);
            report.remaining -= node.cost as i64;
            report.picked.push(key);
        }

        tracing::info!(
            picked = report.picked.len(),
            remaining = report.remaining,
            "randomized skill selection"
        );
        Ok(report)
    }

    /// Clears selections, auxiliary values, any pending prompt, and the character name.
    pub fn reset(&self, session: &mut Session) {
        session.selected.clear();
        session.auxiliary.clear();
        session.pending = None;
        session.character_name.clear();
        tracing::debug!("reset all selections");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::SkillTree;

    fn catalog() -> SkillCatalog {
        let tree = SkillTree::from_json(
            "t",
            "T",
            r#"[
                {"id": "a", "name": "A", "cost": 3},
                {"id": "b", "name": "B", "cost": 4, "requires": ["a"], "requiresOperator": "and"},
                {"id": "choice", "name": "Choice", "cost": 3,
                 "effects": [{"type": "pool_choice", "default": 6}]}
            ]"#,
            5,
        )
        .expect("tree should parse");
        SkillCatalog::new(vec![tree]).expect("catalog")
    }

    #[test]
    fn selection_key_parses_and_prints() {
        let key = SelectionKey::parse("armament-tree::hardening").expect("valid key");
        assert_eq!(key, SelectionKey::new("armament-tree", "hardening"));
        assert_eq!(key.to_string(), "armament-tree::hardening");
        assert!(SelectionKey::parse("no-separator").is_none());
        assert!(SelectionKey::parse("::x").is_none());
        assert!(SelectionKey::parse("a::b::c").is_none());
    }

    #[test]
    fn pending_selection_blocks_other_transitions() {
        let catalog = catalog();
        let awakening = AwakeningNode::default();
        let machine = SelectionStateMachine::new(&catalog, &awakening);
        let mut session = Session::new(10);

        let outcome = machine.begin_select(&mut session, "t", "choice").expect("begin");
        let SelectOutcome::Pending(request) = outcome else {
            panic!("pool choice node should wait for input");
        };
        assert_eq!(request.kind, AuxiliaryKind::PoolChoice { default: 6 });
        assert!(!session.is_selected("t", "choice"));

        let err = machine.begin_select(&mut session, "t", "a").unwrap_err();
        assert!(matches!(err, EngineError::SelectionPending(_)));
        let err = machine.deselect_request(&mut session, "t", "a").unwrap_err();
        assert!(matches!(err, EngineError::SelectionPending(_)));

        let err = machine
            .resolve_pending(&mut session, AuxiliaryValue::Awakening(AwakeningConfig::default()))
            .unwrap_err();
        assert!(matches!(err, EngineError::AuxiliaryMismatch(_)));
        assert!(session.pending().is_some());

        let key = machine
            .resolve_pending(&mut session, AuxiliaryValue::PoolChoice(9))
            .expect("resolve");
        assert_eq!(session.pool_choice(&key), Some(9));
        assert_eq!(session.remaining(&catalog), 7);
    }

    #[test]
    fn is_selected_matches_tree_and_skill() {
        let catalog = catalog();
        let awakening = AwakeningNode::default();
        let machine = SelectionStateMachine::new(&catalog, &awakening);
        let mut session = Session::new(10);
        machine
            .select_request(&mut session, "t", "a", &mut DefaultResolver)
            .expect("select");

        assert!(session.is_selected("t", "a"));
        assert!(session.contains(&SelectionKey::new("t", "a")));
        assert!(!session.is_selected("t", "b"));
        assert!(!session.is_selected("other", "a"));
    }

    #[test]
    fn cancel_without_pending_is_an_error() {
        let catalog = catalog();
        let awakening = AwakeningNode::default();
        let machine = SelectionStateMachine::new(&catalog, &awakening);
        let mut session = Session::new(10);
        assert!(matches!(
            machine.cancel_pending(&mut session),
            Err(EngineError::NoPendingSelection)
        ));
    }

    #[test]
    fn unknown_tree_and_node_are_reported() {
        let catalog = catalog();
        let awakening = AwakeningNode::default();
        let machine = SelectionStateMachine::new(&catalog, &awakening);
        let mut session = Session::new(10);
        assert!(matches!(
            machine.begin_select(&mut session, "nope", "a"),
            Err(EngineError::UnknownTree(_))
        ));
        assert!(matches!(
            machine.deselect_request(&mut session, "t", "ghost"),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn random_filter_modes() {
        let filter = RandomFilter::parse_mode("obs-defense").expect("known mode");
        assert_eq!(
            filter,
            RandomFilter::Role {
                tree: "observation-tree".to_string(),
                role: SkillType::Defense
            }
        );
        assert_eq!(RandomFilter::parse_mode("all"), Some(RandomFilter::All));
        assert_eq!(RandomFilter::parse_mode("con-offense"), None);
    }

    #[test]
    fn reset_clears_everything_but_budget() {
        let catalog = catalog();
        let awakening = AwakeningNode::default();
        let machine = SelectionStateMachine::new(&catalog, &awakening);
        let mut session = Session::new(10);
        session.character_name = "Zoro".to_string();
        machine
            .select_request(&mut session, "t", "a", &mut DefaultResolver)
            .expect("select a");
        machine.begin_select(&mut session, "t", "choice").expect("begin");

        machine.reset(&mut session);
        assert_eq!(session, Session::new(10));
    }
}
