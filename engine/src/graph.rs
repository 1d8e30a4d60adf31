use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use crate::config::{EngineConfig, TreeManifestEntry};
use crate::depth::DepthResolver;
use crate::error::LoadError;
use crate::tree::{RequiresOperator, SkillNode, SkillTree, SkillType};

/// Indexed, immutable view of one tree. Built once per session.
#[derive(Debug, Clone)]
pub struct SkillGraph {
    tree: SkillTree,
    id_to_index: HashMap<String, usize>,
    dependents: HashMap<String, Vec<usize>>,
    depths: HashMap<String, u32>,
}

impl SkillGraph {
    /// Indexes the tree and resolves depths, rejecting cyclic requirements.
    pub fn new(tree: SkillTree) -> Result<Self, LoadError> {
        let id_to_index: HashMap<String, usize> = tree
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();

        let mut dependents: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, node) in tree.nodes.iter().enumerate() {
            for req in &node.requires {
                dependents.entry(req.clone()).or_default().push(i);
            }
        }

        let depths = DepthResolver::new(&tree.nodes)
            .resolve_all()
            .map_err(|cycle| LoadError::CycleDetected {
                tree: tree.id.clone(),
                path: cycle.join(" -> "),
            })?;

        Ok(Self {
            tree,
            id_to_index,
            dependents,
            depths,
        })
    }

    pub fn id(&self) -> &str {
        &self.tree.id
    }

    pub fn title(&self) -> &str {
        &self.tree.title
    }

    pub fn tree(&self) -> &SkillTree {
        &self.tree
    }

    pub fn nodes(&self) -> &[SkillNode] {
        &self.tree.nodes
    }

    pub fn node(&self, id: &str) -> Option<&SkillNode> {
        self.id_to_index.get(id).map(|&i| &self.tree.nodes[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.id_to_index.contains_key(id)
    }

    /// Nodes whose `requires` contains `id`, in input order.
    pub fn dependents(&self, id: &str) -> impl Iterator<Item = &SkillNode> {
        self.dependents
            .get(id)
            .into_iter()
            .flatten()
            .map(|&i| &self.tree.nodes[i])
    }

    pub fn depth(&self, id: &str) -> Option<u32> {
        self.depths.get(id).copied()
    }

    pub fn depths(&self) -> &HashMap<String, u32> {
        &self.depths
    }

    /// Human readable prerequisite line for tooltips, e.g. "Hardening or Emission".
    pub fn requires_display(&self, node: &SkillNode) -> String {
        if node.requires.is_empty() {
            return "None".to_string();
        }
        let joiner = match node.requires_operator {
            RequiresOperator::And => " and ",
            RequiresOperator::Or => " or ",
            RequiresOperator::Unspecified => ", ",
        };
        node.requires
            .iter()
            .map(|r| self.node(r).map_or(r.as_str(), |n| n.name.as_str()))
            .collect::<Vec<_>>()
            .join(joiner)
    }
}

/// Operator semantics after the shared/non-shared fallback has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectiveOperator {
    All,
    Any,
}

pub fn effective_operator(node: &SkillNode) -> EffectiveOperator {
    match node.requires_operator {
        RequiresOperator::And => EffectiveOperator::All,
        RequiresOperator::Or => EffectiveOperator::Any,
        RequiresOperator::Unspecified if node.kind == SkillType::Shared => EffectiveOperator::Any,
        RequiresOperator::Unspecified => EffectiveOperator::All,
    }
}

/// Whether `node` may be selected given the selected ids of its own tree.
pub fn prerequisites_satisfied<F>(node: &SkillNode, is_selected: F) -> bool
where
    F: Fn(&str) -> bool,
{
    if node.requires.is_empty() {
        return true;
    }
    match effective_operator(node) {
        EffectiveOperator::All => node.requires.iter().all(|r| is_selected(r)),
        EffectiveOperator::Any => node.requires.iter().any(|r| is_selected(r)),
    }
}

/// Every tree of a session, in manifest order.
#[derive(Debug, Clone, Default)]
pub struct SkillCatalog {
    graphs: Vec<SkillGraph>,
}

impl SkillCatalog {
    /// Saved records key pool choices by bare skill id, so a `pool_choice` skill id may
    /// appear in only one tree.
    pub fn new(trees: Vec<SkillTree>) -> Result<Self, LoadError> {
        let mut seen = HashSet::new();
        let mut pool_choice_owner: HashMap<String, String> = HashMap::new();
        let mut graphs = Vec::with_capacity(trees.len());
        for tree in trees {
            if !seen.insert(tree.id.clone()) {
                return Err(LoadError::DuplicateTree(tree.id));
            }
            for node in &tree.nodes {
                if node.pool_choice_default().is_none() {
                    continue;
                }
                if let Some(first) = pool_choice_owner.get(&node.id) {
                    return Err(LoadError::AmbiguousPoolChoice {
                        id: node.id.clone(),
                        first: first.clone(),
                        second: tree.id.clone(),
                    });
                }
                pool_choice_owner.insert(node.id.clone(), tree.id.clone());
            }
            graphs.push(SkillGraph::new(tree)?);
        }
        Ok(Self { graphs })
    }

    /// Loads every tree listed in the config manifest from `data_dir`.
    pub fn load(data_dir: &Path, config: &EngineConfig) -> Result<Self, LoadError> {
        let mut trees = Vec::with_capacity(config.trees.len());
        for entry in &config.trees {
            trees.push(load_tree(data_dir, entry, config.pool_choice_default)?);
        }
        let catalog = Self::new(trees)?;
        tracing::debug!(
            trees = catalog.graphs.len(),
            data_dir = %data_dir.display(),
            "loaded skill catalog"
        );
        Ok(catalog)
    }

    /// The sample trees compiled into the crate.
    pub fn bundled(config: &EngineConfig) -> Result<Self, LoadError> {
        let sources = [
            ("armament.json", include_str!("../assets/armament.json")),
            ("observation.json", include_str!("../assets/observation.json")),
            ("conqueror.json", include_str!("../assets/conqueror.json")),
        ];
        let mut trees = Vec::new();
        for entry in &config.trees {
            let Some((_, json)) = sources.iter().find(|(file, _)| *file == entry.file) else {
                return Err(LoadError::UnknownBundledTree {
                    tree: entry.id.clone(),
                    file: entry.file.clone(),
                });
            };
            trees.push(SkillTree::from_json(
                entry.id.clone(),
                entry.title.clone(),
                json,
                config.pool_choice_default,
            )?);
        }
        Self::new(trees)
    }

    pub fn graphs(&self) -> &[SkillGraph] {
        &self.graphs
    }

    pub fn graph(&self, tree_id: &str) -> Option<&SkillGraph> {
        self.graphs.iter().find(|g| g.id() == tree_id)
    }

    pub fn node(&self, tree_id: &str, id: &str) -> Option<&SkillNode> {
        self.graph(tree_id)?.node(id)
    }
}

fn load_tree(
    data_dir: &Path,
    entry: &TreeManifestEntry,
    pool_choice_default: i64,
) -> Result<SkillTree, LoadError> {
    let path = data_dir.join(&entry.file);
    let text = fs::read_to_string(&path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    SkillTree::from_json(
        entry.id.clone(),
        entry.title.clone(),
        &text,
        pool_choice_default,
    )
}
