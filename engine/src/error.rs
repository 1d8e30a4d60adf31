use std::io;

use crate::selection::SelectionKey;

/// Failures while reading or validating tree data.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed reading tree file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed parsing tree {tree}: {source}")]
    Json {
        tree: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("tree {tree}: duplicate skill id {id}")]
    DuplicateId { tree: String, id: String },

    #[error("tree {tree}: skill {id} requires unknown skill {missing}")]
    DanglingRequirement {
        tree: String,
        id: String,
        missing: String,
    },

    #[error("tree {tree}: skill {id} requires itself")]
    SelfRequirement { tree: String, id: String },

    #[error("tree {tree}: skill {id} has unknown effect type {effect}")]
    UnknownEffect {
        tree: String,
        id: String,
        effect: String,
    },

    #[error("tree {tree}: skill {id} has invalid {field}: {value}")]
    InvalidField {
        tree: String,
        id: String,
        field: &'static str,
        value: String,
    },

    #[error("tree {tree}: a skill has neither an id nor a name")]
    MissingName { tree: String },

    #[error("tree {tree}: cycle detected: {path}")]
    CycleDetected { tree: String, path: String },

    #[error("duplicate tree id {0}")]
    DuplicateTree(String),

    #[error("tree {tree}: no bundled data file named {file}")]
    UnknownBundledTree { tree: String, file: String },

    #[error("pool choice skill {id} exists in both {first} and {second}")]
    AmbiguousPoolChoice {
        id: String,
        first: String,
        second: String,
    },
}

/// Failures reported synchronously by engine operations. None of them leave partial
/// mutation behind.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("unknown tree {0}")]
    UnknownTree(String),

    #[error("unknown skill {0}")]
    NotFound(SelectionKey),

    #[error("prerequisites of {0} are not selected")]
    PrerequisiteUnmet(SelectionKey),

    #[error("not enough points for {key}: costs {cost}, {remaining} remaining")]
    BudgetExceeded {
        key: SelectionKey,
        cost: u32,
        remaining: i64,
    },

    #[error("{dependent} still depends on {key}")]
    DependentStillSelected {
        key: SelectionKey,
        dependent: SelectionKey,
    },

    #[error("auxiliary input for {0} was cancelled")]
    AuxiliaryCancelled(SelectionKey),

    #[error("a selection of {0} is waiting for auxiliary input")]
    SelectionPending(SelectionKey),

    #[error("no selection is waiting for auxiliary input")]
    NoPendingSelection,

    #[error("auxiliary value does not match the request for {0}")]
    AuxiliaryMismatch(SelectionKey),

    #[error("corrupt saved state: {0}")]
    PersistenceCorrupt(String),

    #[error("storage failure: {0}")]
    Storage(#[from] io::Error),
}

impl EngineError {
    pub fn corrupt(reason: impl Into<String>) -> Self {
        Self::PersistenceCorrupt(reason.into())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
