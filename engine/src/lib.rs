pub mod config;
pub mod depth;
pub mod error;
pub mod graph;
pub mod layout;
pub mod persistence;
pub mod rng;
pub mod selection;
pub mod stats;
pub mod storage;
pub mod tree;

pub use config::{AwakeningNode, ConfigStore, EngineConfig, TreeManifestEntry};
pub use error::{EngineError, EngineResult, LoadError};
pub use graph::{SkillCatalog, SkillGraph};
pub use layout::{LayoutConfig, LayoutEngine, TreeLayout};
pub use persistence::{ExportDocument, PersistenceCodec, SaveRecord};
pub use rng::Rng;
pub use selection::{
    AuxiliaryRequest, AuxiliaryResolver, AuxiliaryValue, AwakeningConfig, DefaultResolver,
    RandomFilter, SelectOutcome, SelectionKey, SelectionStateMachine, Session,
};
pub use stats::{CharacterStats, compute_stats, session_stats};
pub use storage::{FileStorage, MemoryStorage, StorageBackend};
pub use tree::{Effect, SkillNode, SkillTree, SkillType};

/// Everything one character-building session needs, loaded once.
#[derive(Debug, Clone)]
pub struct HakiEngine {
    config: EngineConfig,
    catalog: SkillCatalog,
}

impl HakiEngine {
    pub fn new(config: EngineConfig, catalog: SkillCatalog) -> Self {
        Self { config, catalog }
    }

    /// Loads the manifest trees from `data_dir`.
    pub fn load(config: EngineConfig, data_dir: &std::path::Path) -> Result<Self, LoadError> {
        let catalog = SkillCatalog::load(data_dir, &config)?;
        Ok(Self::new(config, catalog))
    }

    /// Uses the trees compiled into the crate.
    pub fn bundled(config: EngineConfig) -> Result<Self, LoadError> {
        let catalog = SkillCatalog::bundled(&config)?;
        Ok(Self::new(config, catalog))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &SkillCatalog {
        &self.catalog
    }

    pub fn new_session(&self) -> Session {
        Session::new(self.config.default_total_points)
    }

    pub fn selection(&self) -> SelectionStateMachine<'_> {
        SelectionStateMachine::new(&self.catalog, &self.config.awakening)
    }

    pub fn codec(&self) -> PersistenceCodec<'_> {
        PersistenceCodec::new(&self.catalog, &self.config.awakening)
    }

    pub fn layout_engine(&self) -> LayoutEngine {
        LayoutEngine::new(self.config.layout.clone())
    }

    pub fn stats(&self, session: &Session) -> CharacterStats {
        session_stats(session, &self.catalog)
    }
}
