use std::path::PathBuf;

use anyhow::{Context, Result};
use hakitree_engine::config::{data_dir_from_env, state_dir_from_env};
use hakitree_engine::storage::AUTOSAVE_SLOT;
use hakitree_engine::{ConfigStore, FileStorage, HakiEngine, Session};

/// Loaded trees plus the on-disk session slots.
pub struct Workspace {
    pub engine: HakiEngine,
    pub storage: FileStorage,
}

impl Workspace {
    pub fn open(bundled: bool) -> Result<Self> {
        let store = ConfigStore::from_env();
        let config = store.load();
        tracing::debug!(path = %store.path().display(), "loaded config");

        let engine = if bundled {
            HakiEngine::bundled(config).context("Bundled trees failed to load")?
        } else {
            let data_dir = data_dir_from_env();
            HakiEngine::load(config, &data_dir)
                .with_context(|| format!("Failed to load trees from {}", data_dir.display()))?
        };

        Ok(Self {
            engine,
            storage: FileStorage::new(state_dir_from_env()),
        })
    }

    pub fn state_dir(&self) -> PathBuf {
        self.storage.dir().to_path_buf()
    }

    /// The autosaved session, or a fresh one. A corrupt autosave is reported and replaced.
    pub fn session(&self) -> Result<Session> {
        let fresh = self.engine.new_session();
        match self.engine.codec().load(&self.storage, AUTOSAVE_SLOT, &fresh) {
            Ok(Some(session)) => Ok(session),
            Ok(None) => Ok(fresh),
            Err(err) => {
                tracing::warn!(error = %err, "discarding unreadable autosave");
                Ok(fresh)
            }
        }
    }

    pub fn autosave(&mut self, session: &Session) -> Result<()> {
        let codec = self.engine.codec();
        codec
            .store(&mut self.storage, AUTOSAVE_SLOT, session)
            .with_context(|| format!("Failed to autosave into {}", self.state_dir().display()))
    }
}
