use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Slot written after every committed change.
pub const AUTOSAVE_SLOT: &str = "hakiTreeAuto_v2";
/// Slot written by an explicit save.
pub const SAVE_SLOT: &str = "hakiTreeSave_v2";

/// Key/value store for saved records.
pub trait StorageBackend {
    fn get(&self, key: &str) -> io::Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> io::Result<()>;
    fn remove(&mut self, key: &str) -> io::Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryStorage {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> io::Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> io::Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// One `<key>.json` file per slot inside a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

impl StorageBackend for FileStorage {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        atomic_write(&self.path_for(key), value.as_bytes())
    }

    fn remove(&mut self, key: &str) -> io::Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    match fs::rename(&tmp, path) {
        Ok(()) => Ok(()),
        Err(_) => {
            // Rename over an existing file can fail on Windows.
            fs::copy(&tmp, path)?;
            let _ = fs::remove_file(&tmp);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_storage_set_get_remove() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut storage = FileStorage::new(dir.path().join("state"));

        assert_eq!(storage.get(AUTOSAVE_SLOT).expect("get"), None);
        storage.set(AUTOSAVE_SLOT, "{\"a\":1}").expect("set");
        storage.set(AUTOSAVE_SLOT, "{\"a\":2}").expect("overwrite");
        assert_eq!(
            storage.get(AUTOSAVE_SLOT).expect("get").as_deref(),
            Some("{\"a\":2}")
        );
        assert!(!dir.path().join("state").join("hakiTreeAuto_v2.tmp").exists());

        storage.remove(AUTOSAVE_SLOT).expect("remove");
        storage.remove(AUTOSAVE_SLOT).expect("removing twice is fine");
        assert_eq!(storage.get(AUTOSAVE_SLOT).expect("get"), None);
    }

    #[test]
    fn slot_names_are_sanitized_into_file_names() {
        let storage = FileStorage::new("/tmp/x");
        assert_eq!(
            storage.path_for("../evil"),
            PathBuf::from("/tmp/x").join("___evil.json")
        );
    }

    #[test]
    fn memory_storage_keeps_slots_apart() {
        let mut storage = MemoryStorage::new();
        storage.set(AUTOSAVE_SLOT, "auto").expect("set");
        storage.set(SAVE_SLOT, "manual").expect("set");
        storage.remove(AUTOSAVE_SLOT).expect("remove");
        assert_eq!(storage.get(AUTOSAVE_SLOT).expect("get"), None);
        assert_eq!(storage.get(SAVE_SLOT).expect("get").as_deref(), Some("manual"));
    }
}
