// Content-addressed memo for pipeline outputs.
//
// Entries are keyed on the source path plus a blake3 digest of the file bytes
// and the settings that shaped the output. A slot is a `OnceCell`, so callers
// racing on the same key block until the first computation finishes instead
// of computing twice.
use crate::error::Result;
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub path: PathBuf,
    pub digest: [u8; 32],
}

impl CacheKey {
    pub fn new(path: &Path, contents: &[u8], settings: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(contents);
        hasher.update(&(settings.len() as u64).to_le_bytes());
        hasher.update(settings);
        Self {
            path: path.to_path_buf(),
            digest: *hasher.finalize().as_bytes(),
        }
    }
}

type Slot<V> = Arc<OnceCell<Arc<V>>>;

pub struct PipelineCache<V> {
    slots: Mutex<HashMap<CacheKey, Slot<V>>>,
}

impl<V> Default for PipelineCache<V> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<V> PipelineCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<CacheKey, Slot<V>>> {
        // A panic inside a computation never holds this lock.
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Read `path`, and return the cached value for its current contents or
    /// compute it from the bytes just read.
    pub fn load<F>(&self, path: &Path, settings: &[u8], compute: F) -> Result<Arc<V>>
    where
        F: FnOnce(&[u8]) -> Result<V>,
    {
        let contents = std::fs::read(path)?;
        let key = CacheKey::new(path, &contents, settings);
        self.get_or_try_insert(key, || compute(&contents))
    }

    /// Return the value for `key`, computing it at most once. A failed
    /// computation leaves the slot empty so the next call retries.
    pub fn get_or_try_insert<F>(&self, key: CacheKey, compute: F) -> Result<Arc<V>>
    where
        F: FnOnce() -> Result<V>,
    {
        let slot = {
            let mut slots = self.slots();
            // Older digests for the same file are stale once it has changed.
            slots.retain(|k, _| k.path != key.path || k.digest == key.digest);
            slots.entry(key.clone()).or_default().clone()
        };
        let mut computed = false;
        let value = slot.get_or_try_init(|| {
            computed = true;
            compute().map(Arc::new)
        })?;
        debug!(path = %key.path.display(), hit = !computed, "pipeline cache lookup");
        Ok(Arc::clone(value))
    }

    /// Drop every entry for `path`; returns how many were removed.
    pub fn invalidate(&self, path: &Path) -> usize {
        let mut slots = self.slots();
        let before = slots.len();
        slots.retain(|k, _| k.path != path);
        before - slots.len()
    }

    pub fn clear(&self) {
        self.slots().clear();
    }

    pub fn len(&self) -> usize {
        self.slots()
            .values()
            .filter(|slot| slot.get().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
