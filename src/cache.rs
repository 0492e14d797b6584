use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

/// JSON-file backed map from request signature to raw response body.
///
/// Loaded once on open and rewritten in full on every insert. Entries are
/// never expired; delete the file to start over.
pub struct DocumentCache {
    path: PathBuf,
    entries: HashMap<String, String>,
}

impl DocumentCache {
    /// Open the cache at `path`. A missing or unreadable file yields an empty cache.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<HashMap<String, String>>(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Cache file {:?} is corrupt, starting empty: {}", path, e);
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                warn!("Cache file {:?} unreadable, starting empty: {}", path, e);
                HashMap::new()
            }
        };
        debug!("Opened cache {:?} with {} entries", path, entries.len());
        Self { path, entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Store `body` under `key` and flush the whole cache to disk.
    pub fn insert(&mut self, key: impl Into<String>, body: impl Into<String>) -> Result<()> {
        self.entries.insert(key.into(), body.into());
        self.flush()
    }

    fn flush(&self) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create cache dir {:?}", dir))?;
        }
        let json = serde_json::to_string(&self.entries)?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write cache {:?}", self.path))?;
        Ok(())
    }
}

/// Cache key for a parameterised request: `base_key_value_key_value…` in the
/// order given. No sorting or case folding.
pub fn request_signature<K, V>(base_url: &str, params: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut key = base_url.to_string();
    for (k, v) in params {
        key.push('_');
        key.push_str(k.as_ref());
        key.push('_');
        key.push_str(v.as_ref());
    }
    key
}
