//! Namespaced credential storage
//!
//! Bearer and refresh credentials for the direct action are kept in a small
//! file-backed store, one JSON object per namespace. Writes are flushed to
//! disk before returning and credential files are created owner-readable
//! only on unix.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ActionError, ActionResult};

/// File-backed namespaced key/value credential store.
///
/// Namespaces isolate credentials of unrelated configurations: the same key
/// in two namespaces refers to two independent values.
#[derive(Debug, Clone)]
pub struct SecretStore {
    dir: PathBuf,
}

impl SecretStore {
    /// Open (creating if needed) a credential store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> ActionResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| ActionError::credential_store(format!("create {}: {}", dir.display(), e)))?;
        Ok(Self { dir })
    }

    /// Read a credential, `None` if the namespace or key does not exist.
    pub fn get(&self, namespace: &str, key: &str) -> ActionResult<Option<String>> {
        let map = self.load_namespace(namespace)?;
        Ok(map.get(key).cloned())
    }

    /// Write a credential, replacing any previous value for the key.
    ///
    /// The namespace file is fully rewritten and fsynced before returning.
    pub fn put(&self, namespace: &str, key: &str, value: &str) -> ActionResult<()> {
        let mut map = self.load_namespace(namespace)?;
        map.insert(key.to_string(), value.to_string());
        self.write_namespace(namespace, &map)?;
        debug!(namespace, key, "credential stored");
        Ok(())
    }

    /// Remove a credential. Removing an absent key is not an error.
    pub fn delete(&self, namespace: &str, key: &str) -> ActionResult<()> {
        let mut map = self.load_namespace(namespace)?;
        if map.remove(key).is_some() {
            self.write_namespace(namespace, &map)?;
        }
        Ok(())
    }

    fn namespace_path(&self, namespace: &str) -> PathBuf {
        // Namespaces come from configuration, not user input; keep the
        // mapping readable but strip path separators.
        let safe: String = namespace
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }

    fn load_namespace(&self, namespace: &str) -> ActionResult<HashMap<String, String>> {
        let path = self.namespace_path(namespace);
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let mut raw = String::new();
        File::open(&path)
            .and_then(|mut f| f.read_to_string(&mut raw))
            .map_err(|e| ActionError::credential_store(format!("read {}: {}", path.display(), e)))?;
        let map = serde_json::from_str(&raw)?;
        Ok(map)
    }

    fn write_namespace(&self, namespace: &str, map: &HashMap<String, String>) -> ActionResult<()> {
        let path = self.namespace_path(namespace);
        let data = serde_json::to_vec_pretty(map)?;
        let mut file = open_private(&path)
            .map_err(|e| ActionError::credential_store(format!("open {}: {}", path.display(), e)))?;
        file.write_all(&data)
            .and_then(|_| file.sync_all())
            .map_err(|e| ActionError::credential_store(format!("write {}: {}", path.display(), e)))?;
        Ok(())
    }
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().write(true).create(true).truncate(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let store = SecretStore::new(dir.path()).unwrap();

        store.put("app", "accessToken", "tok-1").unwrap();
        assert_eq!(store.get("app", "accessToken").unwrap().as_deref(), Some("tok-1"));
    }

    #[test]
    fn missing_key_is_none() {
        let dir = tempdir().unwrap();
        let store = SecretStore::new(dir.path()).unwrap();

        assert_eq!(store.get("app", "nope").unwrap(), None);
    }

    #[test]
    fn namespaces_are_isolated() {
        let dir = tempdir().unwrap();
        let store = SecretStore::new(dir.path()).unwrap();

        store.put("app_a", "token", "a").unwrap();
        store.put("app_b", "token", "b").unwrap();

        assert_eq!(store.get("app_a", "token").unwrap().as_deref(), Some("a"));
        assert_eq!(store.get("app_b", "token").unwrap().as_deref(), Some("b"));
    }

    #[test]
    fn put_overwrites_previous_value() {
        let dir = tempdir().unwrap();
        let store = SecretStore::new(dir.path()).unwrap();

        store.put("app", "token", "old").unwrap();
        store.put("app", "token", "new").unwrap();
        assert_eq!(store.get("app", "token").unwrap().as_deref(), Some("new"));
    }

    #[test]
    fn delete_removes_key() {
        let dir = tempdir().unwrap();
        let store = SecretStore::new(dir.path()).unwrap();

        store.put("app", "token", "v").unwrap();
        store.delete("app", "token").unwrap();
        assert_eq!(store.get("app", "token").unwrap(), None);

        // Deleting again is a no-op.
        store.delete("app", "token").unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn credential_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let store = SecretStore::new(dir.path()).unwrap();
        store.put("app", "token", "v").unwrap();

        let meta = std::fs::metadata(dir.path().join("app.json")).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }
}
