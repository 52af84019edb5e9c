use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::NamedTempFile;

use super::{KeyValueStore, StorageError};

/// Durable store backed by one JSON object on disk.
///
/// Every write replaces the whole file through a temp file + rename in the
/// same directory, so a crash leaves either the old or the new contents.
/// File I/O runs on the blocking pool, never on a runtime worker.
#[derive(Debug, Clone)]
pub struct FileStore {
    inner: Arc<FileInner>,
}

#[derive(Debug)]
struct FileInner {
    path: PathBuf,
    write_lock: Mutex<()>,
}

type Map = BTreeMap<String, String>;

impl FileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            inner: Arc::new(FileInner {
                path: path.as_ref().to_path_buf(),
                write_lock: Mutex::new(()),
            }),
        }
    }

    async fn blocking<R, F>(&self, f: F) -> Result<R, StorageError>
    where
        F: FnOnce(&FileInner) -> Result<R, StorageError> + Send + 'static,
        R: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || f(&inner)).await?
    }
}

impl FileInner {
    fn read_map(&self) -> Result<Map, StorageError> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let bytes = fs::read(&self.path)?;
        if bytes.is_empty() {
            return Ok(Map::new());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn write_map(&self, map: &Map) -> Result<(), StorageError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, map)?;
        tmp.flush()?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(fs::Permissions::from_mode(0o600))?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| StorageError::Persist {
            path: self.path.display().to_string(),
            reason: e.error.to_string(),
        })?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.write_lock.lock();
        Ok(self.read_map()?.remove(key))
    }

    fn modify<F>(&self, f: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut Map) -> bool,
    {
        let _guard = self.write_lock.lock();
        let mut map = self.read_map()?;
        if f(&mut map) {
            self.write_map(&map)?;
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let key = key.to_string();
        self.blocking(move |inner| inner.get(&key)).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let (key, value) = (key.to_string(), value.to_string());
        self.blocking(move |inner| {
            inner.modify(|map| {
                map.insert(key, value);
                true
            })
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let key = key.to_string();
        self.blocking(move |inner| inner.modify(|map| map.remove(&key).is_some()))
            .await
    }

    async fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StorageError> {
        let entries: Vec<(String, String)> = entries
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect();
        self.blocking(move |inner| {
            inner.modify(|map| {
                map.extend(entries);
                true
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn persists_across_instances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = FileStore::new(&path);
        store
            .set_many(&[("vault.salt", "AAAA".to_string()), ("vault.ciphertext", "BBBB".to_string())])
            .await
            .unwrap();

        let reopened = FileStore::new(&path);
        assert_eq!(reopened.get("vault.salt").await.unwrap().as_deref(), Some("AAAA"));
        reopened.remove("vault.salt").await.unwrap();
        assert_eq!(store.get("vault.salt").await.unwrap(), None);
        assert_eq!(store.get("vault.ciphertext").await.unwrap().as_deref(), Some("BBBB"));
    }

    #[tokio::test]
    async fn missing_file_reads_empty_and_remove_does_not_create_it() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");
        let store = FileStore::new(&path);
        assert_eq!(store.get("anything").await.unwrap(), None);
        store.remove("anything").await.unwrap();
        assert!(!path.exists());
        store.set("k", "v").await.unwrap();
        assert!(path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        FileStore::new(&path).set("k", "v").await.unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, b"{not json").unwrap();
        let store = FileStore::new(&path);
        assert!(matches!(
            store.get("k").await,
            Err(StorageError::Serialisation(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_writers_do_not_clobber_each_other() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("store.json"));
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.set(&format!("k{i}"), "v").await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        for i in 0..16 {
            assert_eq!(store.get(&format!("k{i}")).await.unwrap().as_deref(), Some("v"));
        }
    }
}
