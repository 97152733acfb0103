//! Durable document storage.
//!
//! Two shapes of data: append-only collections (visits, reward bundles, mint
//! receipts) and single keyed documents (streak snapshots, pending mints).

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::io::SeekFrom;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::RwLock;

/// Error types for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying I/O failure
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored document could not be decoded
    #[error("Corrupt document in {location}: {message}")]
    Corrupt { location: String, message: String },

    /// Value could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Store refuses writes
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Append-only collections plus keyed documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Append a document to a collection.
    async fn append(&self, collection: &str, doc: Value) -> Result<(), StoreError>;

    /// Load every document in a collection, in append order.
    async fn load(&self, collection: &str) -> Result<Vec<Value>, StoreError>;

    /// Replace a keyed document.
    async fn put(&self, key: &str, doc: Value) -> Result<(), StoreError>;

    /// Fetch a keyed document.
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
}

/// In-memory store.
///
/// Writes can be switched off to simulate a failing backend.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Value>>>,
    documents: RwLock<HashMap<String, Value>>,
    read_only: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail (or succeed again).
    pub fn set_writable(&self, writable: bool) {
        self.read_only.store(!writable, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store is read-only".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn append(&self, collection: &str, doc: Value) -> Result<(), StoreError> {
        self.check_writable()?;
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .push(doc);
        Ok(())
    }

    async fn load(&self, collection: &str) -> Result<Vec<Value>, StoreError> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }

    async fn put(&self, key: &str, doc: Value) -> Result<(), StoreError> {
        self.check_writable()?;
        self.documents.write().await.insert(key.to_string(), doc);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.documents.read().await.get(key).cloned())
    }
}

/// File-backed store: `<dir>/<collection>.jsonl` and `<dir>/<key>.json`.
///
/// Appends are serialized through a lock so lines never interleave. A final
/// line without its newline is the remains of an interrupted append: `load`
/// skips it and the next `append` cuts it off before writing.
pub struct JsonFileStore {
    dir: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        tracing::debug!(dir = %dir.display(), "Opened JSON file store");
        Ok(Self {
            dir,
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn collection_path(&self, collection: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", sanitize(collection)))
    }

    fn document_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize(key)))
    }

    /// Make sure the collection file ends with a complete line.
    async fn repair_tail(&self, path: &Path) -> Result<(), StoreError> {
        let mut file = match tokio::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .await
        {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if file.metadata().await?.len() == 0 {
            return Ok(());
        }
        file.seek(SeekFrom::End(-1)).await?;
        let mut last = [0u8; 1];
        file.read_exact(&mut last).await?;
        if last[0] == b'\n' {
            return Ok(());
        }

        let content = tokio::fs::read(path).await?;
        let start = content
            .iter()
            .rposition(|b| *b == b'\n')
            .map(|i| i + 1)
            .unwrap_or(0);
        if serde_json::from_slice::<Value>(&content[start..]).is_ok() {
            // Only the newline was lost.
            file.seek(SeekFrom::End(0)).await?;
            file.write_all(b"\n").await?;
        } else {
            tracing::warn!(
                path = %path.display(),
                bytes = content.len() - start,
                "Dropping torn trailing line"
            );
            file.set_len(start as u64).await?;
        }
        file.flush().await?;
        Ok(())
    }
}

/// Map a key to a safe file stem.
fn sanitize(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect()
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    async fn append(&self, collection: &str, doc: Value) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(&doc)?;
        line.push('\n');

        let path = self.collection_path(collection);
        let _guard = self.write_lock.lock().await;
        self.repair_tail(&path).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn load(&self, collection: &str) -> Result<Vec<Value>, StoreError> {
        let path = self.collection_path(collection);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let torn_tail = !content.is_empty() && !content.ends_with('\n');
        let lines: Vec<(usize, &str)> = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .collect();
        let last = lines.len().saturating_sub(1);

        let mut docs = Vec::with_capacity(lines.len());
        for (i, (n, line)) in lines.into_iter().enumerate() {
            match serde_json::from_str(line) {
                Ok(doc) => docs.push(doc),
                Err(e) if torn_tail && i == last => {
                    tracing::warn!(
                        location = %format!("{}:{}", path.display(), n + 1),
                        error = %e,
                        "Skipping torn trailing line"
                    );
                }
                Err(e) => {
                    return Err(StoreError::Corrupt {
                        location: format!("{}:{}", path.display(), n + 1),
                        message: e.to_string(),
                    })
                }
            }
        }
        Ok(docs)
    }

    async fn put(&self, key: &str, doc: Value) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(&doc)?;
        let path = self.document_path(key);
        let tmp = path.with_extension("json.tmp");

        let _guard = self.write_lock.lock().await;
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let path = self.document_path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StoreError::Corrupt {
                    location: path.display().to_string(),
                    message: e.to_string(),
                }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStore::new();
        store.append("visits", json!({"n": 1})).await.unwrap();
        store.append("visits", json!({"n": 2})).await.unwrap();
        assert_eq!(store.load("visits").await.unwrap().len(), 2);
        assert!(store.load("other").await.unwrap().is_empty());

        store.set_writable(false);
        assert!(matches!(
            store.append("visits", json!({"n": 3})).await,
            Err(StoreError::Unavailable(_))
        ));
        assert_eq!(store.load("visits").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_file_store_roundtrip_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = JsonFileStore::open(dir.path()).await.unwrap();
            store.append("visits", json!({"id": "a"})).await.unwrap();
            store.append("visits", json!({"id": "b"})).await.unwrap();
            store.put("streak/user-1", json!({"current": 3})).await.unwrap();
        }

        let store = JsonFileStore::open(dir.path()).await.unwrap();
        let docs = store.load("visits").await.unwrap();
        assert_eq!(docs, vec![json!({"id": "a"}), json!({"id": "b"})]);
        assert_eq!(
            store.get("streak/user-1").await.unwrap(),
            Some(json!({"current": 3}))
        );
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_store_reports_corruption() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("visits.jsonl"), "{\"ok\":1}\nnot json\n")
            .await
            .unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();
        let err = store.load("visits").await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_file_store_survives_torn_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("visits.jsonl");
        tokio::fs::write(&path, "{\"id\":\"a\"}\n{\"id\":\"b\",\"land")
            .await
            .unwrap();

        let store = JsonFileStore::open(dir.path()).await.unwrap();
        assert_eq!(store.load("visits").await.unwrap(), vec![json!({"id": "a"})]);

        store.append("visits", json!({"id": "c"})).await.unwrap();
        assert_eq!(
            store.load("visits").await.unwrap(),
            vec![json!({"id": "a"}), json!({"id": "c"})]
        );
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_file_store_keeps_line_missing_newline() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("visits.jsonl"), "{\"id\":\"a\"}")
            .await
            .unwrap();

        let store = JsonFileStore::open(dir.path()).await.unwrap();
        store.append("visits", json!({"id": "b"})).await.unwrap();
        assert_eq!(
            store.load("visits").await.unwrap(),
            vec![json!({"id": "a"}), json!({"id": "b"})]
        );
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("streak/user 1"), "streak_user_1");
        assert_eq!(sanitize("../etc"), ".._etc");
    }
}
