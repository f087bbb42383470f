//! Persistence of rendered certificate documents.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;

use rollcall_core::{EventId, ParticipantId};

use crate::error::{RenderError, Result};

/// Storage name of a rendered certificate: `cert_{event}_{participant}.svg`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentKey(String);

impl DocumentKey {
    pub fn certificate(event: EventId, participant: &ParticipantId) -> Self {
        let safe: String = participant
            .as_str()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        Self(format!("cert_{}_{}.svg", event, safe))
    }

    /// Accept an externally supplied key if it is a plain file name.
    pub fn parse(key: &str) -> Result<Self> {
        let plain = !key.is_empty()
            && key != "."
            && key != ".."
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !plain {
            return Err(RenderError::InvalidKey(key.to_string()));
        }
        Ok(Self(key.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where rendered documents live.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Store a document, replacing any previous version under the same key.
    async fn put(&self, key: &DocumentKey, contents: &[u8]) -> Result<()>;

    async fn get(&self, key: &DocumentKey) -> Result<Option<Vec<u8>>>;
}

/// Documents as files in one directory.
pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    /// Use `root`, creating it if needed.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn path_of(&self, key: &DocumentKey) -> PathBuf {
        self.root.join(key.as_str())
    }
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn put(&self, key: &DocumentKey, contents: &[u8]) -> Result<()> {
        let path = self.path_of(key);
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &path).await?;
        tracing::debug!(key = %key, bytes = contents.len(), "document stored");
        Ok(())
    }

    async fn get(&self, key: &DocumentKey) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_of(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Documents held in memory. For tests.
#[derive(Default)]
pub struct MemoryDocumentStore {
    docs: RwLock<HashMap<DocumentKey, Vec<u8>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.docs.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn put(&self, key: &DocumentKey, contents: &[u8]) -> Result<()> {
        let mut docs = self
            .docs
            .write()
            .map_err(|e| RenderError::Io(std::io::Error::other(e.to_string())))?;
        docs.insert(key.clone(), contents.to_vec());
        Ok(())
    }

    async fn get(&self, key: &DocumentKey) -> Result<Option<Vec<u8>>> {
        let docs = self
            .docs
            .read()
            .map_err(|e| RenderError::Io(std::io::Error::other(e.to_string())))?;
        Ok(docs.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_certificate_key_is_filesystem_safe() {
        let key = DocumentKey::certificate(EventId(3), &ParticipantId::new("../etc/passwd"));
        assert_eq!(key.as_str(), "cert_3____etc_passwd.svg");
        assert!(DocumentKey::parse(key.as_str()).is_ok());
    }

    #[test]
    fn test_parse_rejects_paths() {
        assert!(DocumentKey::parse("../x.svg").is_err());
        assert!(DocumentKey::parse("a/b.svg").is_err());
        assert!(DocumentKey::parse("").is_err());
        assert!(DocumentKey::parse("..").is_err());
    }

    #[tokio::test]
    async fn test_fs_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::open(dir.path().join("generated")).await.unwrap();
        let key = DocumentKey::certificate(EventId(1), &ParticipantId::new("123"));

        assert!(store.get(&key).await.unwrap().is_none());
        store.put(&key, b"<svg/>").await.unwrap();
        store.put(&key, b"<svg></svg>").await.unwrap();
        assert_eq!(store.get(&key).await.unwrap().unwrap(), b"<svg></svg>");
        assert!(store.path_of(&key).exists());
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryDocumentStore::new();
        let key = DocumentKey::certificate(EventId(1), &ParticipantId::new("123"));
        store.put(&key, b"doc").await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&key).await.unwrap().unwrap(), b"doc");
    }
}
