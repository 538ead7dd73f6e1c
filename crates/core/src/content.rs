use std::collections::HashMap;
use std::io::{self, ErrorKind};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tabshell_settings::DecodePolicy;
use thiserror::Error;
use tracing::debug;

use crate::decode::decode_text;

/// Failures reported by a [`ContentProvider`].
/// [`ContentProvider`] 回報的錯誤。
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("file {0} does not exist")]
    NotFound(String),
    #[error("{0} is not a regular file")]
    NotAFile(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("{0} is not valid text")]
    InvalidEncoding(String),
}

impl ContentError {
    fn from_io(path: &str, err: io::Error) -> Self {
        match err.kind() {
            ErrorKind::NotFound => ContentError::NotFound(path.to_string()),
            _ => ContentError::Io {
                path: path.to_string(),
                source: err,
            },
        }
    }
}

/// Source of document text, addressed by entry path.
/// 以節點路徑取得文件內容的來源。
#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// Returns the full text stored at `path`.
    async fn read(&self, path: &str) -> Result<String, ContentError>;
}

/// Reads documents from the local filesystem.
/// 從本機檔案系統讀取文件。
#[derive(Debug, Clone, Default)]
pub struct FsContentProvider {
    decode: DecodePolicy,
}

impl FsContentProvider {
    pub fn new(decode: DecodePolicy) -> Self {
        Self { decode }
    }
}

#[async_trait]
impl ContentProvider for FsContentProvider {
    async fn read(&self, path: &str) -> Result<String, ContentError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|err| ContentError::from_io(path, err))?;
        if !metadata.is_file() {
            return Err(ContentError::NotAFile(path.to_string()));
        }
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|err| ContentError::from_io(path, err))?;
        let decoded = decode_text(&bytes, self.decode)
            .map_err(|_| ContentError::InvalidEncoding(path.to_string()))?;
        debug!(path, encoding = decoded.encoding, bytes = bytes.len(), "read document");
        Ok(decoded.text)
    }
}

/// In-memory provider keyed by path; handy for embedding and tests.
/// 以路徑為鍵的記憶體內容來源，適合嵌入與測試。
#[derive(Debug, Default)]
pub struct MemoryContentProvider {
    files: Mutex<HashMap<String, String>>,
}

impl MemoryContentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.insert(path, content);
        self
    }

    pub fn insert(&self, path: impl Into<String>, content: impl Into<String>) {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.into(), content.into());
    }

    pub fn remove(&self, path: &str) -> Option<String> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path)
    }
}

#[async_trait]
impl ContentProvider for MemoryContentProvider {
    async fn read(&self, path: &str) -> Result<String, ContentError> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
            .ok_or_else(|| ContentError::NotFound(path.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn fs_provider_reads_utf8_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, "line one\nline two\n").unwrap();

        let provider = FsContentProvider::default();
        let text = provider.read(path.to_str().unwrap()).await.unwrap();
        assert_eq!(text, "line one\nline two\n");
    }

    #[tokio::test]
    async fn fs_provider_classifies_failures() {
        let dir = tempdir().unwrap();
        let provider = FsContentProvider::default();

        let missing = dir.path().join("missing.txt");
        let err = provider.read(missing.to_str().unwrap()).await.unwrap_err();
        assert!(matches!(err, ContentError::NotFound(_)));

        let err = provider.read(dir.path().to_str().unwrap()).await.unwrap_err();
        assert!(matches!(err, ContentError::NotAFile(_)));

        let binary = dir.path().join("blob.bin");
        fs::write(&binary, [0xC3, 0x28, 0xFF]).unwrap();
        let err = provider.read(binary.to_str().unwrap()).await.unwrap_err();
        assert!(matches!(err, ContentError::InvalidEncoding(_)));
    }

    #[tokio::test]
    async fn memory_provider_serves_inserted_text() {
        let provider = MemoryContentProvider::new().with_file("/a.txt", "alpha");
        assert_eq!(provider.read("/a.txt").await.unwrap(), "alpha");
        provider.remove("/a.txt");
        assert!(matches!(
            provider.read("/a.txt").await,
            Err(ContentError::NotFound(_))
        ));
    }
}
