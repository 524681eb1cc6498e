/// Attachment storage on the local filesystem
///
/// Files live at `{root}/{organization_id}/{task_id}/{attachment_id}`; the
/// original file name is kept only in the database. Writes go to a
/// `.part` file first and are renamed into place once complete, so a
/// failed upload never leaves a truncated attachment behind.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("File exceeds the {limit} byte limit")]
    TooLarge { limit: usize },

    #[error("File not found")]
    NotFound,

    /// The incoming stream failed (client went away, body limit hit, ...)
    #[error("Upload interrupted: {0}")]
    Source(Box<dyn std::error::Error + Send + Sync>),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone)]
pub struct AttachmentStore {
    root: PathBuf,
    max_bytes: usize,
}

/// Where a stored file ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Path relative to the store root, saved as `storage_key`
    pub key: String,
    pub size_bytes: i64,
}

impl AttachmentStore {
    pub fn new(root: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self {
            root: root.into(),
            max_bytes,
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn key_for(organization_id: Uuid, task_id: Uuid, attachment_id: Uuid) -> String {
        format!("{}/{}/{}", organization_id, task_id, attachment_id)
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        // keys are generated by key_for; anything else is refused
        let valid = key.split('/').count() == 3 && key.split('/').all(|part| Uuid::parse_str(part).is_ok());
        if !valid {
            return Err(StorageError::NotFound);
        }
        Ok(self.root.join(key))
    }

    /// Streams `chunks` to disk, enforcing the size limit as bytes arrive
    pub async fn save<S, E>(&self, key: &str, mut chunks: S) -> Result<StoredFile, StorageError>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: std::error::Error + Send + Sync + 'static,
    {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let partial = path.with_extension("part");
        let mut file = fs::File::create(&partial).await?;
        let mut written: usize = 0;

        let outcome: Result<(), StorageError> = async {
            while let Some(chunk) = chunks.next().await {
                let chunk = chunk.map_err(|e| StorageError::Source(Box::new(e)))?;
                written += chunk.len();
                if written > self.max_bytes {
                    return Err(StorageError::TooLarge { limit: self.max_bytes });
                }
                file.write_all(&chunk).await?;
            }
            file.flush().await?;
            Ok(())
        }
        .await;

        drop(file);

        if let Err(err) = outcome {
            let _ = fs::remove_file(&partial).await;
            return Err(err);
        }

        fs::rename(&partial, &path).await?;

        Ok(StoredFile {
            key: key.to_string(),
            size_bytes: written as i64,
        })
    }

    pub async fn read(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StorageError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Removes a file; a missing file is not an error
    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Reduces an uploaded file name to something safe to echo back in
/// `Content-Disposition`: no path components, no control or quote
/// characters, at most 255 bytes.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");

    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, '"' | '\'' | ';' | '<' | '>' | '|' | '*' | '?' | ':'))
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.').trim();

    if cleaned.is_empty() {
        return "attachment".to_string();
    }

    let mut end = cleaned.len().min(255);
    while !cleaned.is_char_boundary(end) {
        end -= 1;
    }
    cleaned[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn temp_store(max_bytes: usize) -> AttachmentStore {
        let dir = std::env::temp_dir().join(format!("nexusflow-store-{}", Uuid::new_v4()));
        AttachmentStore::new(dir, max_bytes)
    }

    fn chunks(parts: &[&'static [u8]]) -> impl Stream<Item = Result<Bytes, io::Error>> + Unpin {
        stream::iter(parts.iter().map(|p| Ok(Bytes::from_static(p))).collect::<Vec<_>>())
    }

    fn key() -> String {
        AttachmentStore::key_for(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4())
    }

    #[tokio::test]
    async fn test_save_read_delete() {
        let store = temp_store(1024);
        let key = key();

        let stored = store.save(&key, chunks(&[b"hello ", b"world"])).await.unwrap();
        assert_eq!(stored.size_bytes, 11);
        assert_eq!(store.read(&key).await.unwrap(), b"hello world");

        store.delete(&key).await.unwrap();
        assert!(matches!(store.read(&key).await, Err(StorageError::NotFound)));
        store.delete(&key).await.unwrap();

        let _ = fs::remove_dir_all(store.root()).await;
    }

    #[tokio::test]
    async fn test_size_limit_leaves_nothing_behind() {
        let store = temp_store(8);
        let key = key();

        let result = store.save(&key, chunks(&[b"12345", b"67890"])).await;
        assert!(matches!(result, Err(StorageError::TooLarge { limit: 8 })));
        assert!(matches!(store.read(&key).await, Err(StorageError::NotFound)));

        let _ = fs::remove_dir_all(store.root()).await;
    }

    #[tokio::test]
    async fn test_failed_source_keeps_its_error() {
        let store = temp_store(1024);
        let key = key();

        let failing = stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "client went away")),
        ]);
        let result = store.save(&key, failing).await;

        match result {
            Err(StorageError::Source(e)) => assert!(e.downcast_ref::<io::Error>().is_some()),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(matches!(store.read(&key).await, Err(StorageError::NotFound)));

        let _ = fs::remove_dir_all(store.root()).await;
    }

    #[tokio::test]
    async fn test_rejects_foreign_keys() {
        let store = temp_store(8);
        assert!(matches!(store.read("../../etc/passwd").await, Err(StorageError::NotFound)));
        assert!(matches!(store.read("a/b/c").await, Err(StorageError::NotFound)));
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("report.pdf"), "report.pdf");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\jane\\notes.txt"), "notes.txt");
        assert_eq!(sanitize_file_name("bad\"name;.txt"), "badname.txt");
        assert_eq!(sanitize_file_name("..."), "attachment");
        assert_eq!(sanitize_file_name(""), "attachment");
        assert_eq!(sanitize_file_name(&"é".repeat(200)).len(), 254);
    }
}
