//! Directory-backed remote provider.
//!
//! Treats a directory (typically on a shared or synced drive) as the remote
//! authoritative store:
//!
//! ```text
//! <root>/
//!   objects/<ref>.json   one serialized document per remote object
//!   objects/<ref>/       sub-directories are folder entries
//!   changes.jsonl        append-only change journal
//! ```
//!
//! Every create, update, and delete appends one line to the journal. The
//! change-feed cursor is the number of journal lines already consumed.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use mnemo_core::models::{ChangeFeed, ChangeRecord, Document, FileInfo, FOLDER_MIME_TYPE};
use mnemo_core::sync::{RemoteError, RemoteProvider};

const OBJECTS_DIR: &str = "objects";
const JOURNAL_FILE: &str = "changes.jsonl";
const OBJECT_MIME_TYPE: &str = "application/json";

pub struct DirectoryRemote {
    name: String,
    root: PathBuf,
}

fn io_error(context: &str, e: std::io::Error) -> RemoteError {
    match e.kind() {
        ErrorKind::NotFound => RemoteError::NotFound(context.to_string()),
        ErrorKind::PermissionDenied => RemoteError::Auth(format!("{}: {}", context, e)),
        _ => RemoteError::Other(format!("{}: {}", context, e)),
    }
}

impl DirectoryRemote {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn objects_dir(&self) -> PathBuf {
        self.root.join(OBJECTS_DIR)
    }

    fn journal_path(&self) -> PathBuf {
        self.root.join(JOURNAL_FILE)
    }

    fn entry_path(&self, remote_ref: &str) -> Result<PathBuf, RemoteError> {
        if remote_ref.is_empty()
            || remote_ref.contains(['/', '\\'])
            || remote_ref.starts_with('.')
        {
            return Err(RemoteError::Other(format!(
                "invalid remote ref: {:?}",
                remote_ref
            )));
        }
        Ok(self.objects_dir().join(remote_ref))
    }

    fn object_path(&self, remote_ref: &str) -> Result<PathBuf, RemoteError> {
        self.entry_path(remote_ref)?;
        Ok(self.objects_dir().join(format!("{}.json", remote_ref)))
    }

    async fn append_change(&self, remote_ref: &str, removed: bool) -> Result<(), RemoteError> {
        let record = ChangeRecord {
            remote_ref: remote_ref.to_string(),
            removed,
            content: None,
        };
        let mut line = serde_json::to_string(&record)
            .map_err(|e| RemoteError::Other(e.to_string()))?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.journal_path())
            .await
            .map_err(|e| io_error("change journal", e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| io_error("change journal", e))?;
        file.flush()
            .await
            .map_err(|e| io_error("change journal", e))?;
        Ok(())
    }

    async fn write_object(&self, remote_ref: &str, doc: &Document) -> Result<(), RemoteError> {
        let json = serde_json::to_string_pretty(doc)
            .map_err(|e| RemoteError::Other(e.to_string()))?;
        tokio::fs::write(self.object_path(remote_ref)?, json)
            .await
            .map_err(|e| io_error(remote_ref, e))
    }

    /// Create a folder entry (used to model container objects).
    pub async fn create_folder(&self, name: &str) -> Result<(), RemoteError> {
        tokio::fs::create_dir_all(self.entry_path(name)?)
            .await
            .map_err(|e| io_error(name, e))?;
        self.append_change(name, false).await
    }
}

#[async_trait]
impl RemoteProvider for DirectoryRemote {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&self) -> Result<(), RemoteError> {
        tokio::fs::create_dir_all(self.objects_dir())
            .await
            .map_err(|e| io_error("objects directory", e))?;
        let journal = self.journal_path();
        if !tokio::fs::try_exists(&journal).await.unwrap_or(false) {
            tokio::fs::write(&journal, b"")
                .await
                .map_err(|e| io_error("change journal", e))?;
        }
        debug!(root = %self.root.display(), "directory remote ready");
        Ok(())
    }

    async fn fetch_changes(&self, cursor: Option<&str>) -> Result<ChangeFeed, RemoteError> {
        let consumed: usize = match cursor {
            Some(c) => c
                .parse()
                .map_err(|_| RemoteError::Other(format!("invalid cursor: {:?}", c)))?,
            None => 0,
        };

        let journal = match tokio::fs::read_to_string(self.journal_path()).await {
            Ok(s) => s,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => return Err(io_error("change journal", e)),
        };

        let lines: Vec<&str> = journal.lines().filter(|l| !l.trim().is_empty()).collect();
        let mut changes = Vec::new();
        for line in lines.iter().skip(consumed) {
            let record: ChangeRecord = serde_json::from_str(line)
                .map_err(|e| RemoteError::Other(format!("corrupt change journal: {}", e)))?;
            changes.push(record);
        }

        Ok(ChangeFeed {
            changes,
            new_cursor: lines.len().max(consumed).to_string(),
        })
    }

    async fn read_object(&self, remote_ref: &str) -> Result<Document, RemoteError> {
        let raw = tokio::fs::read_to_string(self.object_path(remote_ref)?)
            .await
            .map_err(|e| io_error(remote_ref, e))?;
        serde_json::from_str(&raw)
            .map_err(|e| RemoteError::Other(format!("corrupt object {}: {}", remote_ref, e)))
    }

    async fn create_object(&self, doc: &Document) -> Result<String, RemoteError> {
        let remote_ref = uuid::Uuid::new_v4().simple().to_string();
        self.write_object(&remote_ref, doc).await?;
        self.append_change(&remote_ref, false).await?;
        Ok(remote_ref)
    }

    async fn update_object(&self, remote_ref: &str, doc: &Document) -> Result<(), RemoteError> {
        let path = self.object_path(remote_ref)?;
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(RemoteError::NotFound(remote_ref.to_string()));
        }
        self.write_object(remote_ref, doc).await?;
        self.append_change(remote_ref, false).await
    }

    async fn delete_object(&self, remote_ref: &str) -> Result<(), RemoteError> {
        match tokio::fs::remove_file(self.object_path(remote_ref)?).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(io_error(remote_ref, e)),
        }
        self.append_change(remote_ref, true).await
    }

    async fn get_file_info(&self, remote_ref: &str) -> Result<FileInfo, RemoteError> {
        let entry = self.entry_path(remote_ref)?;
        if tokio::fs::metadata(&entry)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            return Ok(FileInfo {
                mime_type: FOLDER_MIME_TYPE.to_string(),
                name: remote_ref.to_string(),
            });
        }
        tokio::fs::metadata(self.object_path(remote_ref)?)
            .await
            .map_err(|e| io_error(remote_ref, e))?;
        Ok(FileInfo {
            mime_type: OBJECT_MIME_TYPE.to_string(),
            name: format!("{}.json", remote_ref),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn remote() -> (TempDir, DirectoryRemote) {
        let tmp = TempDir::new().unwrap();
        let remote = DirectoryRemote::new("directory", tmp.path());
        remote.initialize().await.unwrap();
        (tmp, remote)
    }

    #[tokio::test]
    async fn test_create_read_update_delete_journal() {
        let (_tmp, remote) = remote().await;
        let mut doc = Document::new("Remote note", "note");
        let r = remote.create_object(&doc).await.unwrap();
        assert_eq!(remote.read_object(&r).await.unwrap().title, "Remote note");

        doc.title = "Renamed".to_string();
        remote.update_object(&r, &doc).await.unwrap();
        assert_eq!(remote.read_object(&r).await.unwrap().title, "Renamed");

        remote.delete_object(&r).await.unwrap();
        assert!(matches!(
            remote.read_object(&r).await,
            Err(RemoteError::NotFound(_))
        ));

        let feed = remote.fetch_changes(None).await.unwrap();
        assert_eq!(feed.changes.len(), 3);
        assert!(feed.changes[2].removed);
        assert_eq!(feed.new_cursor, "3");

        let rest = remote.fetch_changes(Some("2")).await.unwrap();
        assert_eq!(rest.changes.len(), 1);
        assert_eq!(rest.new_cursor, "3");
    }

    #[tokio::test]
    async fn test_update_missing_object_is_not_found() {
        let (_tmp, remote) = remote().await;
        let doc = Document::new("x", "note");
        assert!(matches!(
            remote.update_object("nope", &doc).await,
            Err(RemoteError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_folder_entries_report_folder_mime() {
        let (_tmp, remote) = remote().await;
        remote.create_folder("Archive").await.unwrap();
        let info = remote.get_file_info("Archive").await.unwrap();
        assert!(info.is_folder());

        let r = remote
            .create_object(&Document::new("x", "note"))
            .await
            .unwrap();
        assert!(!remote.get_file_info(&r).await.unwrap().is_folder());
    }

    #[tokio::test]
    async fn test_rejects_path_like_refs() {
        let (_tmp, remote) = remote().await;
        assert!(remote.read_object("../escape").await.is_err());
        assert!(remote.get_file_info("").await.is_err());
    }
}
