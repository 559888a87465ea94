use serde_derive::{Deserialize, Serialize};
use crate::{
    config::{DEFAULT_PIECE_SIZE, DOWNLOAD_HOME},
    error::SupernodeError,
    lock_pool::LockPool,
    store::Store,
    task::Task,
    util::sha1_hex,
};
use super::{path, CdnError, Result};

// Everything the supernode remembers about a cached file, stored as
// `{taskID}.meta` next to the blob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileMetaData {

    #[serde(rename = "taskID")]
    pub task_id: String,

    pub url: String,

    pub piece_size: i32,

    #[serde(rename = "httpFileLen")]
    pub http_file_len: i64,

    // Millis of the last time the cache was used.
    pub access_time: i64,

    // Millis between the last two accesses.
    pub interval: i64,

    // Length of the framed blob.
    pub file_length: i64,

    pub md5: String,

    pub identifier: String,

    pub real_md5: String,

    pub last_modified: i64,

    #[serde(rename = "eTag")]
    pub etag: String,

    pub finish: bool,

    pub success: bool,

}

// Reads and writes the meta and piece md5 files of cached tasks.
// Every change is a read-modify-write under the task's lock.
#[derive(Debug, Clone)]
pub struct MetaStore {

    store: Store,

    locks: LockPool,

}

impl MetaStore {

    pub fn new(store: Store) -> Self {
        Self {
            store,
            locks: LockPool::new(),
        }
    }

    // Writes a fresh meta describing the task.
    pub async fn write_by_task(&self, task: &Task) -> Result<FileMetaData> {
        let meta = FileMetaData {
            task_id: task.id.clone(),
            url: task.task_url.clone(),
            piece_size: task.piece_size,
            http_file_len: task.http_file_length,
            file_length: task.file_length,
            md5: task.md5.clone(),
            identifier: task.identifier.clone(),
            ..Default::default()
        };
        let _guard = self.locks.write(&task.id).await;
        self.write(&meta).await?;
        Ok(meta)
    }

    pub async fn read(&self, task_id: &str) -> Result<FileMetaData> {
        let _guard = self.locks.read(task_id).await;
        self.read_unlocked(task_id).await
    }

    // Stamps a new access time and keeps the gap to the previous one.
    pub async fn update_access_time(&self, task_id: &str, access_time: i64) -> Result<FileMetaData> {
        self.modify(task_id, |meta| {
            let interval = access_time - meta.access_time;
            if interval < 0 {
                tracing::warn!("access time of task {} went backwards by {}ms", task_id, -interval);
            }
            meta.interval = interval.max(0);
            meta.access_time = access_time;
        }).await
    }

    pub async fn update_last_modified_and_etag(&self, task_id: &str, last_modified: i64, etag: &str) -> Result<FileMetaData> {
        self.modify(task_id, |meta| {
            meta.last_modified = last_modified;
            if !etag.is_empty() {
                meta.etag = etag.to_string();
            }
        }).await
    }

    // Marks the download as finished with its result.
    pub async fn update_status(
        &self,
        task_id: &str,
        success: bool,
        real_md5: &str,
        file_length: i64,
    ) -> Result<FileMetaData> {
        self.modify(task_id, |meta| {
            meta.finish = true;
            meta.success = success;
            if success {
                meta.real_md5 = real_md5.to_string();
                meta.file_length = file_length;
            }
        }).await
    }

    // Persists the piece md5s followed by the file md5 and a sha1 over both.
    pub async fn write_piece_md5s(&self, task_id: &str, file_md5: &str, piece_md5s: &[String]) -> Result<()> {
        if piece_md5s.is_empty() {
            tracing::warn!("no piece md5s to write for task {}", task_id);
            return Ok(());
        }
        let mut values = piece_md5s.to_vec();
        values.push(file_md5.to_string());
        values.push(sha1_hex(values.join("\n").as_bytes()));

        let data = serde_json::to_vec(&values).map_err(SupernodeError::from)?;
        let _guard = self.locks.write(task_id).await;
        self.store.put_bytes(DOWNLOAD_HOME, &path::md5_key(task_id), &data).await?;
        Ok(())
    }

    // Reads the piece md5s back, checking the sha1 and, when given, the file md5.
    pub async fn read_piece_md5s(&self, task_id: &str, file_md5: &str) -> Result<Vec<String>> {
        let data = {
            let _guard = self.locks.read(task_id).await;
            self.store.get_bytes(DOWNLOAD_HOME, &path::md5_key(task_id)).await?
        };
        let mut values: Vec<String> = serde_json::from_slice(&data).map_err(SupernodeError::from)?;
        if values.len() < 3 {
            return Err(CdnError::InvalidMd5File(format!("only {} values", values.len())));
        }

        let sha1 = values.pop().unwrap_or_default();
        if sha1_hex(values.join("\n").as_bytes()) != sha1 {
            return Err(CdnError::InvalidMd5File(format!("sha1 {} does not match", sha1)));
        }
        let stored_md5 = values.pop().unwrap_or_default();
        if !file_md5.is_empty() && stored_md5 != file_md5 {
            return Err(CdnError::InvalidMd5File(format!(
                "file md5 {} does not match {}", stored_md5, file_md5,
            )));
        }
        Ok(values)
    }

    async fn modify<F>(&self, task_id: &str, f: F) -> Result<FileMetaData>
    where
        F: FnOnce(&mut FileMetaData),
    {
        let _guard = self.locks.write(task_id).await;
        let mut meta = self.read_unlocked(task_id).await?;
        f(&mut meta);
        self.write(&meta).await?;
        Ok(meta)
    }

    async fn read_unlocked(&self, task_id: &str) -> Result<FileMetaData> {
        let data = self.store.get_bytes(DOWNLOAD_HOME, &path::meta_key(task_id)).await?;
        let mut meta: FileMetaData = serde_json::from_slice(&data).map_err(SupernodeError::from)?;
        if meta.piece_size == 0 {
            meta.piece_size = DEFAULT_PIECE_SIZE;
        }
        Ok(meta)
    }

    pub(super) async fn write(&self, meta: &FileMetaData) -> Result<()> {
        let data = serde_json::to_vec(meta).map_err(SupernodeError::from)?;
        self.store.put_bytes(DOWNLOAD_HOME, &path::meta_key(&meta.task_id), &data).await?;
        Ok(())
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> Task {
        Task {
            id: "abcdef".to_string(),
            task_url: "http://example.com/file".to_string(),
            piece_size: 10,
            http_file_length: 11,
            file_length: 11,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_meta_lifecycle() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::TempDir::new()?;
        let metas = MetaStore::new(Store::new(dir.path()));

        assert!(metas.read("abcdef").await.is_err());
        metas.write_by_task(&task()).await?;
        let meta = metas.read("abcdef").await?;
        assert_eq!(meta.url, "http://example.com/file");
        assert_eq!(meta.piece_size, 10);
        assert!(!meta.finish);

        metas.update_access_time("abcdef", 1000).await?;
        let meta = metas.update_access_time("abcdef", 1500).await?;
        assert_eq!((meta.access_time, meta.interval), (1500, 500));

        metas.update_last_modified_and_etag("abcdef", 42, "\"v1\"").await?;
        let meta = metas.update_status("abcdef", true, "md5", 16).await?;
        assert!(meta.finish && meta.success);
        assert_eq!(meta.last_modified, 42);
        assert_eq!(meta.etag, "\"v1\"");
        assert_eq!(meta.file_length, 16);
        Ok(())
    }

    #[tokio::test]
    async fn test_default_piece_size() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::TempDir::new()?;
        let store = Store::new(dir.path());
        store.put_bytes(DOWNLOAD_HOME, &path::meta_key("abcdef"), br#"{"taskID":"abcdef"}"#).await?;
        let meta = MetaStore::new(store).read("abcdef").await?;
        assert_eq!(meta.piece_size, DEFAULT_PIECE_SIZE);
        Ok(())
    }

    #[tokio::test]
    async fn test_piece_md5_file() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::TempDir::new()?;
        let store = Store::new(dir.path());
        let metas = MetaStore::new(store.clone());
        let pieces = vec!["a:10".to_string(), "b:6".to_string()];

        metas.write_piece_md5s("abcdef", "filemd5", &[]).await?;
        assert!(metas.read_piece_md5s("abcdef", "").await.is_err());

        metas.write_piece_md5s("abcdef", "filemd5", &pieces).await?;
        assert_eq!(metas.read_piece_md5s("abcdef", "filemd5").await?, pieces);
        assert_eq!(metas.read_piece_md5s("abcdef", "").await?, pieces);
        assert!(matches!(
            metas.read_piece_md5s("abcdef", "othermd5").await,
            Err(CdnError::InvalidMd5File(_)),
        ));

        store.put_bytes(DOWNLOAD_HOME, &path::md5_key("abcdef"), br#"["a:10","filemd5","bogus"]"#).await?;
        assert!(metas.read_piece_md5s("abcdef", "filemd5").await.is_err());
        Ok(())
    }
}
