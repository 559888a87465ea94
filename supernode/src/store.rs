use std::{
    io::{ErrorKind, SeekFrom},
    path::{Path, PathBuf},
    time::SystemTime,
};
use tokio::{
    fs,
    io::{AsyncSeekExt, AsyncWriteExt, BufReader},
    task,
};
use crate::error::{Result, SupernodeError};

// Metadata of a stored object.
#[derive(Debug, Clone)]
pub struct StorageInfo {

    // Key relative to its bucket.
    pub key: String,

    pub size: u64,

    pub mod_time: SystemTime,

}

// Local file store addressed by bucket and key.
// Keys may contain '/' to form sub directories inside a bucket.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, bucket: &str, key: &str) -> PathBuf {
        let mut path = self.root.join(bucket);
        if !key.is_empty() {
            path.push(key);
        }
        path
    }

    // Replaces the whole object.
    pub async fn put_bytes(&self, bucket: &str, key: &str, data: &[u8]) -> Result<()> {
        let path = self.path(bucket, key);
        create_parent(&path).await?;
        fs::write(&path, data).await?;
        Ok(())
    }

    pub async fn get_bytes(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let path = self.path(bucket, key);
        fs::read(&path).await.map_err(|e| not_found(e, bucket, key))
    }

    // Writes data at the given offset, creating the object if needed.
    pub async fn write_at(&self, bucket: &str, key: &str, offset: u64, data: &[u8]) -> Result<()> {
        let path = self.path(bucket, key);
        create_parent(&path).await?;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .await?;
        file.seek(SeekFrom::Start(offset)).await?;
        file.write_all(data).await?;
        file.flush().await?;
        Ok(())
    }

    // Buffered reader over the object.
    pub async fn open(&self, bucket: &str, key: &str) -> Result<BufReader<fs::File>> {
        let path = self.path(bucket, key);
        let file = fs::File::open(&path).await.map_err(|e| not_found(e, bucket, key))?;
        Ok(BufReader::new(file))
    }

    pub async fn stat(&self, bucket: &str, key: &str) -> Result<StorageInfo> {
        let path = self.path(bucket, key);
        let meta = fs::metadata(&path).await.map_err(|e| not_found(e, bucket, key))?;
        Ok(StorageInfo {
            key: key.to_string(),
            size: meta.len(),
            mod_time: meta.modified()?,
        })
    }

    // Removes a file, or a directory when it is empty.
    pub async fn remove(&self, bucket: &str, key: &str) -> Result<()> {
        let path = self.path(bucket, key);
        let meta = fs::metadata(&path).await.map_err(|e| not_found(e, bucket, key))?;
        if meta.is_dir() {
            fs::remove_dir(&path).await?;
        } else {
            fs::remove_file(&path).await?;
        }
        Ok(())
    }

    // Lists every file below the bucket.
    pub async fn walk(&self, bucket: &str) -> Result<Vec<StorageInfo>> {
        let base = self.path(bucket, "");
        task::spawn_blocking(move || walk_dir(&base, &base)).await?
    }

    // Free bytes on the filesystem holding the store.
    pub async fn available_space(&self) -> Result<u64> {
        let root = self.root.clone();
        task::spawn_blocking(move || -> Result<u64> {
            std::fs::create_dir_all(&root)?;
            Ok(fs2::available_space(&root)?)
        }).await?
    }

}

async fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    Ok(())
}

fn not_found(e: std::io::Error, bucket: &str, key: &str) -> SupernodeError {
    if e.kind() == ErrorKind::NotFound {
        SupernodeError::DataNotFound(format!("key {}/{}", bucket, key))
    } else {
        SupernodeError::IoError(e)
    }
}

fn walk_dir(base: &Path, dir: &Path) -> Result<Vec<StorageInfo>> {
    let mut infos = Vec::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(infos),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let meta = entry.metadata()?;
        if meta.is_dir() {
            infos.extend(walk_dir(base, &path)?);
            continue;
        }
        let key = path
            .strip_prefix(base)
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_default();
        infos.push(StorageInfo {
            key,
            size: meta.len(),
            mod_time: meta.modified()?,
        });
    }
    Ok(infos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_write_at_and_read() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::TempDir::new()?;
        let store = Store::new(dir.path());

        store.write_at("download", "abc/abcdef", 4, b"world").await?;
        store.write_at("download", "abc/abcdef", 0, b"hey ").await?;
        assert_eq!(store.get_bytes("download", "abc/abcdef").await?, b"hey world");

        let mut reader = store.open("download", "abc/abcdef").await?;
        let mut buf = String::new();
        reader.read_to_string(&mut buf).await?;
        assert_eq!(buf, "hey world");

        let info = store.stat("download", "abc/abcdef").await?;
        assert_eq!(info.size, 9);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_key() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::TempDir::new()?;
        let store = Store::new(dir.path());
        assert!(store.get_bytes("download", "nope").await.unwrap_err().is_data_not_found());
        assert!(store.remove("download", "nope").await.unwrap_err().is_data_not_found());
        assert!(store.walk("download").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_walk_and_remove() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::TempDir::new()?;
        let store = Store::new(dir.path());
        store.put_bytes("download", "abc/abc1", b"1").await?;
        store.put_bytes("download", "abc/abc1.meta", b"{}").await?;
        store.put_bytes("download", "def/def1", b"22").await?;

        let mut keys: Vec<_> = store.walk("download").await?.into_iter().map(|i| i.key).collect();
        keys.sort();
        assert_eq!(keys, vec!["abc/abc1", "abc/abc1.meta", "def/def1"]);

        // Non-empty directories are kept.
        assert!(store.remove("download", "abc").await.is_err());
        store.remove("download", "abc/abc1").await?;
        store.remove("download", "abc/abc1.meta").await?;
        store.remove("download", "abc").await?;
        assert_eq!(store.walk("download").await?.len(), 1);
        assert!(store.available_space().await? > 0);
        Ok(())
    }
}
