use reqwest::header;
use crate::{
    config::{DOWNLOAD_HOME, PIECE_WRAP_SIZE},
    task::Task,
    util::now_millis,
};
use super::{meta::FileMetaData, path, reader::PieceScanner, CdnManager, Result};

// How much of a task the local cache already holds.
pub enum CacheHit {

    // Nothing usable, the files have been reset.
    Miss,

    // Leading pieces survived an interrupted download.
    Partial(PieceScanner),

    // The whole file.
    Full,

}

impl CacheHit {

    fn name(&self) -> &'static str {
        match self {
            CacheHit::Miss => "miss",
            CacheHit::Partial(_) => "partial",
            CacheHit::Full => "full",
        }
    }

}

// Whether the meta describes the same file as the task.
pub fn same_file(task: &Task, meta: &FileMetaData) -> bool {
    if meta.piece_size != task.piece_size || meta.task_id != task.id || meta.url != task.task_url {
        return false;
    }
    if !task.md5.is_empty() {
        return meta.md5 == task.md5;
    }
    meta.identifier == task.identifier
}

// Whether the client asked the origin for a range of its own.
pub fn pins_range(task: &Task) -> bool {
    task.headers.keys().any(|k| k.eq_ignore_ascii_case(header::RANGE.as_str()))
}

impl CdnManager {

    pub(super) async fn detect_cache(&self, task: &Task) -> Result<(CacheHit, FileMetaData)> {
        let meta = match self.metas.read(&task.id).await {
            Ok(meta) if same_file(task, &meta) => Some(meta),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!("no usable meta for task {}: {}", task.id, e);
                None
            },
        };
        let hit = match &meta {
            Some(meta) => self.parse_hit(task, meta).await,
            None => CacheHit::Miss,
        };
        tracing::info!("task {} detects cache {}", task.id, hit.name());

        if let CacheHit::Miss = hit {
            let meta = self.reset_repo(task).await?;
            return Ok((hit, meta));
        }
        let meta = self.metas.update_access_time(&task.id, now_millis()).await?;
        Ok((hit, meta))
    }

    async fn parse_hit(&self, task: &Task, meta: &FileMetaData) -> CacheHit {
        let expired = self.origin
            .is_expired(&task.raw_url, &task.headers, meta.last_modified, &meta.etag)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("failed to check whether task {} expired: {}", task.id, e);
                true
            });
        if expired {
            return CacheHit::Miss;
        }

        if meta.finish {
            return if meta.success { CacheHit::Full } else { CacheHit::Miss };
        }

        // Resuming would have to rewrite the client's range.
        if pins_range(task) {
            return CacheHit::Miss;
        }

        let support_range = self.origin
            .is_support_range(&task.raw_url, &task.headers)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("failed to check range support of task {}: {}", task.id, e);
                false
            });
        if !support_range || task.http_file_length < 0 {
            return CacheHit::Miss;
        }

        let mut scanner = PieceScanner::new(true, true);
        match self.store.open(DOWNLOAD_HOME, &path::download_key(&task.id)).await {
            Ok(mut reader) => {
                if let Err(e) = scanner.scan(&mut reader).await {
                    tracing::debug!("task {} cache stops after {} pieces: {}", task.id, scanner.piece_count, e);
                }
            },
            Err(e) => {
                tracing::error!("failed to open cache of task {}: {}", task.id, e);
                return CacheHit::Miss;
            },
        }

        let piece_cont = (task.piece_size - PIECE_WRAP_SIZE as i32) as i64;
        let cached = scanner.piece_count as i64 * piece_cont;
        if scanner.piece_count == 0 || cached >= task.http_file_length {
            return CacheHit::Miss;
        }
        CacheHit::Partial(scanner)
    }

    async fn reset_repo(&self, task: &Task) -> Result<FileMetaData> {
        tracing::info!("reset repo for task {}", task.id);
        if let Err(e) = self.delete_task_files(&task.id).await {
            tracing::error!("failed to delete files of task {}: {}", task.id, e);
        }
        self.metas.write_by_task(task).await
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_file() {
        let task = Task {
            id: "abc".to_string(),
            task_url: "http://a/b".to_string(),
            piece_size: 10,
            identifier: "id".to_string(),
            ..Default::default()
        };
        let meta = FileMetaData {
            task_id: "abc".to_string(),
            url: "http://a/b".to_string(),
            piece_size: 10,
            identifier: "id".to_string(),
            ..Default::default()
        };
        assert!(same_file(&task, &meta));
        assert!(!same_file(&Task { piece_size: 20, ..task.clone() }, &meta));
        assert!(!same_file(&Task { identifier: "other".to_string(), ..task.clone() }, &meta));
        assert!(!same_file(&Task { md5: "m".to_string(), ..task.clone() }, &meta));
        assert!(same_file(&Task { md5: "m".to_string(), ..task }, &FileMetaData { md5: "m".to_string(), ..meta }));
    }

    #[test]
    fn test_pins_range() {
        let mut task = Task::default();
        assert!(!pins_range(&task));
        task.headers.insert("range".to_string(), "bytes=0-9".to_string());
        assert!(pins_range(&task));
    }
}
