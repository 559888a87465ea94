use std::sync::Arc;
use md5::{Digest, Md5};
use crate::{
    config::{Config, DOWNLOAD_HOME},
    progress::{PieceStatus, ProgressEngine},
    task::{Task, TaskUpdate},
};
use super::{
    detector::CacheHit,
    meta::FileMetaData,
    path,
    piece_md5::PieceMd5s,
    reader::PieceScanner,
    CdnManager,
    Result,
};

// Publishes pieces held by the supernode: their md5 goes to memory and the
// piece turns SUCCESS in the supernode's progress.
#[derive(Debug, Clone)]
pub struct PieceReporter {

    config: Arc<Config>,

    progress: Arc<ProgressEngine>,

    md5s: Arc<PieceMd5s>,

}

// What is left to do once the cache has been reported.
pub enum Resume {

    // Fetch the origin from this piece on, the md5 covers the pieces before it.
    Fetch {
        start_piece: i32,
        file_md5: Option<Md5>,
    },

    // The cache holds the whole file.
    Done(TaskUpdate),

}

impl PieceReporter {

    pub fn new(config: Arc<Config>, progress: Arc<ProgressEngine>, md5s: Arc<PieceMd5s>) -> Self {
        Self { config, progress, md5s }
    }

    pub fn report_piece(&self, task_id: &str, piece_num: i32, md5: String) -> Result<()> {
        self.md5s.set(task_id, piece_num, md5);
        self.progress.update_progress(
            task_id,
            &self.config.super_cid(task_id),
            self.config.super_pid(),
            "",
            piece_num,
            PieceStatus::Success,
        )?;
        Ok(())
    }

    pub fn report_pieces(&self, task_id: &str, md5s: &[String]) -> Result<()> {
        for (n, md5) in md5s.iter().enumerate() {
            self.report_piece(task_id, n as i32, md5.clone())?;
        }
        tracing::debug!("reported {} cached pieces of task {}", md5s.len(), task_id);
        Ok(())
    }

}

impl CdnManager {

    pub(super) async fn report_cache(&self, task: &Task, hit: CacheHit, meta: &FileMetaData) -> Result<Resume> {
        match hit {
            CacheHit::Miss => Ok(Resume::Fetch { start_piece: 0, file_md5: None }),
            CacheHit::Partial(scanner) => {
                self.reporter.report_pieces(&task.id, &scanner.piece_md5s)?;
                Ok(Resume::Fetch {
                    start_piece: scanner.piece_count,
                    file_md5: scanner.file_md5,
                })
            },
            CacheHit::Full => {
                match self.report_by_md5s(task, meta).await {
                    Ok(Some(update)) => return Ok(Resume::Done(update)),
                    Ok(None) => {},
                    Err(e) => tracing::debug!("no stored piece md5s for task {}: {}", task.id, e),
                }
                self.report_by_read_file(task, meta).await.map(Resume::Done)
            },
        }
    }

    // Full hit with known md5s, the blob is not read again.
    async fn report_by_md5s(&self, task: &Task, meta: &FileMetaData) -> Result<Option<TaskUpdate>> {
        if meta.real_md5.is_empty() {
            return Ok(None);
        }
        let md5s = match self.md5s.get_all(&task.id) {
            Ok(md5s) if !md5s.is_empty() => md5s,
            _ => self.metas.read_piece_md5s(&task.id, &meta.real_md5).await?,
        };
        if md5s.is_empty() {
            return Ok(None);
        }
        self.reporter.report_pieces(&task.id, &md5s)?;
        Ok(Some(TaskUpdate::success(meta.file_length, &meta.real_md5)))
    }

    async fn report_by_read_file(&self, task: &Task, meta: &FileMetaData) -> Result<TaskUpdate> {
        let mut scanner = PieceScanner::new(true, meta.real_md5.is_empty());
        let mut reader = self.store.open(DOWNLOAD_HOME, &path::download_key(&task.id)).await?;
        scanner.scan(&mut reader).await?;
        self.reporter.report_pieces(&task.id, &scanner.piece_md5s)?;

        let real_md5 = match scanner.file_md5.take() {
            Some(md5) if meta.real_md5.is_empty() => hex::encode(md5.finalize()),
            _ => meta.real_md5.clone(),
        };
        self.metas.update_status(&task.id, true, &real_md5, scanner.file_length).await?;
        self.metas.write_piece_md5s(&task.id, &real_md5, &scanner.piece_md5s).await?;
        tracing::info!("task {} fully cached with {} pieces", task.id, scanner.piece_count);
        Ok(TaskUpdate::success(scanner.file_length, &real_md5))
    }

}
