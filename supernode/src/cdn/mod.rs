use std::{collections::HashSet, sync::Arc};
use md5::{Digest, Md5};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::Instrument;
use crate::{
    config::{Config, DOWNLOAD_HOME, PIECE_WRAP_SIZE},
    error::SupernodeError,
    lock_pool::LockPool,
    origin::OriginClient,
    progress::ProgressEngine,
    range::parse_piece_index,
    store::Store,
    task::{CdnStatus, Task, TaskUpdate},
    util::{millis, now_millis},
};

mod detector;
mod downloader;
mod limit_reader;
mod meta;
mod path;
mod piece_md5;
mod reader;
mod reporter;
mod writer;

pub use limit_reader::{SharedBucket, TokenBucket};
pub use meta::FileMetaData;
pub use path::http_path;
pub use writer::{frame_piece, piece_header};

use limit_reader::LimitReader;
use meta::MetaStore;
use piece_md5::PieceMd5s;
use reporter::{PieceReporter, Resume};
use writer::PieceWriter;

#[derive(thiserror::Error, Debug)]
pub enum CdnError {

    // Failures talking to the origin.
    #[error("source error: {0}")]
    Source(String),

    #[error("file md5 not match, expected {expected} real {real}")]
    Md5NotMatch {
        expected: String,
        real: String,
    },

    #[error("file length not match, expected {expected} real {real}")]
    LengthNotMatch {
        expected: i64,
        real: i64,
    },

    #[error("invalid piece: {0}")]
    InvalidPiece(String),

    #[error("invalid piece md5 file: {0}")]
    InvalidMd5File(String),

    // Writer pool failures.
    #[error("writer error: {0}")]
    Worker(String),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] SupernodeError),

}

impl CdnError {

    // Status a task ends in when its pipeline fails with this error.
    pub fn cdn_status(&self) -> CdnStatus {
        match self {
            CdnError::Source(_) => CdnStatus::SourceError,
            _ => CdnStatus::Failed,
        }
    }

}

impl From<tokio::task::JoinError> for CdnError {
    fn from(e: tokio::task::JoinError) -> Self {
        CdnError::Worker(e.to_string())
    }
}

impl From<CdnError> for SupernodeError {
    fn from(e: CdnError) -> Self {
        match e {
            CdnError::Store(e) => e,
            CdnError::IoError(e) => SupernodeError::IoError(e),
            CdnError::InvalidPiece(msg) | CdnError::InvalidMd5File(msg) => SupernodeError::InvalidValue(msg),
            CdnError::Source(msg) => SupernodeError::UrlNotReachable(msg),
            e @ (CdnError::Md5NotMatch { .. } | CdnError::LengthNotMatch { .. }) => SupernodeError::CdnFail(e.to_string()),
            CdnError::Worker(msg) => SupernodeError::SystemError(msg),
        }
    }
}

type Result<T> = std::result::Result<T, CdnError>;

// Where a piece md5 is looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Md5Source {

    // Memory.
    #[default]
    Default,

    Memory,

    // The `.md5` file next to the blob.
    Meta,

    // Computed from the framed piece in the blob.
    File,

}

// Pulls origin files into the local cache as framed pieces and keeps
// their metadata.
pub struct CdnManager {

    config: Arc<Config>,

    store: Store,

    // One pipeline per task at a time.
    locks: LockPool,

    metas: MetaStore,

    md5s: Arc<PieceMd5s>,

    reporter: PieceReporter,

    writer: PieceWriter,

    origin: OriginClient,

    // Shared by every origin download.
    limiter: SharedBucket,

}

impl CdnManager {

    pub fn new(config: Arc<Config>, store: Store, progress: Arc<ProgressEngine>, origin: OriginClient) -> Self {
        let md5s = Arc::new(PieceMd5s::new());
        let reporter = PieceReporter::new(config.clone(), progress, md5s.clone());
        let writer = PieceWriter::new(store.clone(), reporter.clone(), config.cdn_writer_routine_limit);
        let limiter = TokenBucket::shared(config.origin_bandwidth());
        Self {
            metas: MetaStore::new(store.clone()),
            locks: LockPool::new(),
            store,
            md5s,
            reporter,
            writer,
            origin,
            limiter,
            config,
        }
    }

    // Runs the whole pipeline for the task: cache detection, origin fetch,
    // piece writing and finalisation. Failures end in a FAILED or
    // SOURCE_ERROR update.
    pub async fn trigger_cdn(&self, task: &Task) -> TaskUpdate {
        let _guard = self.locks.write(&task.id).await;
        let span = tracing::info_span!("cdn", task = %task.id);
        match self.run(task).instrument(span).await {
            Ok(update) => update,
            Err(e) => {
                tracing::error!("cdn of task {} failed: {}", task.id, e);
                TaskUpdate::status(e.cdn_status())
            },
        }
    }

    async fn run(&self, task: &Task) -> Result<TaskUpdate> {
        let http_file_length = match task.http_file_length {
            0 => -1,
            n => n,
        };

        let (hit, meta) = self.detect_cache(task).await?;
        let (start_piece, file_md5) = match self.report_cache(task, hit, &meta).await? {
            Resume::Done(update) => {
                tracing::info!("cache full hit for task {}", task.id);
                return Ok(update);
            },
            Resume::Fetch { start_piece, file_md5 } => (start_piece, file_md5),
        };

        let piece_cont_size = task.piece_size - PIECE_WRAP_SIZE as i32;
        let resp = self.download(task, start_piece, http_file_length, piece_cont_size).await?;

        let buckets = vec![self.limiter.clone(), TokenBucket::shared(self.config.link_limit)];
        let mut reader = LimitReader::new(Box::pin(resp.bytes_stream()), buckets, file_md5);
        let written = match self.writer.write(task, &mut reader, start_piece, http_file_length).await {
            Ok(written) => written,
            Err(e) => {
                self.finish_failed(task).await;
                return Err(e);
            },
        };
        tracing::debug!(
            "task {} wrote {} pieces, {} framed bytes",
            task.id, written.piece_count, written.real_file_length,
        );
        self.handle_result(task, http_file_length, written).await
    }

    async fn handle_result(&self, task: &Task, http_file_length: i64, written: writer::WriteResult) -> Result<TaskUpdate> {
        let check = if !task.md5.is_empty() && task.md5 != written.file_md5 {
            Err(CdnError::Md5NotMatch {
                expected: task.md5.clone(),
                real: written.file_md5.clone(),
            })
        } else if http_file_length >= 0 && http_file_length != written.real_http_file_length {
            Err(CdnError::LengthNotMatch {
                expected: http_file_length,
                real: written.real_http_file_length,
            })
        } else {
            Ok(())
        };
        if let Err(e) = check {
            self.finish_failed(task).await;
            return Err(e);
        }

        self.metas.update_status(&task.id, true, &written.file_md5, written.real_file_length).await?;
        let piece_md5s = self.md5s.get_all(&task.id)?;
        self.metas.write_piece_md5s(&task.id, &written.file_md5, &piece_md5s).await?;
        tracing::info!(
            "task {} cached, file length {} md5 {}",
            task.id, written.real_file_length, written.file_md5,
        );
        Ok(TaskUpdate::success(written.real_file_length, &written.file_md5))
    }

    async fn finish_failed(&self, task: &Task) {
        if let Err(e) = self.metas.update_status(&task.id, false, "", 0).await {
            tracing::error!("failed to mark task {} failed in meta: {}", task.id, e);
        }
    }

    pub fn get_http_path(&self, task_id: &str) -> String {
        http_path(task_id)
    }

    pub async fn get_piece_md5(
        &self,
        task_id: &str,
        piece_num: i32,
        piece_range: &str,
        source: Md5Source,
    ) -> crate::error::Result<String> {
        match source {
            Md5Source::Default | Md5Source::Memory => Ok(self.md5s.get(task_id, piece_num)?),
            Md5Source::Meta => {
                let meta = self.metas.read(task_id).await?;
                let md5s = self.metas.read_piece_md5s(task_id, &meta.real_md5).await?;
                usize::try_from(piece_num)
                    .ok()
                    .and_then(|n| md5s.get(n).cloned())
                    .ok_or_else(|| SupernodeError::DataNotFound(format!(
                        "piece md5 of task {} piece {}", task_id, piece_num,
                    )))
            },
            Md5Source::File => {
                let (start, end) = parse_piece_index(piece_range)?;
                let mut reader = self.store.open(DOWNLOAD_HOME, &path::download_key(task_id)).await?;
                reader.seek(std::io::SeekFrom::Start(start as u64)).await?;
                // The last piece ends with the file, short of the nominal range.
                let mut framed = Vec::new();
                reader.take((end - start + 1) as u64).read_to_end(&mut framed).await?;
                Ok(hex::encode(Md5::digest(&framed)))
            },
        }
    }

    // Whether the blob of the task exists.
    pub async fn check_file(&self, task_id: &str) -> bool {
        self.store.stat(DOWNLOAD_HOME, &path::download_key(task_id)).await.is_ok()
    }

    // Drops the in-memory piece md5s, and with `force` every file of the task.
    pub async fn delete(&self, task_id: &str, force: bool) -> crate::error::Result<()> {
        self.md5s.remove(task_id);
        if !force {
            return Ok(());
        }
        let _guard = self.locks.write(task_id).await;
        Ok(self.delete_task_files(task_id).await?)
    }

    async fn delete_task_files(&self, task_id: &str) -> Result<()> {
        for key in [path::meta_key(task_id), path::md5_key(task_id), path::download_key(task_id)] {
            match self.store.remove(DOWNLOAD_HOME, &key).await {
                Err(e) if !e.is_data_not_found() => return Err(e.into()),
                _ => {},
            }
        }
        // Other tasks may share the directory.
        let _ = self.store.remove(DOWNLOAD_HOME, &path::parent_key(task_id)).await;
        Ok(())
    }

    // Cached tasks disk gc may remove, most removable first. Empty while
    // enough disk is free.
    pub async fn get_gc_task_ids<F>(&self, is_alive: F) -> crate::error::Result<Vec<String>>
    where
        F: Fn(&str) -> bool,
    {
        let free = self.store.available_space().await?;
        if free > self.config.young_gc_threshold {
            return Ok(Vec::new());
        }
        let full = free <= self.config.full_gc_threshold;
        tracing::debug!("disk gc candidates with {} bytes free, full: {}", free, full);

        let now = now_millis();
        let threshold = millis(self.config.interval_threshold);
        let mut seen = HashSet::new();
        let mut all = Vec::new();
        let mut gap_tasks: Vec<(i64, String)> = Vec::new();
        let mut interval_tasks: Vec<(u64, String)> = Vec::new();

        for info in self.store.walk(DOWNLOAD_HOME).await? {
            let Some(task_id) = path::task_id_of(&info.key) else {
                continue;
            };
            if !seen.insert(task_id.to_string()) || is_alive(task_id) {
                continue;
            }
            if full {
                all.push(task_id.to_string());
                continue;
            }

            let meta = match self.metas.read(task_id).await {
                Ok(meta) => meta,
                Err(e) => {
                    tracing::debug!("no meta for cached task {}: {}", task_id, e);
                    continue;
                },
            };
            let gap = now - meta.access_time;
            if meta.interval > 0 && gap <= meta.interval + threshold {
                match self.store.stat(DOWNLOAD_HOME, &path::download_key(task_id)).await {
                    Ok(blob) => interval_tasks.push((blob.size, task_id.to_string())),
                    Err(e) => tracing::error!("failed to stat cached task {}: {}", task_id, e),
                }
                continue;
            }
            gap_tasks.push((gap, task_id.to_string()));
        }

        if full {
            return Ok(all);
        }
        // Stable sorts keep walk order among equal keys.
        gap_tasks.sort_by_key(|(gap, _)| *gap);
        interval_tasks.sort_by_key(|(size, _)| *size);
        Ok(gap_tasks
            .into_iter()
            .map(|(_, id)| id)
            .chain(interval_tasks.into_iter().map(|(_, id)| id))
            .collect())
    }

}
