use std::sync::Arc;
use bytes::{Bytes, BytesMut};
use futures::Stream;
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinSet,
};
use tracing::Instrument;
use crate::{
    config::{DOWNLOAD_HOME, PIECE_TAIL_CHAR, PIECE_WRAP_SIZE},
    store::Store,
    task::Task,
    util::md5_hex,
};
use super::{
    limit_reader::LimitReader,
    path,
    piece_md5::piece_md5_value,
    reporter::PieceReporter,
    CdnError,
    Result,
};

// Piece cut from the origin body, waiting to be framed and written.
struct PieceJob {

    piece_num: i32,

    content: Bytes,

}

// Outcome of writing an origin body into the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResult {

    // Framed length of the blob, cached pieces included.
    pub real_file_length: i64,

    // Origin bytes the blob covers, cached pieces included.
    pub real_http_file_length: i64,

    pub piece_count: i32,

    // Md5 of the whole origin file.
    pub file_md5: String,

}

// 4 byte big endian header: high 8 bits from the piece size, low 24 the data size.
pub fn piece_header(piece_size: i32, data_size: usize) -> [u8; 4] {
    let header = ((piece_size as u32 >> 4) << 24) | (data_size as u32 & 0x00ff_ffff);
    header.to_be_bytes()
}

// Header, content and trailer of one piece.
pub fn frame_piece(piece_size: i32, content: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(content.len() + PIECE_WRAP_SIZE);
    framed.extend_from_slice(&piece_header(piece_size, content.len()));
    framed.extend_from_slice(content);
    framed.push(PIECE_TAIL_CHAR);
    framed
}

// Writers to start for a file of `http_file_length` bytes.
pub fn routine_count(http_file_length: i64, piece_size: i32, limit: usize) -> usize {
    let limit = limit.max(1);
    let piece_cont = piece_size as i64 - PIECE_WRAP_SIZE as i64;
    if http_file_length < 0 || piece_cont <= 0 {
        return limit;
    }
    if http_file_length == 0 {
        return 1;
    }
    let pieces = (http_file_length + piece_cont - 1) / piece_cont;
    (pieces.max(1) as usize).min(limit)
}

// Cuts an origin body into pieces and writes them framed into the blob
// with a pool of writers, reporting every written piece.
pub struct PieceWriter {

    store: Store,

    reporter: PieceReporter,

    routine_limit: usize,

}

impl PieceWriter {

    pub fn new(store: Store, reporter: PieceReporter, routine_limit: usize) -> Self {
        Self { store, reporter, routine_limit }
    }

    pub async fn write<S, E>(
        &self,
        task: &Task,
        reader: &mut LimitReader<S>,
        start_piece: i32,
        http_file_length: i64,
    ) -> Result<WriteResult>
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
        E: std::fmt::Display,
    {
        let piece_size = task.piece_size;
        let piece_cont = usize::try_from(piece_size - PIECE_WRAP_SIZE as i32)
            .ok()
            .filter(|c| *c > 0)
            .ok_or_else(|| CdnError::InvalidPiece(format!("piece size {} is too small", piece_size)))?;

        let routines = routine_count(http_file_length, piece_size, self.routine_limit);
        let (job_tx, job_rx) = mpsc::channel::<PieceJob>(routines * 2);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let mut workers = JoinSet::new();
        for id in 0..routines {
            workers.spawn(self.worker(task, job_rx.clone()).instrument(tracing::debug_span!("writer", id)));
        }
        drop(job_rx);

        let mut piece_num = start_piece;
        let mut content_len = 0i64;
        let mut framed_len = 0i64;
        let produced: Result<()> = async {
            let mut buf = BytesMut::with_capacity(piece_cont);
            while let Some(chunk) = reader.next_chunk().await? {
                let mut chunk = &chunk[..];
                while !chunk.is_empty() {
                    let take = (piece_cont - buf.len()).min(chunk.len());
                    buf.extend_from_slice(&chunk[..take]);
                    chunk = &chunk[take..];
                    if buf.len() == piece_cont {
                        let content = buf.split().freeze();
                        content_len += content.len() as i64;
                        framed_len += (content.len() + PIECE_WRAP_SIZE) as i64;
                        send(&job_tx, PieceJob { piece_num, content }).await?;
                        piece_num += 1;
                    }
                }
            }
            // An empty file still gets one empty piece.
            if !buf.is_empty() || piece_num == 0 {
                let content = buf.split().freeze();
                content_len += content.len() as i64;
                framed_len += (content.len() + PIECE_WRAP_SIZE) as i64;
                send(&job_tx, PieceJob { piece_num, content }).await?;
                piece_num += 1;
            }
            Ok(())
        }.await;
        drop(job_tx);

        let mut written: Result<()> = Ok(());
        while let Some(res) = workers.join_next().await {
            let res = res.map_err(CdnError::from).and_then(|r| r);
            if let (Err(e), true) = (res, written.is_ok()) {
                written = Err(e);
            }
        }
        // A broken origin body outranks the writer that saw the channel close.
        produced?;
        written?;

        Ok(WriteResult {
            real_file_length: start_piece as i64 * piece_size as i64 + framed_len,
            real_http_file_length: start_piece as i64 * piece_cont as i64 + content_len,
            piece_count: piece_num,
            file_md5: reader.md5(),
        })
    }

    fn worker(
        &self,
        task: &Task,
        jobs: Arc<Mutex<mpsc::Receiver<PieceJob>>>,
    ) -> impl std::future::Future<Output = Result<()>> + Send + 'static {
        let store = self.store.clone();
        let reporter = self.reporter.clone();
        let task_id = task.id.clone();
        let piece_size = task.piece_size;
        let key = path::download_key(&task.id);
        async move {
            loop {
                let job = jobs.lock().await.recv().await;
                let Some(job) = job else {
                    break;
                };
                let framed = frame_piece(piece_size, &job.content);
                let offset = job.piece_num as u64 * piece_size as u64;
                store.write_at(DOWNLOAD_HOME, &key, offset, &framed).await?;

                let md5 = piece_md5_value(&md5_hex(&framed), framed.len());
                tracing::trace!("wrote piece {} of task {} with md5 {}", job.piece_num, task_id, md5);
                reporter.report_piece(&task_id, job.piece_num, md5)?;
            }
            Ok(())
        }
    }

}

async fn send(tx: &mpsc::Sender<PieceJob>, job: PieceJob) -> Result<()> {
    tx.send(job)
        .await
        .map_err(|e| CdnError::Worker(format!("writers stopped before piece {}", e.0.piece_num)))
}
