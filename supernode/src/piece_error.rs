use std::{sync::Arc, time::Duration};
use dashmap::DashMap;
use serde_derive::Deserialize;
use crate::{
    cdn::{CdnManager, Md5Source},
    config::Config,
    error::{Result, SupernodeError},
    gc::GcManager,
    range::piece_num,
    util::{millis, now_millis},
};

// Reports of a task arriving within this window after one was handled are dropped.
const HANDLING_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PieceErrorType {

    // The cached blob is gone.
    FileNotExist,

    // The piece a client downloaded does not hash to what it was told.
    FileMd5NotMatch,

}

// A client failing to use a piece it downloaded.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PieceErrorRequest {

    pub task_id: String,

    pub range: String,

    pub error_type: Option<PieceErrorType>,

    pub expected_md5: String,

    pub real_md5: String,

    pub src_cid: String,

    pub dst_cid: String,

    #[serde(rename = "srcIP")]
    pub src_ip: String,

    #[serde(rename = "dstIP")]
    pub dst_ip: String,

    // Peer that served the piece.
    pub dst_pid: String,

}

// Verifies pieces served by the supernode that clients reported as broken,
// dropping the cache of a task whose blob turns out corrupt.
pub struct PieceErrorManager {

    config: Arc<Config>,

    cdn: Arc<CdnManager>,

    gc: Arc<GcManager>,

    // Millis each task was last handled at.
    handled: DashMap<String, i64>,

}

impl PieceErrorManager {

    pub fn new(config: Arc<Config>, cdn: Arc<CdnManager>, gc: Arc<GcManager>) -> Self {
        Self { config, cdn, gc, handled: DashMap::new() }
    }

    pub async fn handle(&self, req: &PieceErrorRequest) -> Result<()> {
        if req.task_id.is_empty() {
            return Err(SupernodeError::EmptyValue("taskId".to_string()));
        }
        if req.dst_pid.is_empty() {
            return Err(SupernodeError::EmptyValue("dstPid".to_string()));
        }
        let Some(error_type) = req.error_type else {
            return Err(SupernodeError::InvalidValue("errorType".to_string()));
        };

        // Other peers repair their own files.
        if !self.config.is_super_pid(&req.dst_pid) {
            return Ok(());
        }
        if !self.start_handling(&req.task_id) {
            tracing::debug!("piece error of task {} handled recently, dropping {:?}", req.task_id, req);
            return Ok(());
        }

        tracing::info!("handling {:?} of task {} range {}", error_type, req.task_id, req.range);
        match error_type {
            PieceErrorType::FileMd5NotMatch => self.md5_not_match(req).await,
            PieceErrorType::FileNotExist => self.file_not_exist(req).await,
        }
        Ok(())
    }

    fn start_handling(&self, task_id: &str) -> bool {
        let now = now_millis();
        let delay = millis(HANDLING_DELAY);
        self.handled.retain(|_, at| now - *at < delay);

        let mut at = self.handled.entry(task_id.to_string()).or_insert(0);
        if now - *at < delay {
            return false;
        }
        *at = now;
        true
    }

    async fn md5_not_match(&self, req: &PieceErrorRequest) {
        let piece = piece_num(&req.range);
        let meta_md5 = self.cdn
            .get_piece_md5(&req.task_id, piece, &req.range, Md5Source::Meta)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("failed to read piece md5 of task {} range {} from meta: {}", req.task_id, req.range, e);
                String::new()
            });
        let file_md5 = self.cdn
            .get_piece_md5(&req.task_id, piece, &req.range, Md5Source::File)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("failed to hash piece of task {} range {} from file: {}", req.task_id, req.range, e);
                String::new()
            });
        tracing::debug!(
            "task {} range {}: meta md5 {}, file md5 {}, expected {}",
            req.task_id, req.range, meta_md5, file_md5, req.expected_md5,
        );

        if file_md5 != md5_part(&meta_md5) && file_md5 != md5_part(&req.expected_md5) {
            tracing::warn!("piece {} of task {} is corrupt in the cache", piece, req.task_id);
            self.gc.gc_task(&req.task_id, true).await;
        }
    }

    async fn file_not_exist(&self, req: &PieceErrorRequest) {
        if !self.cdn.check_file(&req.task_id).await {
            tracing::warn!("cache of task {} is missing", req.task_id);
            self.gc.gc_task(&req.task_id, true).await;
        }
    }

}

// Piece md5 values may carry the framed length after a colon.
fn md5_part(value: &str) -> &str {
    value.split_once(':').map_or(value, |(md5, _)| md5)
}

#[cfg(test)]
mod tests {
    use crate::test_util::{blob_path, register_peer, supernode, task_request, wait_for_cdn, Origin};
    use super::*;

    fn report(task_id: &str, error_type: PieceErrorType, dst_pid: &str) -> PieceErrorRequest {
        PieceErrorRequest {
            task_id: task_id.to_string(),
            range: "0-4194303".to_string(),
            error_type: Some(error_type),
            dst_pid: dst_pid.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_md5_part() {
        assert_eq!(md5_part("abc:16"), "abc");
        assert_eq!(md5_part("abc"), "abc");
        assert_eq!(md5_part(""), "");
    }

    #[tokio::test]
    async fn test_corrupt_blob_is_collected() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::TempDir::new()?;
        let node = supernode(dir.path(), |_| {})?;
        let origin = Origin::start(b"hello world".to_vec()).await?;
        let pid = register_peer(&node, "10.0.0.1")?;
        let task_id = node.tasks.register(&task_request(&origin.url("/file"), "client-a", &pid)).await?.id;
        wait_for_cdn(&node, &task_id).await?;
        let super_pid = node.config.super_pid().to_string();

        std::fs::write(blob_path(dir.path(), &task_id), b"not the framed file")?;

        // Pieces of other peers are left alone.
        node.piece_errors.handle(&report(&task_id, PieceErrorType::FileMd5NotMatch, &pid)).await?;
        assert!(node.tasks.contains(&task_id));

        node.piece_errors.handle(&report(&task_id, PieceErrorType::FileMd5NotMatch, &super_pid)).await?;
        assert!(!node.tasks.contains(&task_id));
        assert!(!node.cdn.check_file(&task_id).await);
        assert!(!blob_path(dir.path(), &task_id).exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_intact_blob_is_kept() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::TempDir::new()?;
        let node = supernode(dir.path(), |_| {})?;
        let origin = Origin::start(b"hello world".to_vec()).await?;
        let pid = register_peer(&node, "10.0.0.1")?;
        let task_id = node.tasks.register(&task_request(&origin.url("/file"), "client-a", &pid)).await?.id;
        wait_for_cdn(&node, &task_id).await?;
        let super_pid = node.config.super_pid().to_string();

        let mut req = report(&task_id, PieceErrorType::FileMd5NotMatch, &super_pid);
        req.expected_md5 = "0".repeat(32);
        node.piece_errors.handle(&req).await?;
        assert!(node.tasks.contains(&task_id));
        assert!(node.cdn.check_file(&task_id).await);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_blob_within_window() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::TempDir::new()?;
        let node = supernode(dir.path(), |_| {})?;
        let origin = Origin::start(b"hello world".to_vec()).await?;
        let pid = register_peer(&node, "10.0.0.1")?;
        let task_id = node.tasks.register(&task_request(&origin.url("/file"), "client-a", &pid)).await?.id;
        wait_for_cdn(&node, &task_id).await?;
        let super_pid = node.config.super_pid().to_string();

        let req = report(&task_id, PieceErrorType::FileNotExist, &super_pid);
        node.piece_errors.handle(&req).await?;
        assert!(node.tasks.contains(&task_id));

        // A second report right after the first is dropped.
        std::fs::remove_file(blob_path(dir.path(), &task_id))?;
        node.piece_errors.handle(&req).await?;
        assert!(node.tasks.contains(&task_id));
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_reports() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::TempDir::new()?;
        let node = supernode(dir.path(), |_| {})?;
        let manager = &node.piece_errors;

        let mut req = report("t", PieceErrorType::FileMd5NotMatch, "");
        assert!(matches!(manager.handle(&req).await, Err(SupernodeError::EmptyValue(_))));
        req.dst_pid = "peer".to_string();
        req.error_type = None;
        assert!(matches!(manager.handle(&req).await, Err(SupernodeError::InvalidValue(_))));
        req.task_id.clear();
        assert!(matches!(manager.handle(&req).await, Err(SupernodeError::EmptyValue(_))));
        Ok(())
    }
}
