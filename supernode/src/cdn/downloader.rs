use reqwest::{header, StatusCode};
use crate::{
    origin::parse_http_time,
    range::break_range,
    task::Task,
};
use super::{CdnError, CdnManager, Result};

impl CdnManager {

    // Requests the part of the origin file the cache still misses.
    pub(super) async fn download(
        &self,
        task: &Task,
        start_piece: i32,
        http_file_length: i64,
        piece_cont_size: i32,
    ) -> Result<reqwest::Response> {
        let mut headers = task.headers.clone();

        // Tasks pinning a range never resume, see detect_cache.
        let resp = if start_piece > 0 {
            let range = break_range(start_piece, piece_cont_size, http_file_length)?;
            tracing::info!("task {} resumes from piece {} with range {}", task.id, start_piece, range);
            headers.insert(header::RANGE.to_string(), format!("bytes={}", range));
            self.origin
                .download(&task.raw_url, &headers, |code| code == StatusCode::PARTIAL_CONTENT)
                .await
        } else {
            self.origin
                .download(&task.raw_url, &headers, |code| {
                    code == StatusCode::OK || code == StatusCode::PARTIAL_CONTENT
                })
                .await
        };
        let resp = resp.map_err(|e| CdnError::Source(e.to_string()))?;

        let last_modified = resp.headers()
            .get(header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_http_time)
            .unwrap_or_default();
        let etag = resp.headers()
            .get(header::ETAG)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if let Err(e) = self.metas.update_last_modified_and_etag(&task.id, last_modified, etag).await {
            tracing::error!("failed to update validators of task {}: {}", task.id, e);
        }
        Ok(resp)
    }

}
