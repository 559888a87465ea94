use super::GcManager;

impl GcManager {

    // Removes cached files of tasks no longer registered once disk space
    // runs low.
    pub(super) async fn gc_disk(&self) -> usize {
        let candidates = match self.cdn.get_gc_task_ids(|task_id| self.tasks.contains(task_id)).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::error!("gc disk: failed to list candidates: {}", e);
                return 0;
            },
        };
        if candidates.is_empty() {
            return 0;
        }

        let limit = (candidates.len() * self.config.clean_ratio + 9) / 10;
        let mut removed = 0;
        for task_id in &candidates {
            if removed >= limit {
                break;
            }
            let _guard = self.locks.write(task_id).await;
            // Registered again since the candidates were listed.
            if self.tasks.contains(task_id) {
                continue;
            }
            if let Err(e) = self.cdn.delete(task_id, true).await {
                tracing::error!("gc disk: failed to delete files of task {}: {}", task_id, e);
                continue;
            }
            removed += 1;
        }
        tracing::debug!("gc disk: removed {}, {} remain", removed, candidates.len() - removed);
        removed
    }

}
