use crate::util::{millis, now_millis};
use super::GcManager;

impl GcManager {

    // Collects every task not accessed within the expire time, returns how
    // many were collected.
    pub(super) async fn gc_tasks(&self) -> usize {
        let access_times = self.tasks.access_times();
        let total = access_times.len();
        let expire = millis(self.config.task_expire_time);
        let now = now_millis();

        let mut removed = 0;
        for (task_id, access_time) in access_times {
            if now - access_time < expire {
                continue;
            }
            self.gc_task(&task_id, false).await;
            removed += 1;
        }
        tracing::info!("gc tasks: removed {}, {} remain", removed, total - removed);
        removed
    }

    // Drops the task with its client sessions and progress. With `full`
    // the cached files go too.
    pub async fn gc_task(&self, task_id: &str, full: bool) {
        tracing::info!("gc task {}", task_id);
        let _guard = self.locks.write(task_id).await;

        tokio::join!(
            async { self.gc_cids_by_task(task_id) },
            async {
                if let Err(e) = self.cdn.delete(task_id, full).await {
                    tracing::error!("failed to gc cdn of task {} (full: {}): {}", task_id, full, e);
                }
            },
            async { self.gc_task_record(task_id) },
        );
    }

    fn gc_cids_by_task(&self, task_id: &str) {
        for cid in self.dfget_tasks.cids_by_task(task_id) {
            match self.dfget_tasks.get(&cid, task_id) {
                Ok(dfget_task) => {
                    // The peer is done with the task, it goes once it stays down.
                    if let Err(e) = self.progress.update_peer_service_down(&dfget_task.peer_id) {
                        tracing::debug!("peer {} not marked down: {}", dfget_task.peer_id, e);
                    }
                },
                Err(e) => tracing::warn!("gc task {}: no dfget task for client {}: {}", task_id, cid, e),
            }
            self.progress.delete_cid(&cid);
            if let Err(e) = self.dfget_tasks.delete(&cid, task_id) {
                tracing::warn!("gc task {}: failed to delete dfget task of client {}: {}", task_id, cid, e);
            }
        }
    }

    fn gc_task_record(&self, task_id: &str) {
        let piece_total = match self.tasks.get(task_id) {
            Ok(task) => task.piece_total,
            Err(e) => {
                tracing::error!("gc task {}: {}", task_id, e);
                0
            },
        };
        if let Err(e) = self.progress.delete_task_id(task_id, piece_total) {
            tracing::error!("failed to gc progress of task {}: {}", task_id, e);
        }
        self.tasks.delete(task_id);
    }

}
