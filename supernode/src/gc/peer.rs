use crate::util::{millis, now_millis};
use super::GcManager;

impl GcManager {

    // Collects peers that reported themselves down longer than the gc delay ago.
    pub(super) async fn gc_peers(&self) -> usize {
        let peer_ids = self.peers.all_peer_ids();
        let delay = millis(self.config.peer_gc_delay);
        let mut removed = 0;

        for peer_id in &peer_ids {
            if self.config.is_super_pid(peer_id) {
                continue;
            }
            let state = match self.progress.peer_state(peer_id) {
                Ok(state) => state,
                Err(e) => {
                    tracing::warn!("gc peers: no state for peer {}: {}", peer_id, e);
                    self.gc_peer(peer_id).await;
                    continue;
                },
            };
            let down_since = state.service_down_time();
            if down_since == 0 || now_millis() - down_since < delay {
                continue;
            }
            self.gc_peer(peer_id).await;
            removed += 1;
        }
        tracing::info!("gc peers: removed {}, {} remain", removed, peer_ids.len() - removed);
        removed
    }

    pub async fn gc_peer(&self, peer_id: &str) {
        tracing::info!("gc peer {}", peer_id);
        let _guard = self.locks.write(peer_id).await;

        tokio::join!(
            async {
                for (cid, task_id) in self.dfget_tasks.cids_and_tasks_by_peer(peer_id) {
                    self.progress.delete_cid(&cid);
                    if let Err(e) = self.dfget_tasks.delete(&cid, &task_id) {
                        tracing::warn!("gc peer {}: failed to delete dfget task of client {}: {}", peer_id, cid, e);
                    }
                }
            },
            async {
                self.progress.delete_peer_id(peer_id);
                if let Err(e) = self.peers.deregister(peer_id) {
                    tracing::error!("gc peer {}: {}", peer_id, e);
                }
            },
        );
    }

}
