use std::{collections::HashMap, sync::{atomic::Ordering, Arc}};
use rand::seq::SliceRandom;
use crate::{
    config::Config,
    error::{Result, SupernodeError},
    progress::{PieceSelector, PieceStatus, ProgressEngine},
};

// A piece the client should pull next and the peer to pull it from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PieceResult {

    pub task_id: String,

    pub piece_num: i32,

    pub dst_pid: String,

}

// Picks peers for the pieces a client is missing.
#[derive(Debug)]
pub struct Scheduler {

    config: Arc<Config>,

    progress: Arc<ProgressEngine>,

}

// Median of the running pieces, 0 when nothing runs.
fn center_piece(running: &[i32]) -> i32 {
    if running.is_empty() {
        return 0;
    }
    let mut sorted = running.to_vec();
    sorted.sort_unstable();
    sorted[sorted.len() / 2]
}

impl Scheduler {

    pub fn new(config: Arc<Config>, progress: Arc<ProgressEngine>) -> Self {
        Self { config, progress }
    }

    // Chooses up to PeerDownLimit pieces for the client, each paired with one
    // peer. Chosen pieces are marked RUNNING for the client.
    #[tracing::instrument(skip(self))]
    pub fn schedule(&self, task_id: &str, cid: &str, peer_id: &str) -> Result<Vec<PieceResult>> {
        let available = self.progress.get_piece_progress_by_cid(task_id, cid, PieceSelector::Available)?;
        if available.is_empty() {
            return Err(SupernodeError::PeerWait(format!("taskID {} clientID {}", task_id, cid)));
        }
        let running = self.progress.get_piece_progress_by_cid(task_id, cid, PieceSelector::Running)?;
        tracing::debug!("available pieces {:?}, running pieces {:?}", available, running);

        let down_limit = usize::try_from(self.config.peer_down_limit).unwrap_or_default();
        if running.len() >= down_limit {
            return Err(SupernodeError::PeerContinue(format!("taskID {} clientID {}", task_id, cid)));
        }

        let pieces = self.sort(task_id, available, &running)?;
        self.piece_results(task_id, cid, peer_id, &pieces, running.len())
    }

    // Closest to the center first, rarer pieces first among equal distances.
    // Full ties keep the random order of the shuffle.
    fn sort(&self, task_id: &str, mut pieces: Vec<i32>, running: &[i32]) -> Result<Vec<i32>> {
        let mut holders = HashMap::with_capacity(pieces.len());
        for piece in &pieces {
            let count = self.progress.get_peer_ids_by_piece_num(task_id, *piece)?.len();
            holders.insert(*piece, count);
        }
        let center = center_piece(running);
        pieces.shuffle(&mut rand::thread_rng());
        pieces.sort_by_key(|p| ((p - center).abs(), holders.get(p).copied().unwrap_or_default()));
        Ok(pieces)
    }

    fn piece_results(
        &self,
        task_id: &str,
        cid: &str,
        src_pid: &str,
        pieces: &[i32],
        mut running_count: usize,
    ) -> Result<Vec<PieceResult>> {
        let src_state = self.progress.peer_state(src_pid)?;
        let use_supernode = src_state.client_error_count() > self.config.failure_count_limit;
        if use_supernode {
            tracing::warn!(
                "peer {} failed {} times as a client, serving it from the supernode",
                src_pid, src_state.client_error_count(),
            );
        }

        let down_limit = usize::try_from(self.config.peer_down_limit).unwrap_or_default();
        let mut results = Vec::new();
        for &piece in pieces {
            let dst_pid = if use_supernode {
                self.config.super_pid().to_string()
            } else {
                self.try_get_pid(task_id, piece, src_pid)?
            };
            if dst_pid.is_empty() {
                continue;
            }

            let is_super = self.config.is_super_pid(&dst_pid);
            if is_super && !self.progress.update_super_load(task_id, 1, self.config.peer_down_limit) {
                tracing::debug!("supernode is busy with task {}", task_id);
                continue;
            }

            if let Err(e) = self.progress.update_client_progress(task_id, cid, &dst_pid, piece, PieceStatus::Running) {
                tracing::warn!("failed to mark piece {} running for client {}: {}", piece, cid, e);
                self.release(task_id, &dst_pid, is_super);
                continue;
            }

            results.push(PieceResult {
                task_id: task_id.to_string(),
                piece_num: piece,
                dst_pid,
            });
            running_count += 1;
            if running_count >= down_limit {
                break;
            }
        }
        Ok(results)
    }

    // A holder of the piece able to serve src, the supernode when there is none.
    // The returned peer has an upload slot reserved.
    fn try_get_pid(&self, task_id: &str, piece: i32, src_pid: &str) -> Result<String> {
        let mut holders = self.progress.get_peer_ids_by_piece_num(task_id, piece)?;
        holders.shuffle(&mut rand::thread_rng());
        let black_info = self.progress.get_black_info(src_pid);

        for pid in holders {
            if pid == src_pid {
                continue;
            }
            let state = match self.progress.peer_state(&pid) {
                Ok(state) => state,
                Err(_) => {
                    tracing::warn!("peer {} has no state, dropping it from piece {}", pid, piece);
                    self.forget_holder(task_id, piece, &pid);
                    continue;
                },
            };
            if state.is_down() {
                tracing::warn!("peer {} is offline, dropping it from piece {}", pid, piece);
                self.forget_holder(task_id, piece, &pid);
                continue;
            }
            if state.service_error_count() >= self.config.elimination_limit {
                tracing::warn!(
                    "peer {} eliminated after {} upload errors",
                    pid, state.service_error_count(),
                );
                self.forget_holder(task_id, piece, &pid);
                continue;
            }
            if black_info.get(&pid).copied().unwrap_or_default() >= self.config.failure_count_limit {
                continue;
            }

            if state.producer_load.fetch_add(1, Ordering::SeqCst) < self.config.peer_up_limit {
                return Ok(pid);
            }
            state.producer_load.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(self.config.super_pid().to_string())
    }

    fn forget_holder(&self, task_id: &str, piece: i32, pid: &str) {
        if let Err(e) = self.progress.delete_peer_id_by_piece_num(task_id, piece, pid) {
            tracing::warn!("failed to drop peer {} from piece {}: {}", pid, piece, e);
        }
    }

    // Undoes a scheduled piece the client will never be told about.
    pub fn cancel(&self, cid: &str, result: &PieceResult) {
        let is_super = self.config.is_super_pid(&result.dst_pid);
        if let Err(e) = self.progress.update_client_progress(
            &result.task_id, cid, "", result.piece_num, PieceStatus::Waiting,
        ) {
            tracing::warn!("failed to reset piece {} of client {}: {}", result.piece_num, cid, e);
        }
        self.release(&result.task_id, &result.dst_pid, is_super);
    }

    // Gives back what try_get_pid or the super load reserved.
    fn release(&self, task_id: &str, dst_pid: &str, is_super: bool) {
        if is_super {
            self.progress.update_super_load(task_id, -1, 0);
        } else if let Ok(state) = self.progress.peer_state(dst_pid) {
            if state.producer_load.fetch_sub(1, Ordering::SeqCst) <= 0 {
                state.producer_load.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use super::*;

    const TASK: &str = "task";
    const SUPER_PID: &str = "supernode-10.0.0.1-1";

    // Supernode holding `pieces` pieces; peers 0..peers registered, peer i holding piece i.
    fn setup(pieces: i32, peers: i32) -> Result<(Scheduler, Arc<ProgressEngine>)> {
        let mut config = Config::default();
        config.set_cid_prefix(Ipv4Addr::new(10, 0, 0, 1));
        config.set_super_pid(SUPER_PID.to_string());
        let config = Arc::new(config);
        let progress = Arc::new(ProgressEngine::new(config.clone()));

        let super_cid = config.super_cid(TASK);
        progress.init_progress(TASK, SUPER_PID, &super_cid)?;
        for n in 0..pieces {
            progress.update_progress(TASK, &super_cid, SUPER_PID, "", n, PieceStatus::Success)?;
        }
        for i in 0..peers {
            let (pid, cid) = (format!("peer{}", i), format!("cid{}", i));
            progress.init_progress(TASK, &pid, &cid)?;
            progress.update_progress(TASK, &cid, &pid, "", i, PieceStatus::Success)?;
        }
        progress.init_progress(TASK, "me", "mycid")?;
        Ok((Scheduler::new(config, progress.clone()), progress))
    }

    #[test]
    fn test_center_piece() {
        assert_eq!(center_piece(&[]), 0);
        assert_eq!(center_piece(&[7]), 7);
        assert_eq!(center_piece(&[9, 1, 5]), 5);
        assert_eq!(center_piece(&[1, 2, 3, 10]), 3);
    }

    #[test]
    fn test_selection_size_and_safety() -> Result<()> {
        let (scheduler, progress) = setup(10, 10)?;
        let results = scheduler.schedule(TASK, "mycid", "me")?;
        assert_eq!(results.len(), 4);

        for r in &results {
            assert_ne!(r.dst_pid, "me");
            // Closest to center 0 with one holder each.
            assert_eq!(r.dst_pid, format!("peer{}", r.piece_num));
            assert!(progress.get_peer_ids_by_piece_num(TASK, r.piece_num)?.contains(&r.dst_pid));
            assert_eq!(progress.peer_state(&r.dst_pid)?.producer_load(), 1);
        }
        let mut pieces: Vec<i32> = results.iter().map(|r| r.piece_num).collect();
        pieces.sort();
        assert_eq!(pieces, vec![0, 1, 2, 3]);
        assert_eq!(progress.get_piece_progress_by_cid(TASK, "mycid", PieceSelector::Running)?, pieces);

        // Every download slot taken.
        assert!(matches!(scheduler.schedule(TASK, "mycid", "me"), Err(SupernodeError::PeerContinue(_))));
        Ok(())
    }

    #[test]
    fn test_supernode_fallback_and_load() -> Result<()> {
        let (scheduler, progress) = setup(6, 0)?;
        let results = scheduler.schedule(TASK, "mycid", "me")?;
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.dst_pid == SUPER_PID));
        assert_eq!(progress.super_load(TASK), 4);

        // A second client finds the supernode saturated.
        progress.init_progress(TASK, "other", "othercid")?;
        assert!(scheduler.schedule(TASK, "othercid", "other")?.is_empty());
        Ok(())
    }

    #[test]
    fn test_overloaded_peer_skipped() -> Result<()> {
        let (scheduler, progress) = setup(1, 1)?;
        progress.peer_state("peer0")?.producer_load.store(5, Ordering::SeqCst);
        let results = scheduler.schedule(TASK, "mycid", "me")?;
        assert_eq!(results, vec![PieceResult {
            task_id: TASK.to_string(),
            piece_num: 0,
            dst_pid: SUPER_PID.to_string(),
        }]);
        assert_eq!(progress.peer_state("peer0")?.producer_load(), 5);
        Ok(())
    }

    #[test]
    fn test_blacklist_threshold() -> Result<()> {
        let (scheduler, progress) = setup(2, 1)?;
        for _ in 0..4 {
            progress.update_progress(TASK, "mycid", "me", "peer0", 0, PieceStatus::Failed)?;
        }
        // Four failures are tolerated.
        progress.peer_state("me")?.client_error_count.store(0, Ordering::SeqCst);
        progress.peer_state("peer0")?.service_error_count.store(0, Ordering::SeqCst);
        let results = scheduler.schedule(TASK, "mycid", "me")?;
        assert!(results.iter().any(|r| r.piece_num == 0 && r.dst_pid == "peer0"));

        // The fifth failure blacklists peer0 for this client.
        progress.update_progress(TASK, "mycid", "me", "peer0", 0, PieceStatus::Failed)?;
        progress.update_progress(TASK, "mycid", "me", SUPER_PID, 1, PieceStatus::Failed)?;
        progress.peer_state("peer0")?.service_error_count.store(0, Ordering::SeqCst);
        let results = scheduler.schedule(TASK, "mycid", "me")?;
        assert!(!results.is_empty());
        assert!(results.iter().all(|r| r.dst_pid != "peer0"));
        Ok(())
    }

    #[test]
    fn test_eliminated_and_offline_peers_dropped() -> Result<()> {
        let (scheduler, progress) = setup(2, 2)?;
        progress.peer_state("peer0")?.service_error_count.store(5, Ordering::SeqCst);
        progress.update_peer_service_down("peer1")?;

        let results = scheduler.schedule(TASK, "mycid", "me")?;
        assert!(results.iter().all(|r| r.dst_pid == SUPER_PID));
        assert!(progress.get_peer_ids_by_piece_num(TASK, 0)?.is_empty());
        assert!(progress.get_peer_ids_by_piece_num(TASK, 1)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_client_errors_use_supernode() -> Result<()> {
        let (scheduler, progress) = setup(2, 2)?;
        progress.peer_state("me")?.client_error_count.store(6, Ordering::SeqCst);
        let results = scheduler.schedule(TASK, "mycid", "me")?;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.dst_pid == SUPER_PID));
        Ok(())
    }

    #[test]
    fn test_nothing_available() -> Result<()> {
        let (scheduler, _) = setup(0, 0)?;
        assert!(scheduler.schedule(TASK, "mycid", "me").is_err());
        Ok(())
    }
}
