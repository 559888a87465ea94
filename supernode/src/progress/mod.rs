use std::{
    collections::{BTreeSet, HashMap},
    sync::{atomic::Ordering, Arc},
    time::Duration,
};
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use crate::{
    config::Config,
    error::{Result, SupernodeError},
    util::now_millis,
};

mod bitset;
mod state;
#[cfg(test)]
mod tests;

pub use bitset::{PieceBitSet, PieceStatus};
pub use state::PeerState;
use state::{ClientState, SuperLoad, SuperState};

// How often the super loads are checked.
const RENEW_INTERVAL: Duration = Duration::from_secs(2);

// Super loads untouched for this long are reset.
const RENEW_DELAY_MS: i64 = 30_000;

// Which pieces of a client to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceSelector {

    // Pieces the client is pulling right now.
    Running,

    // Pieces both the client and the supernode hold.
    Success,

    // Pieces the supernode holds which the client neither has nor is pulling.
    Available,

}

// Tracks which client holds which piece, load and errors of every peer,
// and the failures between pairs of peers.
#[derive(Debug)]
pub struct ProgressEngine {

    config: Arc<Config>,

    // Task id -> pieces in the supernode cache.
    super_progress: DashMap<String, SuperState>,

    // Client id -> pieces of that client.
    client_progress: DashMap<String, ClientState>,

    // Peer id -> counters.
    peer_progress: DashMap<String, Arc<PeerState>>,

    // (task id, piece) -> peers holding the piece.
    piece_progress: DashMap<(String, i32), BTreeSet<String>>,

    // Src peer id -> dst peer id -> failures of src pulling from dst.
    black_list: DashMap<String, HashMap<String, i32>>,

    super_load: DashMap<String, Arc<SuperLoad>>,

}

fn piece_key(task_id: &str, piece_num: i32) -> Result<(String, i32)> {
    if task_id.is_empty() || piece_num < 0 {
        return Err(SupernodeError::InvalidValue(format!(
            "piece progress key with taskID {} and pieceNum {}", task_id, piece_num,
        )));
    }
    Ok((task_id.to_string(), piece_num))
}

fn piece_index(piece_num: i32) -> Result<usize> {
    usize::try_from(piece_num)
        .map_err(|_| SupernodeError::InvalidValue(format!("pieceNum {}", piece_num)))
}

fn non_empty(value: &str, name: &str) -> Result<()> {
    if value.is_empty() {
        return Err(SupernodeError::EmptyValue(name.to_string()));
    }
    Ok(())
}

impl ProgressEngine {

    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            super_progress: DashMap::new(),
            client_progress: DashMap::new(),
            peer_progress: DashMap::new(),
            piece_progress: DashMap::new(),
            black_list: DashMap::new(),
            super_load: DashMap::new(),
        }
    }

    // Creates the progress records of a client, or of the supernode cache when
    // the client id belongs to the supernode. Existing records are kept.
    pub fn init_progress(&self, task_id: &str, peer_id: &str, cid: &str) -> Result<()> {
        non_empty(task_id, "taskID")?;
        non_empty(cid, "clientID")?;
        non_empty(peer_id, "peerID")?;

        if self.config.is_super_cid(cid) {
            self.super_progress.entry(task_id.to_string()).or_default();
            return Ok(());
        }
        self.client_progress.entry(cid.to_string()).or_default();
        self.peer_progress.entry(peer_id.to_string()).or_default();
        Ok(())
    }

    // Records the outcome of a piece transfer from dst to src.
    pub fn update_progress(
        &self,
        task_id: &str,
        src_cid: &str,
        src_pid: &str,
        dst_pid: &str,
        piece_num: i32,
        status: PieceStatus,
    ) -> Result<()> {
        non_empty(task_id, "taskID")?;
        non_empty(src_cid, "srcCID")?;
        non_empty(src_pid, "srcPID")?;

        if status == PieceStatus::Success {
            self.update_piece_progress(task_id, src_pid, piece_num)?;
        }

        if !self.update_client_bits(task_id, src_cid, dst_pid, piece_num, status)? {
            tracing::debug!(
                "piece {} of client {} already succeeded, ignoring {:?}",
                piece_num, src_cid, status,
            );
            return Ok(());
        }

        self.update_peer_progress(task_id, src_pid, dst_pid, piece_num, status)
    }

    // Updates only the bits of a client, used when scheduling a pull.
    pub fn update_client_progress(
        &self,
        task_id: &str,
        cid: &str,
        dst_pid: &str,
        piece_num: i32,
        status: PieceStatus,
    ) -> Result<()> {
        non_empty(task_id, "taskID")?;
        non_empty(cid, "srcCID")?;
        self.update_client_bits(task_id, cid, dst_pid, piece_num, status).map(|_| ())
    }

    fn update_piece_progress(&self, task_id: &str, src_pid: &str, piece_num: i32) -> Result<()> {
        let key = piece_key(task_id, piece_num)?;
        let mut holders = self.piece_progress.entry(key).or_default();
        // The supernode is never offered as a regular holder.
        if !self.config.is_super_pid(src_pid) {
            holders.insert(src_pid.to_string());
        }
        Ok(())
    }

    // Returns false when the piece was already SUCCESS and nothing changed.
    fn update_client_bits(
        &self,
        task_id: &str,
        cid: &str,
        dst_pid: &str,
        piece_num: i32,
        status: PieceStatus,
    ) -> Result<bool> {
        let idx = piece_index(piece_num)?;
        if self.config.is_super_cid(cid) {
            let mut state = self.super_progress
                .get_mut(task_id)
                .ok_or_else(|| SupernodeError::DataNotFound(format!("super progress of {}", task_id)))?;
            return Ok(state.bitset.update(idx, status));
        }

        let mut state = self.client_progress
            .get_mut(cid)
            .ok_or_else(|| SupernodeError::DataNotFound(format!("client progress of {}", cid)))?;
        if status == PieceStatus::Running && !dst_pid.is_empty() {
            state.running.insert(piece_num, dst_pid.to_string());
        } else {
            state.running.remove(&piece_num);
        }
        Ok(state.bitset.update(idx, status))
    }

    fn update_peer_progress(
        &self,
        task_id: &str,
        src_pid: &str,
        dst_pid: &str,
        piece_num: i32,
        status: PieceStatus,
    ) -> Result<()> {
        let dst_state = if dst_pid.is_empty() {
            None
        } else {
            self.peer_state(dst_pid).ok()
        };
        if let Some(dst) = &dst_state {
            if dst.update_producer_load(status == PieceStatus::Running) < 0 {
                tracing::warn!(
                    "producer load of peer {} would drop below zero, task {} piece {}",
                    dst_pid, task_id, piece_num,
                );
            }
        }

        if src_pid.is_empty()
            || dst_pid.is_empty()
            || self.config.is_super_pid(src_pid)
            || self.config.is_super_pid(dst_pid)
        {
            return Ok(());
        }

        let src_state = self.peer_state(src_pid)?;
        match status {
            PieceStatus::Success | PieceStatus::SemiSuccess => {
                src_state.on_success(true);
                if let Some(dst) = &dst_state {
                    dst.on_success(false);
                }
            },
            PieceStatus::Failed => {
                *self.black_list
                    .entry(src_pid.to_string())
                    .or_default()
                    .entry(dst_pid.to_string())
                    .or_insert(0) += 1;
                src_state.on_failure(true);
                if let Some(dst) = &dst_state {
                    dst.on_failure(false);
                }
            },
            _ => {},
        }
        Ok(())
    }

    // Piece numbers of a client matching the selector, ascending.
    pub fn get_piece_progress_by_cid(
        &self,
        task_id: &str,
        cid: &str,
        selector: PieceSelector,
    ) -> Result<Vec<i32>> {
        let (running, client_bits) = {
            let state = self.client_progress
                .get(cid)
                .ok_or_else(|| SupernodeError::DataNotFound(format!("client progress of {}", cid)))?;
            let running: Vec<i32> = state.running.keys().copied().collect();
            (running, state.bitset.clone())
        };
        if selector == PieceSelector::Running {
            return Ok(running);
        }

        let cdn_bits = self.super_progress
            .get(task_id)
            .map(|s| s.bitset.clone())
            .ok_or_else(|| SupernodeError::DataNotFound(format!("super progress of {}", task_id)))?;

        if selector == PieceSelector::Success {
            return Ok(client_bits
                .success_pieces()
                .into_iter()
                .filter(|p| cdn_bits.is_success(*p))
                .filter_map(|p| i32::try_from(p).ok())
                .collect());
        }

        let mut available = BTreeSet::new();
        for (piece, status) in cdn_bits.difference(&client_bits) {
            match status {
                PieceStatus::Success => {
                    available.insert(piece);
                },
                PieceStatus::Failed => {
                    return Err(SupernodeError::CdnFail(format!("pieceNum: {}", piece)));
                },
                _ => {},
            }
        }
        if available.is_empty() {
            return Err(SupernodeError::PeerWait(format!(
                "clientSucCount: {}, cdnSucCount: {}",
                client_bits.success_count(),
                cdn_bits.success_count(),
            )));
        }
        Ok(available
            .into_iter()
            .filter_map(|p| i32::try_from(p).ok())
            .filter(|p| !running.contains(p))
            .collect())
    }

    // Peers known to hold the piece, supernode excluded.
    pub fn get_peer_ids_by_piece_num(&self, task_id: &str, piece_num: i32) -> Result<Vec<String>> {
        let key = piece_key(task_id, piece_num)?;
        Ok(self.piece_progress
            .get(&key)
            .map(|holders| holders.iter().cloned().collect())
            .unwrap_or_default())
    }

    pub fn peer_state(&self, peer_id: &str) -> Result<Arc<PeerState>> {
        self.peer_progress
            .get(peer_id)
            .map(|s| s.value().clone())
            .ok_or_else(|| SupernodeError::DataNotFound(format!("peer progress of {}", peer_id)))
    }

    // Failure counts of src pulling from every dst it had trouble with.
    pub fn get_black_info(&self, src_pid: &str) -> HashMap<String, i32> {
        self.black_list
            .get(src_pid)
            .map(|b| b.value().clone())
            .unwrap_or_default()
    }

    // Marks the peer as down, a peer can only go down once.
    pub fn update_peer_service_down(&self, peer_id: &str) -> Result<()> {
        let state = self.peer_state(peer_id)?;
        let now = now_millis();
        state.service_down_time
            .compare_exchange(0, now, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|_| SupernodeError::InvalidValue(format!("peer {} has been offline", peer_id)))
    }

    // Adds delta to the number of peers pulling the task from the supernode.
    // Returns false, leaving the load unchanged, when the limit would be exceeded.
    pub fn update_super_load(&self, task_id: &str, delta: i32, limit: i32) -> bool {
        let load = self.super_load
            .entry(task_id.to_string())
            .or_insert_with(|| Arc::new(SuperLoad::new(now_millis())))
            .value()
            .clone();
        if load.load.fetch_add(delta, Ordering::SeqCst) + delta > limit && limit > 0 {
            load.load.fetch_sub(delta, Ordering::SeqCst);
            return false;
        }
        load.mod_time.store(now_millis(), Ordering::SeqCst);
        true
    }

    pub fn super_load(&self, task_id: &str) -> i32 {
        self.super_load
            .get(task_id)
            .map(|l| l.load.load(Ordering::SeqCst))
            .unwrap_or_default()
    }

    // Resets super loads which have not changed for a while.
    fn renew_super_load(&self, now: i64) {
        for entry in self.super_load.iter() {
            if now - entry.mod_time.load(Ordering::SeqCst) > RENEW_DELAY_MS {
                entry.load.store(0, Ordering::SeqCst);
            }
        }
    }

    // Spawns the loop resetting stale super loads.
    pub fn spawn_super_load_monitor(self: &Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(RENEW_INTERVAL);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => engine.renew_super_load(now_millis()),
                }
            }
            tracing::debug!("super load monitor stopped");
        }.instrument(tracing::info_span!("super_load")))
    }

    // Drops every record of the task.
    pub fn delete_task_id(&self, task_id: &str, piece_total: i32) -> Result<()> {
        self.super_load.remove(task_id);
        self.super_progress.remove(task_id);
        for piece in 0..piece_total.max(0) {
            let key = piece_key(task_id, piece)?;
            self.piece_progress.remove(&key);
        }
        Ok(())
    }

    pub fn delete_cid(&self, cid: &str) {
        self.client_progress.remove(cid);
    }

    // Drops the peer's counters and blacklist, and best effort the entries
    // other peers hold against it.
    pub fn delete_peer_id(&self, peer_id: &str) {
        self.peer_progress.remove(peer_id);
        self.black_list.remove(peer_id);
        for mut entry in self.black_list.iter_mut() {
            entry.value_mut().remove(peer_id);
        }
    }

    pub fn delete_peer_id_by_piece_num(&self, task_id: &str, piece_num: i32, peer_id: &str) -> Result<()> {
        let key = piece_key(task_id, piece_num)?;
        if let Some(mut holders) = self.piece_progress.get_mut(&key) {
            holders.remove(peer_id);
        }
        Ok(())
    }

}
