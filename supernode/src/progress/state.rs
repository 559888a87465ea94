use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicI32, AtomicI64, Ordering},
};
use super::bitset::PieceBitSet;

// Pieces the supernode cache holds for one task.
#[derive(Debug, Default)]
pub struct SuperState {
    pub bitset: PieceBitSet,
}

// Pieces one client holds, plus the piece -> peer map of its running pulls.
#[derive(Debug, Default)]
pub struct ClientState {

    pub bitset: PieceBitSet,

    pub running: BTreeMap<i32, String>,

}

// Load and error counters of a peer.
#[derive(Debug, Default)]
pub struct PeerState {

    // Uploads the peer is serving right now.
    pub producer_load: AtomicI32,

    // Failed pulls while acting as downloader.
    pub client_error_count: AtomicI32,

    // Failed uploads while acting as uploader.
    pub service_error_count: AtomicI32,

    // Millis since epoch when the peer reported itself down, 0 while up.
    pub service_down_time: AtomicI64,

}

impl PeerState {

    pub fn producer_load(&self) -> i32 {
        self.producer_load.load(Ordering::SeqCst)
    }

    pub fn client_error_count(&self) -> i32 {
        self.client_error_count.load(Ordering::SeqCst)
    }

    pub fn service_error_count(&self) -> i32 {
        self.service_error_count.load(Ordering::SeqCst)
    }

    pub fn service_down_time(&self) -> i64 {
        self.service_down_time.load(Ordering::SeqCst)
    }

    pub fn is_down(&self) -> bool {
        self.service_down_time() > 0
    }

    // RUNNING takes a slot, anything else gives one back.
    pub(super) fn update_producer_load(&self, running: bool) -> i32 {
        if running {
            return self.producer_load.fetch_add(1, Ordering::SeqCst) + 1;
        }
        let load = self.producer_load.fetch_sub(1, Ordering::SeqCst) - 1;
        if load < 0 {
            self.producer_load.fetch_add(1, Ordering::SeqCst);
            return -1;
        }
        load
    }

    pub(super) fn on_success(&self, as_client: bool) {
        if as_client {
            self.client_error_count.store(0, Ordering::SeqCst);
        } else {
            self.service_error_count.store(0, Ordering::SeqCst);
        }
    }

    pub(super) fn on_failure(&self, as_client: bool) {
        if as_client {
            self.client_error_count.fetch_add(1, Ordering::SeqCst);
        } else {
            self.service_error_count.fetch_add(1, Ordering::SeqCst);
        }
    }

}

// Peers pulling pieces of one task straight from the supernode.
#[derive(Debug)]
pub struct SuperLoad {

    pub load: AtomicI32,

    // Millis since epoch of the last accepted change.
    pub mod_time: AtomicI64,

}

impl SuperLoad {
    pub fn new(now: i64) -> Self {
        Self {
            load: AtomicI32::new(0),
            mod_time: AtomicI64::new(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_producer_load_never_negative() {
        let state = PeerState::default();
        assert_eq!(state.update_producer_load(false), -1);
        assert_eq!(state.producer_load(), 0);
        assert_eq!(state.update_producer_load(true), 1);
        assert_eq!(state.update_producer_load(true), 2);
        assert_eq!(state.update_producer_load(false), 1);
    }
}
