use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

// Released locks kept around for reuse.
const MAX_FREE_LOCKS: usize = 64;

struct Slot {

    lock: Arc<RwLock<()>>,

    // Holders and waiters of this key.
    count: usize,

}

#[derive(Default)]
struct Slots {

    slots: HashMap<String, Slot>,

    free: Vec<Arc<RwLock<()>>>,

}

// Pool of read/write locks keyed by arbitrary strings (task ids, peer ids).
// Entries exist only while a lock on the key is held or awaited.
#[derive(Clone, Default)]
pub struct LockPool {
    inner: Arc<Mutex<Slots>>,
}

enum Held {
    Read(#[allow(dead_code)] OwnedRwLockReadGuard<()>),
    Write(#[allow(dead_code)] OwnedRwLockWriteGuard<()>),
}

// Releases the key when dropped.
pub struct KeyGuard {

    pool: LockPool,

    key: String,

    held: Option<Held>,

}

impl LockPool {

    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &str, readonly: bool) -> KeyGuard {
        let lock = self.checkout(key);
        // Constructed before awaiting so a cancelled acquire still returns the slot.
        let mut guard = KeyGuard {
            pool: self.clone(),
            key: key.to_string(),
            held: None,
        };
        let held = if readonly {
            Held::Read(lock.read_owned().await)
        } else {
            Held::Write(lock.write_owned().await)
        };
        guard.held = Some(held);
        guard
    }

    pub async fn read(&self, key: &str) -> KeyGuard {
        self.acquire(key, true).await
    }

    pub async fn write(&self, key: &str) -> KeyGuard {
        self.acquire(key, false).await
    }

    // Number of keys currently locked or awaited.
    pub fn len(&self) -> usize {
        self.slots().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn checkout(&self, key: &str) -> Arc<RwLock<()>> {
        let mut slots = self.slots();
        if let Some(slot) = slots.slots.get_mut(key) {
            slot.count += 1;
            return slot.lock.clone();
        }
        let lock = slots.free.pop().unwrap_or_default();
        slots.slots.insert(key.to_string(), Slot { lock: lock.clone(), count: 1 });
        lock
    }

    fn checkin(&self, key: &str) {
        let mut slots = self.slots();
        let remove = match slots.slots.get_mut(key) {
            Some(slot) => {
                slot.count -= 1;
                slot.count == 0
            },
            None => {
                tracing::warn!("released lock {} which is not held", key);
                false
            },
        };
        if remove {
            if let Some(slot) = slots.slots.remove(key) {
                if slots.free.len() < MAX_FREE_LOCKS {
                    slots.free.push(slot.lock);
                }
            }
        }
    }

}

impl std::fmt::Debug for LockPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockPool").field("keys", &self.len()).finish()
    }
}

impl KeyGuard {

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_read(&self) -> bool {
        matches!(self.held, Some(Held::Read(_)))
    }

}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        // Unlock before the slot can be handed to another key.
        self.held.take();
        self.pool.checkin(&self.key);
    }
}
