//! Session registry
//!
//! Maps each session to its serialization lock and last activity. The map lock
//! is only held to find or insert a slot; the per-session lock is what pipeline
//! operations hold while they touch the workspace.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::models::SessionId;

struct SessionSlot {
    lock: Arc<Mutex<()>>,
    last_seen: Instant,
}

impl SessionSlot {
    fn new() -> Self {
        Self {
            lock: Arc::new(Mutex::new(())),
            last_seen: Instant::now(),
        }
    }

    fn idle_for(&self, max_idle: Duration) -> bool {
        self.last_seen.elapsed() >= max_idle
    }
}

/// Live sessions and their locks
#[derive(Default)]
pub struct SessionRegistry {
    slots: Mutex<HashMap<SessionId, SessionSlot>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `session`, recording the activity
    pub async fn acquire(&self, session: SessionId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut slots = self.slots.lock().await;
            let slot = slots.entry(session).or_insert_with(SessionSlot::new);
            slot.last_seen = Instant::now();
            Arc::clone(&slot.lock)
        };
        lock.lock_owned().await
    }

    /// Give back `guard`, forgetting the session unless someone else holds or awaits it
    pub async fn release(&self, session: SessionId, guard: OwnedMutexGuard<()>) {
        drop(guard);
        let mut slots = self.slots.lock().await;
        if slots
            .get(&session)
            .is_some_and(|slot| Arc::strong_count(&slot.lock) == 1)
        {
            slots.remove(&session);
        }
    }

    /// Lock every session idle for at least `max_idle` that nobody is using
    pub async fn lock_idle(&self, max_idle: Duration) -> Vec<(SessionId, OwnedMutexGuard<()>)> {
        let slots = self.slots.lock().await;
        slots
            .iter()
            .filter(|(_, slot)| slot.idle_for(max_idle))
            .filter_map(|(id, slot)| {
                Arc::clone(&slot.lock)
                    .try_lock_owned()
                    .ok()
                    .map(|guard| (*id, guard))
            })
            .collect()
    }

    /// Drop idle slots nobody holds or waits on; returns how many were dropped
    pub async fn forget_idle(&self, max_idle: Duration) -> usize {
        let mut slots = self.slots.lock().await;
        let before = slots.len();
        slots.retain(|_, slot| !(slot.idle_for(max_idle) && Arc::strong_count(&slot.lock) == 1));
        before - slots.len()
    }

    pub async fn is_tracked(&self, session: SessionId) -> bool {
        self.slots.lock().await.contains_key(&session)
    }

    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
