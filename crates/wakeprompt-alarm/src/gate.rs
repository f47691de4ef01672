//! Per-alarm run serialization.
//!
//! Each alarm id has an async mutex and an epoch counter. Starting an
//! operation bumps the epoch and then waits for the mutex, so whichever run
//! currently holds the mutex learns at its next suspension point that it has
//! been superseded. [`RunTicket::run`] races every awaited call against that
//! signal; a stale run drops the call and gets `None` back.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::{watch, Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

struct Slot {
    lock: Arc<AsyncMutex<()>>,
    epoch: watch::Sender<u64>,
}

/// Serializes operations on the same alarm id.
#[derive(Default)]
pub struct RunGate {
    slots: Mutex<HashMap<Uuid, Arc<Slot>>>,
}

impl RunGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: Uuid) -> Arc<Slot> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots
            .entry(id)
            .or_insert_with(|| {
                Arc::new(Slot {
                    lock: Arc::new(AsyncMutex::new(())),
                    epoch: watch::channel(0).0,
                })
            })
            .clone()
    }

    /// Supersede any current run for `id` and wait for exclusive access.
    pub async fn begin(&self, id: Uuid) -> RunTicket<'_> {
        let slot = self.slot(id);
        slot.epoch.send_modify(|epoch| *epoch += 1);
        self.acquire(id, slot).await
    }

    /// Wait for exclusive access without superseding the current run.
    pub async fn enter(&self, id: Uuid) -> RunTicket<'_> {
        let slot = self.slot(id);
        self.acquire(id, slot).await
    }

    async fn acquire(&self, id: Uuid, slot: Arc<Slot>) -> RunTicket<'_> {
        let guard = slot.lock.clone().lock_owned().await;
        // Read after locking so a plain `enter` adopts the latest epoch.
        let epoch = *slot.epoch.borrow();
        let watcher = slot.epoch.subscribe();
        RunTicket {
            gate: self,
            id,
            epoch,
            watcher,
            slot: Some(slot),
            _guard: guard,
        }
    }

    /// Number of ids currently tracked.
    pub fn tracked(&self) -> usize {
        self.slots.lock().map(|s| s.len()).unwrap_or(0)
    }

    fn release(&self, id: Uuid, slot: Arc<Slot>) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        // One reference in the map plus ours: nobody else waits on this id.
        if Arc::strong_count(&slot) == 2 {
            slots.remove(&id);
        }
    }
}

/// Exclusive access to one alarm, valid until a newer operation begins.
pub struct RunTicket<'a> {
    gate: &'a RunGate,
    id: Uuid,
    epoch: u64,
    watcher: watch::Receiver<u64>,
    slot: Option<Arc<Slot>>,
    _guard: OwnedMutexGuard<()>,
}

impl RunTicket<'_> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Whether no newer operation has started for this alarm.
    pub fn is_current(&self) -> bool {
        *self.watcher.borrow() == self.epoch
    }

    /// Await `fut` unless the run is superseded first.
    pub async fn run<F: Future>(&mut self, fut: F) -> Option<F::Output> {
        if !self.is_current() {
            return None;
        }
        let epoch = self.epoch;
        tokio::select! {
            biased;
            _ = self.watcher.wait_for(|current| *current != epoch) => None,
            output = fut => Some(output),
        }
    }
}

impl Drop for RunTicket<'_> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.gate.release(self.id, slot);
        }
    }
}
