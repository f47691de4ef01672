//! In-process alarm backbone.
//!
//! Keeps one tokio timer per alarm id. When a timer expires the firing is
//! sent on a channel for the daemon to record. Scheduling an id that already
//! has a timer replaces it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use wakeprompt_core::error::{AuthorizationError, SchedulingError};
use wakeprompt_core::ports::AlarmBackbone;
use wakeprompt_core::types::{short_id, AlarmFiring, AlarmRegistration};

struct Timer {
    registration: AlarmRegistration,
    handle: JoinHandle<()>,
}

type Timers = Arc<Mutex<HashMap<Uuid, Timer>>>;

/// Alarm backbone backed by tokio timers.
pub struct LocalAlarmBackbone {
    authorized: bool,
    timers: Timers,
    firings: mpsc::UnboundedSender<AlarmFiring>,
}

impl LocalAlarmBackbone {
    /// Create a backbone and the receiver its firings are delivered on.
    pub fn new(authorized: bool) -> (Self, mpsc::UnboundedReceiver<AlarmFiring>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let backbone = Self {
            authorized,
            timers: Arc::new(Mutex::new(HashMap::new())),
            firings: tx,
        };
        (backbone, rx)
    }

    /// Snapshot of the active registrations.
    pub fn registrations(&self) -> Vec<AlarmRegistration> {
        self.timers
            .lock()
            .map(|timers| timers.values().map(|t| t.registration.clone()).collect())
            .unwrap_or_default()
    }

    pub fn registration(&self, id: Uuid) -> Option<AlarmRegistration> {
        self.timers
            .lock()
            .ok()
            .and_then(|timers| timers.get(&id).map(|t| t.registration.clone()))
    }

    /// Abort every pending timer.
    pub fn shutdown(&self) {
        if let Ok(mut timers) = self.timers.lock() {
            for (_, timer) in timers.drain() {
                timer.handle.abort();
            }
        }
        info!("Alarm backbone shut down");
    }
}

#[async_trait]
impl AlarmBackbone for LocalAlarmBackbone {
    async fn request_authorization(&self) -> Result<bool, AuthorizationError> {
        Ok(self.authorized)
    }

    async fn schedule_alarm(&self, registration: &AlarmRegistration) -> Result<(), SchedulingError> {
        if !self.authorized {
            return Err(SchedulingError::NotAuthorized);
        }
        let delay = (registration.fire_time - Utc::now())
            .to_std()
            .ok()
            .filter(|d| !d.is_zero())
            .ok_or_else(|| SchedulingError::FireTimeInPast(registration.fire_time.to_rfc3339()))?;

        let id = registration.id;
        let mode = registration.mode;
        let timers = Arc::clone(&self.timers);
        let firings = self.firings.clone();

        let mut guard = self
            .timers
            .lock()
            .map_err(|e| SchedulingError::Failed(format!("timer table poisoned: {}", e)))?;

        // Spawned under the table lock so the task cannot remove itself
        // before it has been inserted.
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Ok(mut timers) = timers.lock() {
                timers.remove(&id);
            }
            info!(alarm = %short_id(id), mode = %mode, "Alarm fired");
            let _ = firings.send(AlarmFiring {
                id,
                mode,
                fired_at: Utc::now(),
            });
        });

        if let Some(previous) = guard.insert(
            id,
            Timer {
                registration: registration.clone(),
                handle,
            },
        ) {
            previous.handle.abort();
        }
        debug!(
            alarm = %short_id(id),
            mode = %mode,
            in_secs = delay.as_secs(),
            sound = registration.sound.as_deref().unwrap_or("default"),
            "Alarm scheduled"
        );
        Ok(())
    }

    fn cancel_alarm(&self, id: Uuid) {
        if let Ok(mut timers) = self.timers.lock() {
            if let Some(timer) = timers.remove(&id) {
                timer.handle.abort();
                debug!(alarm = %short_id(id), "Alarm registration cancelled");
            }
        }
    }
}

impl Drop for LocalAlarmBackbone {
    fn drop(&mut self) {
        if let Ok(mut timers) = self.timers.lock() {
            for (_, timer) in timers.drain() {
                timer.handle.abort();
            }
        }
    }
}
