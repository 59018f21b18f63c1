use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tokio::sync::RwLock;

use hvac_common::{ControlState, Mode, OverrideState};

/// The synchronization point between the control loop (writer) and the
/// API handlers (readers). No business logic lives here: `publish`
/// replaces the whole snapshot under the write guard, so a reader can
/// never observe half of one tick and half of another.
pub struct StateCell {
    state: RwLock<ControlState>,
    started: Instant,
    // 0 means the loop has not ticked yet.
    last_tick_ms: AtomicU64,
    errors: AtomicU64,
}

impl StateCell {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ControlState::default()),
            started: Instant::now(),
            last_tick_ms: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    pub async fn publish(
        &self,
        mode: Mode,
        override_state: OverrideState,
        last_temp_f: Option<f32>,
        last_motion_ts: Option<u64>,
        now_ms: u64,
    ) {
        let mut state = self.state.write().await;
        *state = ControlState {
            mode,
            override_state,
            last_temp_f,
            last_motion_ts,
            updated_at: now_ms,
        };
    }

    pub async fn read(&self) -> ControlState {
        self.state.read().await.clone()
    }

    pub fn mark_tick(&self, now_ms: u64) {
        self.last_tick_ms.store(now_ms.max(1), Ordering::Relaxed);
    }

    pub fn last_tick_ms(&self) -> Option<u64> {
        match self.last_tick_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(ms),
        }
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn uptime_sec(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
