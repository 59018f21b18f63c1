use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use hvac_common::{
    decide, epoch_ms, ControllerConfig, Mode, OverrideManager, SensorSnapshot, TransitionGuard,
};

use crate::hardware::{apply_mode, RelayBank, SensorReader, SensorReading};
use crate::state::StateCell;

/// The periodic driver: sensors -> decision engine -> override
/// precedence -> transition guard -> shared state -> relays.
///
/// Owns the transition guard's writer role and the relay bank; shares
/// the override manager and state cell with the API handlers. Every
/// lock here is taken and released on its own, never nested.
pub struct ControlLoop {
    config: Arc<ControllerConfig>,
    guard: Arc<Mutex<TransitionGuard>>,
    overrides: Arc<Mutex<OverrideManager>>,
    cell: Arc<StateCell>,
    relays: Box<dyn RelayBank>,
    last_temp_f: Option<f32>,
    last_motion_ts: Option<u64>,
    last_applied: Option<Mode>,
    last_published: Mode,
}

impl ControlLoop {
    pub fn new(
        config: Arc<ControllerConfig>,
        guard: Arc<Mutex<TransitionGuard>>,
        overrides: Arc<Mutex<OverrideManager>>,
        cell: Arc<StateCell>,
        relays: Box<dyn RelayBank>,
    ) -> Self {
        Self {
            config,
            guard,
            overrides,
            cell,
            relays,
            last_temp_f: None,
            last_motion_ts: None,
            last_applied: None,
            last_published: Mode::Off,
        }
    }

    /// One control cycle. Split from the async driver so tests can feed
    /// readings and clocks directly.
    pub async fn tick(&mut self, reading: Result<SensorReading>, now_ms: u64) -> Mode {
        let requested = match reading {
            Ok(reading) => {
                self.last_temp_f = Some(reading.temp_f);
                if reading.motion {
                    self.last_motion_ts = Some(now_ms);
                }
                let snapshot = SensorSnapshot {
                    temp_f: reading.temp_f,
                    motion_active: reading.motion,
                    last_motion_ts: self.last_motion_ts.unwrap_or(0),
                    read_at: now_ms,
                };
                Some(decide(&snapshot, &self.config))
            }
            Err(err) => {
                warn!("sensor read failed: {err:#}");
                self.cell.record_error();
                None
            }
        };

        let override_state = { self.overrides.lock().await.effective(now_ms) };

        let mode = if override_state.active {
            // Manual override replaces the engine's output but still
            // goes through the guard; it cannot bypass the cooldown.
            let mut guard = self.guard.lock().await;
            guard.apply(override_state.mode, now_ms)
        } else if let Some(requested) = requested {
            let mut guard = self.guard.lock().await;
            guard.apply(requested, now_ms)
        } else {
            // Transient sensor fault: hold the previous mode, leave the
            // guard alone.
            self.last_published
        };

        if self.last_applied != Some(mode) {
            match apply_mode(self.relays.as_mut(), mode) {
                Ok(()) => {
                    info!("mode -> {}", mode.as_str());
                    self.last_applied = Some(mode);
                }
                Err(err) => {
                    // Intended mode is kept; physical relays may lag until
                    // the retry lands.
                    warn!("relay write failed, retrying next tick: {err:#}");
                    self.last_applied = None;
                }
            }
        }

        self.cell
            .publish(
                mode,
                override_state,
                self.last_temp_f,
                self.last_motion_ts,
                now_ms,
            )
            .await;
        self.cell.mark_tick(now_ms);
        self.last_published = mode;
        mode
    }

    pub async fn run(
        mut self,
        reader: Arc<Mutex<Box<dyn SensorReader>>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.config.loop_interval_ms));
        let sensor_timeout = Duration::from_millis(self.config.sensor_timeout_ms);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let reading = read_with_timeout(&reader, sensor_timeout).await;
                    let _ = self.tick(reading, epoch_ms()).await;
                }
                _ = shutdown.changed() => {
                    self.fail_safe();
                    return;
                }
            }
        }
    }

    /// Shutdown path: whatever state we were in, leave the relays off.
    fn fail_safe(&mut self) {
        info!("control loop stopping; dropping all relays");
        if let Err(err) = apply_mode(self.relays.as_mut(), Mode::Off) {
            warn!("failed to drop relays during shutdown: {err:#}");
        }
    }
}

/// Run the (possibly blocking) sensor read off the runtime with a
/// bounded timeout; a stuck sensor must not stall the loop.
async fn read_with_timeout(
    reader: &Arc<Mutex<Box<dyn SensorReader>>>,
    timeout: Duration,
) -> Result<SensorReading> {
    let reader = Arc::clone(reader);
    let read = tokio::task::spawn_blocking(move || reader.blocking_lock().read());
    match tokio::time::timeout(timeout, read).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(anyhow::anyhow!("sensor task failed: {join_err}")),
        Err(_) => Err(anyhow::anyhow!(
            "sensor read timed out after {}ms",
            timeout.as_millis()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::testing::RecordingBank;
    use crate::hardware::RelayChannel;
    use hvac_common::OverrideSource;

    const T0: u64 = 10_000_000;

    fn reading(temp_f: f32, motion: bool) -> Result<SensorReading> {
        Ok(SensorReading { temp_f, motion })
    }

    fn build_loop(bank: RecordingBank) -> (ControlLoop, Arc<StateCell>, Arc<Mutex<OverrideManager>>) {
        let config = Arc::new(ControllerConfig::default());
        let guard = Arc::new(Mutex::new(TransitionGuard::new(config.min_idle_ms, T0)));
        let overrides = Arc::new(Mutex::new(OverrideManager::new()));
        let cell = Arc::new(StateCell::new());
        let control = ControlLoop::new(
            config,
            guard,
            Arc::clone(&overrides),
            Arc::clone(&cell),
            Box::new(bank),
        );
        (control, cell, overrides)
    }

    #[tokio::test]
    async fn warm_occupied_room_ends_up_cooling() {
        // 76F against a 75F cool threshold, motion just seen.
        let bank = RecordingBank::new();
        let (mut control, cell, _) = build_loop(bank.clone());

        let mode = control.tick(reading(76.0, true), T0).await;
        assert_eq!(mode, Mode::CoolOn);

        let state = cell.read().await;
        assert_eq!(state.mode, Mode::CoolOn);
        assert_eq!(state.last_temp_f, Some(76.0));
        assert_eq!(state.last_motion_ts, Some(T0));
        assert_eq!(state.updated_at, T0);

        let on: Vec<_> = bank
            .take_writes()
            .into_iter()
            .filter(|(_, on)| *on)
            .collect();
        assert_eq!(
            on,
            vec![(RelayChannel::Cooling, true), (RelayChannel::Fan, true)]
        );
    }

    #[tokio::test]
    async fn sensor_fault_keeps_mode_and_counts_error() {
        let (mut control, cell, _) = build_loop(RecordingBank::new());

        control.tick(reading(80.0, false), T0).await;
        assert_eq!(cell.read().await.mode, Mode::CoolOn);

        let mode = control
            .tick(Err(anyhow::anyhow!("dht read timed out")), T0 + 5_000)
            .await;
        assert_eq!(mode, Mode::CoolOn);
        assert_eq!(cell.error_count(), 1);

        let state = cell.read().await;
        assert_eq!(state.mode, Mode::CoolOn);
        // The fault tick still refreshes the published stamp.
        assert_eq!(state.updated_at, T0 + 5_000);
        // Last good reading is still what the API sees.
        assert_eq!(state.last_temp_f, Some(80.0));
    }

    #[tokio::test]
    async fn override_takes_precedence_over_engine() {
        let (mut control, cell, overrides) = build_loop(RecordingBank::new());

        overrides
            .lock()
            .await
            .set(Mode::HeatOn, Some(60_000), OverrideSource::Api, T0)
            .unwrap();

        // Engine would say CoolOn at 80F; the override wins.
        let mode = control.tick(reading(80.0, true), T0 + 1_000).await;
        assert_eq!(mode, Mode::HeatOn);
        assert_eq!(cell.read().await.mode, Mode::HeatOn);
        assert!(cell.read().await.override_state.active);
    }

    #[tokio::test]
    async fn expired_override_hands_control_back() {
        let (mut control, cell, overrides) = build_loop(RecordingBank::new());

        overrides
            .lock()
            .await
            .set(Mode::FanOnly, Some(1_000), OverrideSource::Api, T0)
            .unwrap();

        control.tick(reading(71.0, false), T0 + 500).await;
        assert_eq!(cell.read().await.mode, Mode::FanOnly);

        // One second later the override is observed dead and the engine
        // decides again: 71F in band, no motion -> Off.
        let mode = control.tick(reading(71.0, false), T0 + 1_500).await;
        assert_eq!(mode, Mode::Off);
        assert!(!cell.read().await.override_state.active);
    }

    #[tokio::test]
    async fn reversal_dwells_in_off_until_cooldown_elapses() {
        let (mut control, _cell, _) = build_loop(RecordingBank::new());

        assert_eq!(control.tick(reading(80.0, false), T0).await, Mode::CoolOn);
        // 60F five seconds later wants heat; guard coerces to Off.
        assert_eq!(
            control.tick(reading(60.0, false), T0 + 5_000).await,
            Mode::Off
        );
        // Eleven seconds after the original transition, heat is allowed.
        assert_eq!(
            control.tick(reading(60.0, false), T0 + 11_000).await,
            Mode::HeatOn
        );
    }

    #[tokio::test]
    async fn relay_failure_is_retried_next_tick() {
        let bank = RecordingBank::failing(1);
        let (mut control, cell, _) = build_loop(bank.clone());

        let mode = control.tick(reading(80.0, false), T0).await;
        // Intended mode is reported even though the write failed.
        assert_eq!(mode, Mode::CoolOn);
        assert_eq!(cell.read().await.mode, Mode::CoolOn);
        assert!(bank.take_writes().is_empty());

        // Same mode next tick: normally a no-op, but the failed write
        // forces a reapply.
        control.tick(reading(80.0, false), T0 + 5_000).await;
        let on: Vec<_> = bank
            .take_writes()
            .into_iter()
            .filter(|(_, on)| *on)
            .collect();
        assert_eq!(
            on,
            vec![(RelayChannel::Cooling, true), (RelayChannel::Fan, true)]
        );
    }

    #[tokio::test]
    async fn unchanged_mode_skips_relay_writes() {
        let bank = RecordingBank::new();
        let (mut control, _cell, _) = build_loop(bank.clone());

        control.tick(reading(80.0, false), T0).await;
        bank.take_writes();

        control.tick(reading(80.5, false), T0 + 5_000).await;
        assert!(bank.take_writes().is_empty());
    }

    #[tokio::test]
    async fn shutdown_drops_all_relays() {
        let bank = RecordingBank::new();
        let config = Arc::new(ControllerConfig::default());
        let guard = Arc::new(Mutex::new(TransitionGuard::new(config.min_idle_ms, T0)));
        let overrides = Arc::new(Mutex::new(OverrideManager::new()));
        let cell = Arc::new(StateCell::new());
        let control = ControlLoop::new(config, guard, overrides, cell, Box::new(bank.clone()));

        let reader: Arc<Mutex<Box<dyn SensorReader>>> =
            Arc::new(Mutex::new(Box::new(crate::hardware::SimSensor::new())));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(control.run(reader, shutdown_rx));
        // Let the first tick land, then stop.
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();
        task.await.unwrap();

        let writes = bank.take_writes();
        let tail: Vec<_> = writes.iter().rev().take(3).cloned().collect();
        assert!(tail.iter().all(|(_, on)| !on), "relays left energized: {writes:?}");
    }
}
