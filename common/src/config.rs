use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// BCM GPIO numbers for the relay board and input devices. The control
/// core never touches these itself; they are handed to the actuator and
/// sensor collaborators at startup.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PinMap {
    pub cooling: u8,
    pub heating: u8,
    pub fan: u8,
    pub dht: u8,
    pub motion: u8,
    pub button: u8,
}

impl Default for PinMap {
    fn default() -> Self {
        Self {
            cooling: 17,
            heating: 27,
            fan: 22,
            dht: 4,
            motion: 5,
            button: 6,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub cool_f: f32,
    pub heat_f: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cool_f: 75.0,
            heat_f: 68.0,
        }
    }
}

/// Immutable process-lifetime configuration. Loaded once at startup and
/// only ever read afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub pins: PinMap,
    pub thresholds: Thresholds,
    pub loop_interval_ms: u64,
    pub motion_timeout_ms: u64,
    /// Minimum dwell between opposing heat/cool transitions.
    pub min_idle_ms: u64,
    pub sensor_timeout_ms: u64,
    pub api_key: String,
    pub http_port: u16,
    pub log_path: Option<PathBuf>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            pins: PinMap::default(),
            thresholds: Thresholds::default(),
            loop_interval_ms: 5_000,
            motion_timeout_ms: 300_000,
            min_idle_ms: 10_000,
            sensor_timeout_ms: 2_000,
            api_key: String::new(),
            http_port: 8080,
            log_path: None,
        }
    }
}

impl ControllerConfig {
    /// Clamp timing fields to ranges the hardware can live with. A config
    /// file with a 1 ms loop interval would otherwise hammer the relays.
    pub fn sanitize(&mut self) {
        self.loop_interval_ms = self.loop_interval_ms.clamp(500, 600_000);
        self.motion_timeout_ms = self.motion_timeout_ms.clamp(1_000, 86_400_000);
        self.min_idle_ms = self.min_idle_ms.clamp(1_000, 600_000);
        self.sensor_timeout_ms = self.sensor_timeout_ms.clamp(100, 30_000);
    }

    /// The cool threshold is supposed to sit above the heat threshold.
    /// When it does not, the decision engine still runs and cooling wins
    /// the tie; callers surface this as a startup warning.
    pub fn thresholds_inverted(&self) -> bool {
        self.thresholds.cool_f <= self.thresholds.heat_f
    }
}
