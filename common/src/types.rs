use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch. The anti-short-cycle cooldown is
/// measured against the wall clock, not loop ticks, so it stays correct
/// under variable loop intervals.
pub fn epoch_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    Off,
    CoolOn,
    HeatOn,
    FanOnly,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::CoolOn => "COOL_ON",
            Self::HeatOn => "HEAT_ON",
            Self::FanOnly => "FAN_ONLY",
        }
    }

    /// The mode this one must not reverse into without an idle buffer.
    pub fn opposing(self) -> Option<Mode> {
        match self {
            Self::CoolOn => Some(Self::HeatOn),
            Self::HeatOn => Some(Self::CoolOn),
            Self::Off | Self::FanOnly => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverrideSource {
    Button,
    Api,
}

impl OverrideSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Button => "button",
            Self::Api => "api",
        }
    }
}

/// One loop tick's worth of sensor data. Built once per tick and never
/// mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSnapshot {
    pub temp_f: f32,
    pub motion_active: bool,
    /// Wall-clock stamp of the most recent motion event.
    pub last_motion_ts: u64,
    pub read_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverrideState {
    pub active: bool,
    pub mode: Mode,
    /// None while active means indefinite (physical button held).
    pub expires_at: Option<u64>,
    pub source: OverrideSource,
}

impl OverrideState {
    pub fn cleared() -> Self {
        Self {
            active: false,
            mode: Mode::Off,
            expires_at: None,
            source: OverrideSource::Api,
        }
    }
}

impl Default for OverrideState {
    fn default() -> Self {
        Self::cleared()
    }
}

/// The externally visible snapshot: read concurrently by API handlers,
/// replaced wholesale by the control loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlState {
    pub mode: Mode,
    #[serde(rename = "override")]
    pub override_state: OverrideState,
    pub last_temp_f: Option<f32>,
    pub last_motion_ts: Option<u64>,
    pub updated_at: u64,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            mode: Mode::Off,
            override_state: OverrideState::cleared(),
            last_temp_f: None,
            last_motion_ts: None,
            updated_at: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub uptime_sec: u64,
    pub mode: Mode,
    pub last_temp_f: Option<f32>,
    pub override_active: bool,
    pub errors: u64,
}
