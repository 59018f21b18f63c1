use crate::config::ControllerConfig;
use crate::types::{Mode, SensorSnapshot};

/// Map one sensor snapshot to a desired mode. Pure and history-free;
/// chatter suppression is the transition guard's job, not this one's.
///
/// Cooling is checked before heating, so an inverted threshold pair
/// (cool <= heat) resolves in favor of cooling rather than crashing.
pub fn decide(snapshot: &SensorSnapshot, config: &ControllerConfig) -> Mode {
    if snapshot.temp_f >= config.thresholds.cool_f {
        return Mode::CoolOn;
    }
    if snapshot.temp_f <= config.thresholds.heat_f {
        return Mode::HeatOn;
    }
    if snapshot
        .read_at
        .saturating_sub(snapshot.last_motion_ts)
        <= config.motion_timeout_ms
    {
        return Mode::FanOnly;
    }
    Mode::Off
}
