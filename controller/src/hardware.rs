use anyhow::Result;
use tracing::debug;

use hvac_common::{Mode, PinMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayChannel {
    Cooling,
    Heating,
    Fan,
}

impl RelayChannel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cooling => "cooling",
            Self::Heating => "heating",
            Self::Fan => "fan",
        }
    }

    pub fn pin(self, pins: &PinMap) -> u8 {
        match self {
            Self::Cooling => pins.cooling,
            Self::Heating => pins.heating,
            Self::Fan => pins.fan,
        }
    }
}

const ALL_CHANNELS: [RelayChannel; 3] = [
    RelayChannel::Cooling,
    RelayChannel::Heating,
    RelayChannel::Fan,
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    pub temp_f: f32,
    pub motion: bool,
}

/// Sensor collaborator seam. Implementations should bound their own I/O
/// time; the control loop adds an outer timeout as a backstop.
pub trait SensorReader: Send {
    fn read(&mut self) -> Result<SensorReading>;
}

/// Relay collaborator seam.
pub trait RelayBank: Send {
    fn set_relay(&mut self, channel: RelayChannel, on: bool) -> Result<()>;
}

/// Drive the relay bank to match a mode. Every channel is dropped first
/// so heating and cooling can never be energized together, then the
/// channels the mode needs are raised.
pub fn apply_mode(bank: &mut dyn RelayBank, mode: Mode) -> Result<()> {
    for channel in ALL_CHANNELS {
        bank.set_relay(channel, false)?;
    }
    match mode {
        Mode::Off => {}
        Mode::CoolOn => {
            bank.set_relay(RelayChannel::Cooling, true)?;
            bank.set_relay(RelayChannel::Fan, true)?;
        }
        Mode::HeatOn => {
            bank.set_relay(RelayChannel::Heating, true)?;
            bank.set_relay(RelayChannel::Fan, true)?;
        }
        Mode::FanOnly => {
            bank.set_relay(RelayChannel::Fan, true)?;
        }
    }
    Ok(())
}

/// Host-build sensor: a slow deterministic temperature wave with
/// periodic motion, useful for exercising the whole loop without
/// hardware.
// Hardware integration point: replace with DHT22 + PIR drivers on the Pi.
pub struct SimSensor {
    tick: u64,
}

impl SimSensor {
    pub fn new() -> Self {
        Self { tick: 0 }
    }
}

impl SensorReader for SimSensor {
    fn read(&mut self) -> Result<SensorReading> {
        self.tick = self.tick.saturating_add(1);
        let temp_f = 70.0 + ((self.tick % 16) as f32 - 8.0) * 0.8;
        let motion = self.tick % 4 == 0;
        Ok(SensorReading { temp_f, motion })
    }
}

/// Host-build relay bank: logs the writes it would make to GPIO.
pub struct LoggingRelayBank {
    pins: PinMap,
}

impl LoggingRelayBank {
    pub fn new(pins: PinMap) -> Self {
        Self { pins }
    }
}

impl RelayBank for LoggingRelayBank {
    fn set_relay(&mut self, channel: RelayChannel, on: bool) -> Result<()> {
        debug!(
            "relay {} (GPIO {}) -> {}",
            channel.as_str(),
            channel.pin(&self.pins),
            if on { "on" } else { "off" }
        );
        Ok(())
    }
}
