pub mod config;
pub mod decision;
pub mod overrides;
pub mod transition;
pub mod types;

pub use config::{ControllerConfig, PinMap, Thresholds};
pub use decision::decide;
pub use overrides::{OverrideError, OverrideManager};
pub use transition::TransitionGuard;
pub use types::{
    epoch_ms, ControlState, HealthReport, Mode, OverrideSource, OverrideState, SensorSnapshot,
};
