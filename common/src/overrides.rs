use thiserror::Error;

use crate::types::{Mode, OverrideSource, OverrideState};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OverrideError {
    #[error("override duration must be positive")]
    InvalidDuration,
}

/// Tracks the single optional manual override. Last writer wins; there
/// is no queue. Expiry is lazy: nothing fires a timer, the override is
/// simply observed to be dead the next time anyone asks.
#[derive(Debug, Clone, Default)]
pub struct OverrideManager {
    state: OverrideState,
}

impl OverrideManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install an override. `duration_ms = None` means indefinite, held
    /// until explicitly cleared (physical-button semantics); a finite
    /// duration expires at `now_ms + duration_ms`.
    pub fn set(
        &mut self,
        mode: Mode,
        duration_ms: Option<u64>,
        source: OverrideSource,
        now_ms: u64,
    ) -> Result<OverrideState, OverrideError> {
        let expires_at = match duration_ms {
            Some(0) => return Err(OverrideError::InvalidDuration),
            Some(ms) => Some(now_ms.saturating_add(ms)),
            None => None,
        };
        self.state = OverrideState {
            active: true,
            mode,
            expires_at,
            source,
        };
        Ok(self.state)
    }

    pub fn clear(&mut self) -> OverrideState {
        self.state = OverrideState::cleared();
        self.state
    }

    /// The override as of `now_ms`, expiring it as a side effect when
    /// its deadline has passed. Idempotent after expiry.
    pub fn effective(&mut self, now_ms: u64) -> OverrideState {
        if self.state.active {
            if let Some(expires_at) = self.state.expires_at {
                if now_ms >= expires_at {
                    self.state = OverrideState::cleared();
                }
            }
        }
        self.state
    }

    /// Current state without the expiry side effect.
    pub fn peek(&self) -> OverrideState {
        self.state
    }
}
