use crate::types::Mode;

/// Enforces legal transitions between HVAC modes over time. Owns the
/// current mode and the wall-clock stamp of the last real transition.
///
/// A direct heat/cool reversal inside the idle window is coerced to
/// `Off` instead of being applied. The coercion is deliberately not
/// recorded as a transition: the cooldown keeps counting from the
/// original reversal, so a compressor that just stopped gets its full
/// rest no matter how often the engine asks.
#[derive(Debug, Clone)]
pub struct TransitionGuard {
    current: Mode,
    last_transition_ms: u64,
    min_idle_ms: u64,
}

impl TransitionGuard {
    pub fn new(min_idle_ms: u64, now_ms: u64) -> Self {
        Self {
            current: Mode::Off,
            last_transition_ms: now_ms,
            min_idle_ms,
        }
    }

    pub fn current(&self) -> Mode {
        self.current
    }

    pub fn last_transition_ms(&self) -> u64 {
        self.last_transition_ms
    }

    /// Returns the enforced mode. `last_transition_ms` moves if and only
    /// if `current` changes.
    pub fn apply(&mut self, requested: Mode, now_ms: u64) -> Mode {
        if requested == self.current {
            return self.current;
        }

        if requested.opposing() == Some(self.current)
            && now_ms.saturating_sub(self.last_transition_ms) < self.min_idle_ms
        {
            return Mode::Off;
        }

        self.current = requested;
        self.last_transition_ms = now_ms;
        self.current
    }
}
