//! Reconnection state machine
//!
//! Pure retry bookkeeping: phases, attempt counting and the single
//! pending timer slot. Timer arming itself happens in the relay, which
//! owns the scheduling capability.

use crate::timer::TimerGuard;

/// Lifecycle phase of the managed connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPhase {
    /// Constructed, first open not yet observed
    Idle,
    /// Transport reached its open state
    Connected,
    /// Closed; a retry timer is armed or firing
    Retrying,
    /// Attempts exceeded the configured maximum; terminal
    Exhausted,
}

/// What a close event asks the relay to do
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Arm a timer for this attempt number
    Arm { attempt: u32 },
    /// Limit crossed just now: emit the terminal notification once
    Exhaust,
    /// Already exhausted: nothing to do
    AlreadyExhausted,
}

/// Mutable retry bookkeeping, reset only on successful reconnect
pub struct RetryState {
    phase: RetryPhase,
    attempts: u32,
    /// At most one outstanding timer; replacing the guard cancels the
    /// previous task via its Drop.
    pending: Option<Box<dyn TimerGuard>>,
}

impl RetryState {
    pub fn new() -> Self {
        Self {
            phase: RetryPhase::Idle,
            attempts: 0,
            pending: None,
        }
    }

    pub fn phase(&self) -> RetryPhase {
        self.phase
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Record an observed open event. `reset_attempts` is true only
    /// while reconnection is enabled.
    pub fn mark_connected(&mut self, reset_attempts: bool) {
        self.phase = RetryPhase::Connected;
        if reset_attempts {
            self.attempts = 0;
            self.pending = None;
        }
    }

    /// Advance the machine for one close event. Returns the action the
    /// relay must take; on `Arm` the caller schedules a timer and hands
    /// the guard back through [`RetryState::arm`].
    pub fn begin_attempt(&mut self, max_attempts: Option<u32>) -> RetryDecision {
        if self.phase == RetryPhase::Exhausted {
            return RetryDecision::AlreadyExhausted;
        }

        self.attempts += 1;
        if max_attempts.map_or(true, |max| self.attempts <= max) {
            self.phase = RetryPhase::Retrying;
            // Invalidate any previous pending timer before re-arming
            self.pending = None;
            RetryDecision::Arm {
                attempt: self.attempts,
            }
        } else {
            self.phase = RetryPhase::Exhausted;
            self.pending = None;
            RetryDecision::Exhaust
        }
    }

    /// Store the guard for the timer armed by the last `Arm` decision
    pub fn arm(&mut self, guard: Box<dyn TimerGuard>) {
        self.pending = Some(guard);
    }

    /// Take the pending guard when the timer fires
    pub fn fired(&mut self) -> Option<Box<dyn TimerGuard>> {
        self.pending.take()
    }
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new()
    }
}
