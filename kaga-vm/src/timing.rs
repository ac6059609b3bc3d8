//! Instruction-count delay simulator.
//!
//! Command processing latency is measured in qualifying instruction fetches,
//! not wall-clock time. The adapter stays BUSY until exactly `delay` fetch
//! notifications have been delivered.

/// Current timing state of the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingState {
    Ready,
    Busy { remaining: u32 },
}

/// Converts a command's delay into a busy period advanced by fetch ticks.
#[derive(Debug)]
pub struct TransmitDelay {
    state: TimingState,
}

impl TransmitDelay {
    pub fn new() -> Self {
        Self { state: TimingState::Ready }
    }

    pub fn state(&self) -> TimingState {
        self.state
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.state, TimingState::Busy { .. })
    }

    /// Start a busy period of `delay` fetches. A zero delay keeps the
    /// adapter ready (the command completed instantly).
    pub fn begin(&mut self, delay: u32) {
        if delay > 0 {
            self.state = TimingState::Busy { remaining: delay };
        }
    }

    /// Account one qualifying instruction fetch. Returns true exactly once,
    /// on the tick that completes the busy period.
    pub fn tick(&mut self) -> bool {
        match self.state {
            TimingState::Busy { remaining: 1 } => {
                self.state = TimingState::Ready;
                true
            }
            TimingState::Busy { remaining } => {
                self.state = TimingState::Busy { remaining: remaining - 1 };
                false
            }
            TimingState::Ready => false,
        }
    }

    /// Forcibly return to READY, discarding any in-flight delay.
    pub fn reset(&mut self) {
        self.state = TimingState::Ready;
    }
}
