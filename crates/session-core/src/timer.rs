//! Elapsed-time clock for an open session.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TimerState {
    Stopped,
    Running,
    /// Terminal.
    Frozen { completed_at: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerClock {
    created_at: u64,
    initial_elapsed_seconds: u64,
    state: TimerState,
}

impl TimerClock {
    pub fn new(created_at: u64, initial_elapsed_seconds: u64) -> Self {
        Self {
            created_at,
            initial_elapsed_seconds,
            state: TimerState::Stopped,
        }
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == TimerState::Running
    }

    pub fn is_frozen(&self) -> bool {
        matches!(self.state, TimerState::Frozen { .. })
    }

    /// Stopped -> Running. Returns false from any other state.
    pub fn start(&mut self) -> bool {
        if self.state != TimerState::Stopped {
            return false;
        }
        self.state = TimerState::Running;
        true
    }

    /// Moves to Frozen unless already there; the first completion time sticks.
    pub fn freeze(&mut self, completed_at: u64) -> bool {
        if self.is_frozen() {
            return false;
        }
        self.state = TimerState::Frozen { completed_at };
        true
    }

    /// Whole seconds shown to the player at wall-clock `now_ms`.
    pub fn elapsed_seconds(&self, now_ms: u64) -> u64 {
        match self.state {
            TimerState::Stopped => self.initial_elapsed_seconds,
            TimerState::Running => {
                self.initial_elapsed_seconds + rounded_seconds(now_ms.saturating_sub(self.created_at))
            }
            TimerState::Frozen { completed_at } => {
                rounded_seconds(completed_at.saturating_sub(self.created_at))
            }
        }
    }
}

fn rounded_seconds(millis: u64) -> u64 {
    (millis + 500) / 1_000
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: u64 = 1_700_000_000_000;

    #[test]
    fn running_adds_initial_elapsed() {
        let mut timer = TimerClock::new(T, 10);
        assert!(timer.start());
        assert_eq!(timer.elapsed_seconds(T + 5_000), 15);
    }

    #[test]
    fn running_rounds_to_nearest_second() {
        let mut timer = TimerClock::new(T, 0);
        timer.start();
        assert_eq!(timer.elapsed_seconds(T + 1_499), 1);
        assert_eq!(timer.elapsed_seconds(T + 1_500), 2);
    }

    #[test]
    fn frozen_ignores_wall_clock() {
        let mut timer = TimerClock::new(T, 10);
        timer.start();
        assert!(timer.freeze(T + 42_400));
        assert_eq!(timer.elapsed_seconds(T + 99_000), 42);
        assert!(!timer.freeze(T + 50_000));
        assert_eq!(timer.state(), TimerState::Frozen { completed_at: T + 42_400 });
    }

    #[test]
    fn frozen_timer_cannot_restart() {
        let mut timer = TimerClock::new(T, 0);
        timer.freeze(T);
        assert!(!timer.start());
        assert!(!timer.is_running());
    }

    #[test]
    fn stopped_shows_carried_over_time() {
        let timer = TimerClock::new(T, 7);
        assert_eq!(timer.elapsed_seconds(T + 60_000), 7);
    }
}
