//! Debounced "agent thinking" indicator.
//!
//! `start` fires on every user send and every delta frame; 1500 ms of
//! silence falls back to Idle. While thinking, a once-per-second tick
//! advances an elapsed counter used for display only. The controller is a
//! plain deadline state machine polled by the connection event loop, so the
//! transitions stay on the single cooperative task.

use std::time::{Duration, Instant};

/// Silence window after the last activity ping before going Idle.
const DEBOUNCE: Duration = Duration::from_millis(1500);
/// Elapsed-display tick interval.
const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThinkingState {
    Idle,
    Thinking { started_at: Instant },
}

/// What a timer expiry did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThinkingTransition {
    None,
    Tick,
    WentIdle,
}

#[derive(Debug)]
pub struct ThinkingIndicator {
    state: ThinkingState,
    debounce_deadline: Option<Instant>,
    tick_deadline: Option<Instant>,
    elapsed_secs: u64,
}

impl ThinkingIndicator {
    pub fn new() -> Self {
        Self {
            state: ThinkingState::Idle,
            debounce_deadline: None,
            tick_deadline: None,
            elapsed_secs: 0,
        }
    }

    pub fn state(&self) -> ThinkingState {
        self.state
    }

    pub fn is_thinking(&self) -> bool {
        matches!(self.state, ThinkingState::Thinking { .. })
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed_secs
    }

    /// Activity ping. Idempotent: while already thinking it only pushes the
    /// debounce deadline out. Returns whether Idle → Thinking happened.
    pub fn start(&mut self, now: Instant) -> bool {
        let entered = match self.state {
            ThinkingState::Idle => {
                self.state = ThinkingState::Thinking { started_at: now };
                self.elapsed_secs = 0;
                self.tick_deadline = Some(now + TICK);
                true
            }
            ThinkingState::Thinking { .. } => false,
        };
        self.debounce_deadline = Some(now + DEBOUNCE);
        entered
    }

    /// Force Idle and drop all pending deadlines. Returns whether the state
    /// actually changed.
    pub fn stop(&mut self) -> bool {
        let was_thinking = self.is_thinking();
        self.state = ThinkingState::Idle;
        self.debounce_deadline = None;
        self.tick_deadline = None;
        self.elapsed_secs = 0;
        was_thinking
    }

    /// Earliest pending deadline, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.debounce_deadline, self.tick_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Resolve an elapsed deadline. The debounce wins over a tick expiring
    /// at the same instant.
    pub fn on_timer(&mut self, now: Instant) -> ThinkingTransition {
        if let Some(deadline) = self.debounce_deadline {
            if now >= deadline {
                self.stop();
                return ThinkingTransition::WentIdle;
            }
        }
        if let Some(deadline) = self.tick_deadline {
            if now >= deadline {
                self.elapsed_secs += 1;
                self.tick_deadline = Some(deadline + TICK);
                return ThinkingTransition::Tick;
            }
        }
        ThinkingTransition::None
    }
}

impl Default for ThinkingIndicator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    /// Drive every deadline up to `until`, counting Idle transitions.
    fn drain_timers(indicator: &mut ThinkingIndicator, until: Instant) -> usize {
        let mut idles = 0;
        while let Some(deadline) = indicator.next_deadline() {
            if deadline > until {
                break;
            }
            if indicator.on_timer(deadline) == ThinkingTransition::WentIdle {
                idles += 1;
            }
        }
        idles
    }

    #[test]
    fn pings_inside_the_window_keep_it_thinking() {
        let t0 = Instant::now();
        let mut indicator = ThinkingIndicator::new();
        assert!(indicator.start(t0));
        assert!(!indicator.start(t0 + ms(500)));
        assert!(!indicator.start(t0 + ms(1000)));

        // No deadline between the pings ever reaches the debounce.
        let idles = drain_timers(&mut indicator, t0 + ms(1000));
        assert_eq!(idles, 0);
        assert!(indicator.is_thinking());
    }

    #[test]
    fn silence_goes_idle_exactly_once() {
        let t0 = Instant::now();
        let mut indicator = ThinkingIndicator::new();
        indicator.start(t0);
        indicator.start(t0 + ms(500));
        indicator.start(t0 + ms(1000));

        let idles = drain_timers(&mut indicator, t0 + ms(2600));
        assert_eq!(idles, 1);
        assert!(!indicator.is_thinking());
        assert_eq!(indicator.next_deadline(), None);
    }

    #[test]
    fn ticks_advance_the_elapsed_counter() {
        let t0 = Instant::now();
        let mut indicator = ThinkingIndicator::new();
        indicator.start(t0);
        assert_eq!(indicator.on_timer(t0 + ms(1000)), ThinkingTransition::Tick);
        assert_eq!(indicator.elapsed_secs(), 1);
        // Keep it alive past the next tick.
        indicator.start(t0 + ms(1100));
        assert_eq!(indicator.on_timer(t0 + ms(2000)), ThinkingTransition::Tick);
        assert_eq!(indicator.elapsed_secs(), 2);
    }

    #[test]
    fn stop_clears_state_and_deadlines() {
        let t0 = Instant::now();
        let mut indicator = ThinkingIndicator::new();
        indicator.start(t0);
        assert!(indicator.stop());
        assert!(!indicator.stop());
        assert_eq!(indicator.state(), ThinkingState::Idle);
        assert_eq!(indicator.next_deadline(), None);
        assert_eq!(indicator.elapsed_secs(), 0);
    }

    #[test]
    fn restart_after_idle_resets_the_start_instant() {
        let t0 = Instant::now();
        let mut indicator = ThinkingIndicator::new();
        indicator.start(t0);
        drain_timers(&mut indicator, t0 + ms(2000));
        assert!(!indicator.is_thinking());

        let t1 = t0 + ms(5000);
        indicator.start(t1);
        match indicator.state() {
            ThinkingState::Thinking { started_at } => assert_eq!(started_at, t1),
            ThinkingState::Idle => panic!("should be thinking"),
        }
    }
}
