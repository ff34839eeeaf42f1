//! Single-shot idle timer, polled rather than fired.
//!
//! The mode poll task asks [`IdleTimer::expired`] each tick.  An expired
//! timer disarms itself; a mode that finds playback still running calls
//! [`start`](IdleTimer::start) again instead of transitioning.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct IdleTimer {
    window: Duration,
    deadline: Option<Instant>,
}

impl IdleTimer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    /// (Re)arm for one full window from `now`.
    pub fn start(&mut self, now: Instant) {
        self.deadline = Some(now + self.window);
    }

    pub fn stop(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// `true` exactly once when `now` reaches the deadline; the timer is
    /// disarmed by that call.
    pub fn expired(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_at_deadline() {
        let t0 = Instant::now();
        let mut timer = IdleTimer::new(Duration::from_secs(30));
        timer.start(t0);

        assert!(!timer.expired(t0 + Duration::from_secs(29)));
        assert!(timer.expired(t0 + Duration::from_secs(30)));
        assert!(!timer.expired(t0 + Duration::from_secs(31)));
        assert!(!timer.is_armed());
    }

    #[test]
    fn restart_moves_deadline() {
        let t0 = Instant::now();
        let mut timer = IdleTimer::new(Duration::from_millis(100));
        timer.start(t0);
        timer.start(t0 + Duration::from_millis(80));
        assert!(!timer.expired(t0 + Duration::from_millis(150)));
        assert_eq!(timer.deadline(), Some(t0 + Duration::from_millis(180)));
    }

    #[test]
    fn stopped_timer_never_fires() {
        let t0 = Instant::now();
        let mut timer = IdleTimer::new(Duration::from_millis(1));
        timer.start(t0);
        timer.stop();
        assert!(!timer.expired(t0 + Duration::from_secs(1)));
    }
}
