use std::time::{Duration, Instant};

/// Yields the points in time at which a failed attempt should be retried.
///
/// The wait time starts at 50ms and doubles after every attempt up to one
/// second.
pub struct ExponentialBackoff {
    current_wait_time: Duration,
    max_wait_time: Duration,
}

impl ExponentialBackoff {
    pub fn new() -> Self {
        Self {
            current_wait_time: Duration::from_millis(50),
            max_wait_time: Duration::from_secs(1),
        }
    }
}

impl Iterator for ExponentialBackoff {
    type Item = Instant;

    fn next(&mut self) -> Option<Self::Item> {
        let now = Instant::now();
        let wait_time = self.current_wait_time;
        self.current_wait_time *= 2;
        if self.current_wait_time > self.max_wait_time {
            self.current_wait_time = self.max_wait_time;
        }
        Some(now + wait_time)
    }
}

pub fn sleep_until(instant: Instant) {
    std::thread::sleep(instant.saturating_duration_since(Instant::now()));
}
