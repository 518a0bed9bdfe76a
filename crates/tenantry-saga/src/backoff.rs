use std::time::Duration;

/// Doubling delay between DNS attempts, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }

    /// Delay after the `attempt`-th failure (1-indexed)
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let multiplier = 2u32.saturating_pow(exponent);
        self.initial.saturating_mul(multiplier).min(self.max)
    }

    /// Total time spent sleeping across `attempts` attempts (no sleep after the last)
    pub fn total(&self, attempts: u32) -> Duration {
        (1..attempts).map(|a| self.delay(a)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_from_floor_to_ceiling() {
        let backoff = Backoff::new(Duration::from_secs(10), Duration::from_secs(300));
        let delays: Vec<u64> = (1..=7).map(|a| backoff.delay(a).as_secs()).collect();
        assert_eq!(delays, vec![10, 20, 40, 80, 160, 300, 300]);
    }

    #[test]
    fn seven_attempts_sleep_about_ten_minutes() {
        let backoff = Backoff::new(Duration::from_secs(10), Duration::from_secs(300));
        assert_eq!(backoff.total(7), Duration::from_secs(610));
        assert_eq!(backoff.total(1), Duration::ZERO);
    }

    #[test]
    fn huge_attempt_numbers_saturate() {
        let backoff = Backoff::new(Duration::from_secs(10), Duration::from_secs(300));
        assert_eq!(backoff.delay(u32::MAX), Duration::from_secs(300));
    }
}
