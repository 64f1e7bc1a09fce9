use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Spaces consecutive requests by a random delay in `[min, max]`, measured
/// from the start of the previous request.
#[derive(Debug)]
pub struct RequestPacer {
    min: Duration,
    max: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RequestPacer {
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            min,
            max,
            last_request: Mutex::new(None),
        }
    }

    /// Fixed spacing for `per_second` requests per second.
    #[must_use]
    pub fn per_second(per_second: u32) -> Self {
        let interval = Duration::from_secs(1) / per_second.max(1);
        Self::new(interval, interval)
    }

    #[must_use]
    pub fn unpaced() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    fn pick_delay(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let min_ms = u64::try_from(self.min.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.max.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::random_range(min_ms..=max_ms))
    }

    /// Waits until this request may go out, then marks it as sent.
    pub async fn wait(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let delay = self.pick_delay();
            let elapsed = previous.elapsed();
            if elapsed < delay {
                tokio::time::sleep(delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn first_request_is_not_delayed() {
        let pacer = RequestPacer::new(Duration::from_secs(5), Duration::from_secs(5));
        let start = Instant::now();
        pacer.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn second_request_waits_at_least_min() {
        let pacer = RequestPacer::new(Duration::from_millis(1000), Duration::from_millis(1800));
        pacer.wait().await;
        let start = Instant::now();
        pacer.wait().await;
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(1000), "waited {waited:?}");
        assert!(waited <= Duration::from_millis(1800), "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn time_already_spent_counts_towards_delay() {
        let pacer = RequestPacer::new(Duration::from_millis(500), Duration::from_millis(500));
        pacer.wait().await;
        tokio::time::sleep(Duration::from_millis(400)).await;
        let start = Instant::now();
        pacer.wait().await;
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(100), "waited {waited:?}");
        assert!(waited < Duration::from_millis(500), "waited {waited:?}");
    }

    #[test]
    fn per_second_spacing() {
        let pacer = RequestPacer::per_second(50);
        assert_eq!(pacer.pick_delay(), Duration::from_millis(20));
    }
}
