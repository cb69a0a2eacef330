use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Randomized pause between detail fetches so requests do not arrive at a fixed cadence.
#[derive(Debug, Clone, Copy)]
pub struct RateShaper {
    min_ms: u64,
    max_ms: u64,
}

impl RateShaper {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min_ms: min_ms.min(max_ms),
            max_ms: min_ms.max(max_ms),
        }
    }

    /// Uniform draw from `[min_ms, max_ms]`.
    pub fn next_delay(&self) -> Duration {
        Duration::from_millis(rand::random_range(self.min_ms..=self.max_ms))
    }

    /// Sleep before the fetch at position `index`; the first fetch goes straight out.
    pub async fn before_fetch(&self, index: usize) {
        if index == 0 {
            return;
        }
        let delay = self.next_delay();
        debug!("Pausing {:?} before fetch {}", delay, index + 1);
        sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[test]
    fn test_delay_stays_in_window() {
        let shaper = RateShaper::new(200, 500);
        for _ in 0..500 {
            let d = shaper.next_delay();
            assert!(d >= Duration::from_millis(200) && d <= Duration::from_millis(500));
        }
    }

    #[test]
    fn test_inverted_window_is_normalised() {
        let shaper = RateShaper::new(50, 10);
        let d = shaper.next_delay();
        assert!(d >= Duration::from_millis(10) && d <= Duration::from_millis(50));
        assert_eq!(RateShaper::new(0, 0).next_delay(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_fetch_is_not_delayed() {
        let shaper = RateShaper::new(200, 500);

        let start = Instant::now();
        shaper.before_fetch(0).await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        shaper.before_fetch(1).await;
        assert!(start.elapsed() >= Duration::from_millis(200));
    }
}
