use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Minimum interval between consecutive remote calls.
///
/// Backends impose rate limits; every adapter awaits [`Pacer::wait`] before
/// each request. This is pacing only: failures are not retried.
#[derive(Debug)]
pub struct Pacer {
    min_interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_slot: Mutex::new(None),
        }
    }

    pub fn from_millis(millis: u64) -> Self {
        Self::new(Duration::from_millis(millis))
    }

    /// A pacer that never waits.
    pub fn unpaced() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until at least `min_interval` has passed since the previous call
    /// was released. The first call never waits.
    pub async fn wait(&self) {
        if self.min_interval.is_zero() {
            return;
        }

        let delay = {
            let mut next_slot = self.next_slot.lock().unwrap_or_else(|e| e.into_inner());
            let now = Instant::now();
            let release = match *next_slot {
                Some(slot) if slot > now => slot,
                _ => now,
            };
            *next_slot = Some(release + self.min_interval);
            release - now
        };

        if !delay.is_zero() {
            log::debug!("Pacing: waiting {:?} before next call", delay);
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for Pacer {
    fn default() -> Self {
        Self::unpaced()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_call_does_not_wait() {
        let pacer = Pacer::from_millis(500);
        let start = Instant::now();
        pacer.wait().await;
        assert!(start.elapsed() < Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_consecutive_calls_are_spaced() {
        let pacer = Pacer::from_millis(60);
        let start = Instant::now();
        pacer.wait().await;
        pacer.wait().await;
        pacer.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(120));
    }

    #[tokio::test]
    async fn test_unpaced_never_waits() {
        let pacer = Pacer::unpaced();
        let start = Instant::now();
        for _ in 0..100 {
            pacer.wait().await;
        }
        assert!(start.elapsed() < Duration::from_millis(100));
        assert!(pacer.min_interval().is_zero());
    }
}
