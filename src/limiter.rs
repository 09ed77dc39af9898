use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

/// Per-identity sliding-window admission control.
///
/// One timestamp window per user id, shared between the poll loop and the
/// webhook workers. The DashMap entry lock makes the read-evict-append
/// sequence atomic per identity, so `max_messages` cannot be exceeded even
/// under concurrent admits for the same user.
pub struct RateLimiter {
    max_messages: usize,
    window: Duration,
    windows: DashMap<u64, Vec<Instant>>,
}

impl RateLimiter {
    pub fn new(max_messages: usize, window: Duration) -> Self {
        Self { max_messages, window, windows: DashMap::new() }
    }

    /// Admit or reject one message from `identity` at `now`.
    ///
    /// Rejection is expected backpressure, not a failure: callers must not
    /// log it as an error. Nobody is ever banned permanently; once enough
    /// of the window slides past, admits succeed again.
    pub fn admit(&self, identity: u64, now: Instant) -> bool {
        let mut times = self.windows.entry(identity).or_default();
        times.retain(|t| now.duration_since(*t) < self.window);
        if times.len() >= self.max_messages {
            return false;
        }
        times.push(now);
        true
    }

    /// Evict stale timestamps everywhere and drop identities whose window
    /// is empty. Called periodically to bound memory.
    pub fn purge(&self, now: Instant) {
        self.windows.retain(|_, times| {
            times.retain(|t| now.duration_since(*t) < self.window);
            !times.is_empty()
        });
        debug!("rate limiter purge done, {} identities tracked", self.windows.len());
    }

    /// Number of identities currently holding a window.
    pub fn tracked(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: usize, window_secs: u64) -> RateLimiter {
        RateLimiter::new(max, Duration::from_secs(window_secs))
    }

    #[test]
    fn admits_up_to_max_then_rejects() {
        let limiter = limiter(10, 60);
        let now = Instant::now();
        for _ in 0..10 {
            assert!(limiter.admit(1, now));
        }
        assert!(!limiter.admit(1, now));
        assert!(!limiter.admit(1, now));
    }

    #[test]
    fn rejection_does_not_extend_the_window() {
        let limiter = limiter(2, 60);
        let start = Instant::now();
        assert!(limiter.admit(1, start));
        assert!(limiter.admit(1, start));
        // Rejected calls must not record timestamps, so the window still
        // clears when the original two entries expire.
        for i in 0..5 {
            assert!(!limiter.admit(1, start + Duration::from_secs(i)));
        }
        assert!(limiter.admit(1, start + Duration::from_secs(60)));
    }

    #[test]
    fn window_slides_rather_than_resets() {
        let limiter = limiter(2, 60);
        let start = Instant::now();
        assert!(limiter.admit(1, start));
        assert!(limiter.admit(1, start + Duration::from_secs(30)));
        assert!(!limiter.admit(1, start + Duration::from_secs(59)));
        // First entry has aged out, second has not.
        assert!(limiter.admit(1, start + Duration::from_secs(61)));
        assert!(!limiter.admit(1, start + Duration::from_secs(62)));
    }

    #[test]
    fn identities_are_independent() {
        let limiter = limiter(1, 60);
        let now = Instant::now();
        assert!(limiter.admit(1, now));
        assert!(limiter.admit(2, now));
        assert!(!limiter.admit(1, now));
        assert!(!limiter.admit(2, now));
    }

    #[test]
    fn purge_drops_idle_identities() {
        let limiter = limiter(5, 60);
        let start = Instant::now();
        limiter.admit(1, start);
        limiter.admit(2, start);
        limiter.admit(3, start + Duration::from_secs(50));
        assert_eq!(limiter.tracked(), 3);
        limiter.purge(start + Duration::from_secs(70));
        assert_eq!(limiter.tracked(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_admits_never_exceed_max() {
        use std::sync::Arc;

        let limiter = Arc::new(limiter(10, 60));
        let now = Instant::now();
        let mut tasks = Vec::new();
        for _ in 0..4 {
            let limiter = limiter.clone();
            tasks.push(tokio::spawn(async move {
                (0..25).filter(|_| limiter.admit(7, now)).count()
            }));
        }
        let mut admitted = 0;
        for task in tasks {
            admitted += task.await.unwrap();
        }
        assert_eq!(admitted, 10);
    }
}
