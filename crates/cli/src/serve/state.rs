//! Application state and rate limiting.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use reap_registry::FarmRegistry;
use reap_storage::MemoryStorage;
use tokio::sync::Mutex;

use super::RATE_LIMIT_WINDOW_SECS;

/// Tracked clients above which expired windows are swept on the next check.
const SWEEP_THRESHOLD: usize = 1024;

/// One client's fixed window.
#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u64,
}

impl Window {
    fn expired(&self, now: Instant, length: Duration) -> bool {
        now.duration_since(self.started) >= length
    }
}

/// In-memory fixed-window rate limiter keyed by client IP.
pub(crate) struct RateLimiter {
    windows: Mutex<HashMap<IpAddr, Window>>,
    /// Maximum requests per window.
    pub(crate) max_requests: u64,
    window: Duration,
}

impl RateLimiter {
    pub(crate) fn new(max_requests: u64) -> Self {
        Self::with_window(max_requests, Duration::from_secs(RATE_LIMIT_WINDOW_SECS))
    }

    fn with_window(max_requests: u64, window: Duration) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            max_requests,
            window,
        }
    }

    /// Count a request from `ip`. Returns the seconds until the window
    /// resets when the client is over its limit.
    pub(crate) async fn check(&self, ip: IpAddr) -> Result<(), u64> {
        let mut windows = self.windows.lock().await;
        let now = Instant::now();

        if windows.len() >= SWEEP_THRESHOLD {
            let length = self.window;
            windows.retain(|_, w| !w.expired(now, length));
        }

        let window = windows.entry(ip).or_insert(Window {
            started: now,
            count: 0,
        });
        if window.expired(now, self.window) {
            *window = Window {
                started: now,
                count: 0,
            };
        }

        window.count += 1;
        if window.count <= self.max_requests {
            return Ok(());
        }
        let remaining = self.window.saturating_sub(now.duration_since(window.started));
        // Round up so clients never retry inside the window.
        Err(remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0))
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.windows.lock().await.len()
    }
}

/// Application state shared across request handlers.
pub(crate) struct AppState {
    /// The registry served by this process.
    pub(crate) registry: FarmRegistry<MemoryStorage>,
    /// Per-IP rate limiter.
    pub(crate) rate_limiter: RateLimiter,
    /// Optional API key for authentication. None = no auth required.
    pub(crate) api_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    #[tokio::test]
    async fn rate_limiter_blocks_after_max_requests() {
        let limiter = RateLimiter::new(2);
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(limiter.check(ip).await.is_ok());
        assert!(limiter.check(ip).await.is_ok());
        let retry_after = limiter.check(ip).await.unwrap_err();
        assert!((1..=RATE_LIMIT_WINDOW_SECS).contains(&retry_after));

        // Other clients have their own window.
        let other: IpAddr = "10.0.0.2".parse().unwrap();
        assert!(limiter.check(other).await.is_ok());
    }

    #[tokio::test]
    async fn expired_window_admits_client_again() {
        let limiter = RateLimiter::with_window(1, Duration::from_millis(200));
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(limiter.check(ip).await.is_ok());
        assert_eq!(limiter.check(ip).await, Err(1));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(limiter.check(ip).await.is_ok());
    }

    #[tokio::test]
    async fn idle_clients_are_swept() {
        let limiter = RateLimiter::with_window(5, Duration::from_millis(10));
        for n in 0..SWEEP_THRESHOLD as u32 {
            limiter.check(IpAddr::V4(Ipv4Addr::from(n))).await.unwrap();
        }
        assert_eq!(limiter.tracked().await, SWEEP_THRESHOLD);

        tokio::time::sleep(Duration::from_millis(30)).await;
        limiter.check("192.0.2.1".parse().unwrap()).await.unwrap();
        assert_eq!(limiter.tracked().await, 1);
    }
}
