//! Login rate limiting.
//!
//! Fixed one-minute windows, counted per client IP with a global
//! backstop. State is in-process; a restart clears it, which is
//! acceptable for a single back-office server.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Rate limit violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitError {
    /// This IP sent too many login attempts in the window.
    PerIpExceeded,
    /// The whole server is seeing too many login attempts.
    GlobalExceeded,
}

/// Fixed-window login rate limiter.
pub struct LoginRateLimiter {
    window: Duration,
    per_ip_limit: u32,
    global_limit: u32,
    inner: Mutex<Windows>,
}

struct Windows {
    started: Instant,
    per_ip: HashMap<IpAddr, u32>,
    global: u32,
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new(Duration::from_secs(60), 10, 200)
    }
}

impl LoginRateLimiter {
    pub fn new(window: Duration, per_ip_limit: u32, global_limit: u32) -> Self {
        Self {
            window,
            per_ip_limit,
            global_limit,
            inner: Mutex::new(Windows {
                started: Instant::now(),
                per_ip: HashMap::new(),
                global: 0,
            }),
        }
    }

    /// Records an attempt from `ip` and decides whether it may proceed.
    pub fn check(&self, ip: IpAddr) -> Result<(), RateLimitError> {
        let mut windows = self.inner.lock().expect("rate limiter lock poisoned");

        if windows.started.elapsed() >= self.window {
            windows.started = Instant::now();
            windows.per_ip.clear();
            windows.global = 0;
        }

        if windows.global >= self.global_limit {
            return Err(RateLimitError::GlobalExceeded);
        }

        let count = windows.per_ip.entry(ip).or_insert(0);
        if *count >= self.per_ip_limit {
            return Err(RateLimitError::PerIpExceeded);
        }

        *count += 1;
        windows.global += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([127, 0, 0, last])
    }

    #[test]
    fn allows_up_to_the_limit() {
        let limiter = LoginRateLimiter::new(Duration::from_secs(60), 3, 100);

        for _ in 0..3 {
            assert!(limiter.check(ip(1)).is_ok());
        }
        assert_eq!(limiter.check(ip(1)), Err(RateLimitError::PerIpExceeded));

        // A different IP is unaffected
        assert!(limiter.check(ip(2)).is_ok());
    }

    #[test]
    fn global_backstop() {
        let limiter = LoginRateLimiter::new(Duration::from_secs(60), 100, 4);

        assert!(limiter.check(ip(1)).is_ok());
        assert!(limiter.check(ip(2)).is_ok());
        assert!(limiter.check(ip(3)).is_ok());
        assert!(limiter.check(ip(4)).is_ok());
        assert_eq!(limiter.check(ip(5)), Err(RateLimitError::GlobalExceeded));
    }

    #[test]
    fn window_reset() {
        let limiter = LoginRateLimiter::new(Duration::from_millis(10), 1, 100);

        assert!(limiter.check(ip(1)).is_ok());
        assert_eq!(limiter.check(ip(1)), Err(RateLimitError::PerIpExceeded));

        std::thread::sleep(Duration::from_millis(15));
        assert!(limiter.check(ip(1)).is_ok());
    }
}
