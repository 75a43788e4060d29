use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::models::ClientIdentity;

pub const WINDOW_SECS: i64 = 60;
pub const PER_IP_LIMIT: u32 = 10;
const MAX_RATE_LIMIT_ENTRIES: usize = 10_000;

pub trait RateLimit: Send + Sync {
    /// Records one request for `identity` and reports whether it is within the limit.
    fn check(&self, identity: &ClientIdentity) -> bool;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateWindow {
    pub count: u32,
    pub reset_at: DateTime<Utc>,
}

/// Fixed-window counter per client, local to this process.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    windows: DashMap<String, RateWindow>,
    window: Duration,
    limit: u32,
}

impl Default for FixedWindowLimiter {
    fn default() -> Self {
        Self::new(Duration::seconds(WINDOW_SECS), PER_IP_LIMIT)
    }
}

impl FixedWindowLimiter {
    pub fn new(window: Duration, limit: u32) -> Self {
        Self {
            windows: DashMap::new(),
            window,
            limit,
        }
    }

    pub fn check_at(&self, identity: &str, now: DateTime<Utc>) -> bool {
        if self.windows.len() > MAX_RATE_LIMIT_ENTRIES {
            self.evict_expired(now);
        }

        // The entry guard holds the shard lock, so increments for one key never interleave.
        match self.windows.entry(identity.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(RateWindow {
                    count: 1,
                    reset_at: now + self.window,
                });
                true
            }
            Entry::Occupied(mut slot) => {
                let window = slot.get_mut();
                if now > window.reset_at {
                    window.count = 1;
                    window.reset_at = now + self.window;
                    return true;
                }
                window.count = window.count.saturating_add(1);
                window.count <= self.limit
            }
        }
    }

    /// Drops windows that have already expired. Returns how many were removed.
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, w| w.reset_at >= now);
        let removed = before.saturating_sub(self.windows.len());
        if removed > 0 {
            debug!("Evicted {} expired rate-limit windows", removed);
        }
        removed
    }

    pub fn window_for(&self, identity: &str) -> Option<RateWindow> {
        self.windows.get(identity).map(|w| w.clone())
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

impl RateLimit for FixedWindowLimiter {
    fn check(&self, identity: &ClientIdentity) -> bool {
        self.check_at(identity.as_str(), Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn eleventh_request_in_window_is_rejected() {
        let limiter = FixedWindowLimiter::default();
        for i in 0..10 {
            assert!(
                limiter.check_at("1.1.1.1", t0() + Duration::seconds(i)),
                "request {} should pass",
                i + 1
            );
        }
        assert!(!limiter.check_at("1.1.1.1", t0() + Duration::seconds(10)));
        // Other clients are unaffected.
        assert!(limiter.check_at("2.2.2.2", t0() + Duration::seconds(10)));
    }

    #[test]
    fn next_window_starts_fresh() {
        let limiter = FixedWindowLimiter::default();
        for _ in 0..15 {
            limiter.check_at("1.1.1.1", t0());
        }
        let reset_at = t0() + Duration::seconds(WINDOW_SECS);
        // Still inside the window at exactly reset_at.
        assert!(!limiter.check_at("1.1.1.1", reset_at));
        assert!(limiter.check_at("1.1.1.1", reset_at + Duration::milliseconds(1)));
        assert_eq!(limiter.window_for("1.1.1.1").unwrap().count, 1);

        let later = FixedWindowLimiter::default();
        later.check_at("3.3.3.3", t0());
        assert!(later.check_at("3.3.3.3", t0() + Duration::seconds(61)));
        assert_eq!(later.window_for("3.3.3.3").unwrap().count, 1);
    }

    #[test]
    fn evicts_only_expired_windows() {
        let limiter = FixedWindowLimiter::default();
        limiter.check_at("old", t0());
        limiter.check_at("new", t0() + Duration::seconds(50));
        let removed = limiter.evict_expired(t0() + Duration::seconds(70));
        assert_eq!(removed, 1);
        assert!(limiter.window_for("old").is_none());
        assert!(limiter.window_for("new").is_some());
    }

    #[test]
    fn concurrent_checks_do_not_lose_increments() {
        let limiter = Arc::new(FixedWindowLimiter::new(Duration::seconds(60), 1_000));
        let now = t0();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        limiter.check_at("same", now);
                        limiter.check_at("other", now);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(limiter.window_for("same").unwrap().count, 800);
        assert_eq!(limiter.window_for("other").unwrap().count, 800);
    }

    #[test]
    fn exactly_limit_requests_pass_under_contention() {
        let limiter = Arc::new(FixedWindowLimiter::default());
        let now = t0();
        let handles: Vec<_> = (0..50)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || limiter.check_at("burst", now))
            })
            .collect();
        let allowed = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(allowed, PER_IP_LIMIT as usize);
    }
}
