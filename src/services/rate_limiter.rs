//! Per-client rate limiter
//!
//! Sliding-window log: each client keeps the arrival instants of its admitted
//! requests. A limiter has one or more tiers, each a `limit` over a `window`,
//! and a request is admitted only when every tier still has room. Instants
//! older than the longest window are pruned.
//!
//! Updates for one client run under that client's map shard lock, so concurrent
//! requests from the same client can never be admitted past the limit.
//! Clients whose whole log has expired are evicted lazily; an expired log
//! carries no budget, so eviction is indistinguishable from a fresh window.

use crate::config::RateLimitConfig;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

const MINUTE: Duration = Duration::from_secs(60);

/// Outcome of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Admitted and recorded
    Admitted { remaining: u32 },
    /// Rejected; nothing recorded
    Limited { retry_after: Duration },
}

impl RateDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, RateDecision::Admitted { .. })
    }
}

/// `limit` admissions within any span of `window`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Tier {
    limit: u32,
    window: Duration,
}

impl Tier {
    /// Entries of `log` still inside this tier's window at `now`
    fn in_window(&self, log: &VecDeque<Instant>, now: Instant) -> usize {
        log.iter()
            .rev()
            .take_while(|&&at| now.saturating_duration_since(at) < self.window)
            .count()
    }

    /// Time until enough entries leave the window to admit one more
    ///
    /// Only called when the window already holds `limit` or more entries.
    fn retry_after(&self, log: &VecDeque<Instant>, now: Instant) -> Duration {
        let blocking = log.len().saturating_sub(self.limit as usize);
        log.get(blocking)
            .map(|&at| self.window.saturating_sub(now.saturating_duration_since(at)))
            .unwrap_or(self.window)
    }
}

pub struct RateLimiter {
    tiers: Vec<Tier>,
    horizon: Duration,
    clients: DashMap<String, VecDeque<Instant>>,
    last_sweep: Mutex<Instant>,
}

impl RateLimiter {
    /// Create a limiter admitting `limit` requests per `window`
    pub fn new(limit: u32, window: Duration) -> Self {
        Self::with_tiers(vec![Tier {
            limit: limit.max(1),
            window,
        }])
    }

    fn with_tiers(tiers: Vec<Tier>) -> Self {
        let horizon = tiers.iter().map(|t| t.window).max().unwrap_or(MINUTE);
        Self {
            tiers,
            horizon,
            clients: DashMap::new(),
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    /// Create a limiter from configuration
    ///
    /// `requests_per_minute` is scaled to the configured window. Unless the
    /// window is exactly one minute, a second tier caps any 60 s span at
    /// `requests_per_minute` as well.
    pub fn from_config(config: &RateLimitConfig) -> Self {
        let rpm = config.requests_per_minute.max(1);
        let window = Duration::from_secs(config.window_seconds);

        let per_window = (rpm as u64).saturating_mul(config.window_seconds) / 60;
        let mut tiers = vec![Tier {
            limit: u32::try_from(per_window).unwrap_or(u32::MAX).max(1),
            window,
        }];

        if window != MINUTE {
            tiers.push(Tier {
                limit: rpm,
                window: MINUTE,
            });
        }

        Self::with_tiers(tiers)
    }

    /// Limit of the configured window
    pub fn limit(&self) -> u32 {
        self.tiers[0].limit
    }

    pub fn window(&self) -> Duration {
        self.tiers[0].window
    }

    /// Most admissions allowed in any 60 s span
    pub fn per_minute_cap(&self) -> Option<u32> {
        self.tiers
            .iter()
            .filter(|t| t.window >= MINUTE)
            .map(|t| t.limit)
            .min()
    }

    /// Check and record a request arriving now
    pub fn check(&self, client: &str) -> RateDecision {
        self.check_at(client, Instant::now())
    }

    /// Check and record a request arriving at `now`
    pub fn check_at(&self, client: &str, now: Instant) -> RateDecision {
        self.maybe_sweep(now);

        let mut entry = self.clients.entry(client.to_string()).or_default();
        let log = entry.value_mut();

        while let Some(&oldest) = log.front() {
            if now.saturating_duration_since(oldest) >= self.horizon {
                log.pop_front();
            } else {
                break;
            }
        }

        let mut remaining = u32::MAX;
        let mut retry_after: Option<Duration> = None;

        for tier in &self.tiers {
            let count = tier.in_window(log, now);
            if count >= tier.limit as usize {
                let wait = tier.retry_after(log, now);
                retry_after = Some(retry_after.map_or(wait, |w| w.max(wait)));
            } else {
                remaining = remaining.min(tier.limit - count as u32 - 1);
            }
        }

        if let Some(retry_after) = retry_after {
            debug!("Client {} limited, retry after {:?}", client, retry_after);
            return RateDecision::Limited { retry_after };
        }

        log.push_back(now);
        RateDecision::Admitted { remaining }
    }

    /// Number of clients currently holding state
    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }

    /// Drop clients with no request inside the longest window ending at `now`
    pub fn evict_idle(&self, now: Instant) -> usize {
        let before = self.clients.len();
        let horizon = self.horizon;

        self.clients.retain(|_, log| {
            log.back()
                .map(|&newest| now.saturating_duration_since(newest) < horizon)
                .unwrap_or(false)
        });

        let evicted = before.saturating_sub(self.clients.len());
        if evicted > 0 {
            debug!("Evicted {} idle rate limit entries", evicted);
        }
        evicted
    }

    /// Sweep at most once per window; skipped when another thread is sweeping
    fn maybe_sweep(&self, now: Instant) {
        let due = match self.last_sweep.try_lock() {
            Ok(mut last) => {
                if now.saturating_duration_since(*last) >= self.horizon {
                    *last = now;
                    true
                } else {
                    false
                }
            }
            Err(std::sync::TryLockError::Poisoned(poisoned)) => {
                *PoisonError::into_inner(poisoned) = now;
                true
            }
            Err(std::sync::TryLockError::WouldBlock) => false,
        };

        if due {
            self.evict_idle(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admits_up_to_limit() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let now = Instant::now();

        assert_eq!(limiter.check_at("a", now), RateDecision::Admitted { remaining: 2 });
        assert_eq!(limiter.check_at("a", now), RateDecision::Admitted { remaining: 1 });
        assert_eq!(limiter.check_at("a", now), RateDecision::Admitted { remaining: 0 });
        assert!(!limiter.check_at("a", now).is_admitted());
    }

    #[test]
    fn test_clients_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();

        assert!(limiter.check_at("a", now).is_admitted());
        assert!(limiter.check_at("b", now).is_admitted());
        assert!(!limiter.check_at("a", now).is_admitted());
    }

    #[test]
    fn test_retry_after_counts_down_from_oldest() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let start = Instant::now();

        assert!(limiter.check_at("a", start).is_admitted());
        let decision = limiter.check_at("a", start + Duration::from_secs(20));

        assert_eq!(decision, RateDecision::Limited { retry_after: Duration::from_secs(40) });
    }

    #[test]
    fn test_window_boundary_belongs_to_new_window() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let start = Instant::now();

        assert!(limiter.check_at("a", start).is_admitted());
        assert!(!limiter.check_at("a", start + Duration::from_millis(59_999)).is_admitted());
        assert!(limiter.check_at("a", start + Duration::from_secs(60)).is_admitted());
    }

    #[test]
    fn test_rejections_do_not_consume_budget() {
        let limiter = RateLimiter::new(2, Duration::from_secs(10));
        let start = Instant::now();

        assert!(limiter.check_at("a", start).is_admitted());
        assert!(limiter.check_at("a", start + Duration::from_secs(5)).is_admitted());
        for _ in 0..10 {
            assert!(!limiter.check_at("a", start + Duration::from_secs(6)).is_admitted());
        }
        // Only the first admission has expired
        assert!(limiter.check_at("a", start + Duration::from_secs(10)).is_admitted());
        assert!(!limiter.check_at("a", start + Duration::from_secs(11)).is_admitted());
    }

    #[test]
    fn test_eviction_keeps_active_clients() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();

        limiter.check_at("idle", start);
        limiter.check_at("active", start + Duration::from_secs(50));

        let evicted = limiter.evict_idle(start + Duration::from_secs(70));
        assert_eq!(evicted, 1);
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn test_eviction_never_grants_extra_budget() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();

        assert!(limiter.check_at("a", start).is_admitted());
        assert!(limiter.check_at("a", start + Duration::from_secs(30)).is_admitted());

        // "a" is still active, so a sweep must keep its log
        limiter.evict_idle(start + Duration::from_secs(61));
        assert!(limiter.check_at("a", start + Duration::from_secs(61)).is_admitted());
        assert!(!limiter.check_at("a", start + Duration::from_secs(62)).is_admitted());
    }

    #[test]
    fn test_from_config_scales_to_window() {
        let config = RateLimitConfig {
            enabled: true,
            requests_per_minute: 60,
            window_seconds: 10,
        };
        let limiter = RateLimiter::from_config(&config);
        assert_eq!(limiter.limit(), 10);

        let config = RateLimitConfig {
            enabled: true,
            requests_per_minute: 1,
            window_seconds: 1,
        };
        assert_eq!(RateLimiter::from_config(&config).limit(), 1);
    }
}
