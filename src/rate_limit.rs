use std::sync::Arc;
use std::time::{Duration, Instant};
use dashmap::DashMap;

use crate::config::ConfigError;

#[derive(Clone, Copy, Debug)]
struct Window {
    count: usize,
    expires_at: Instant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Allowed { remaining: usize },
    Limited { retry_after: Duration },
}

impl Decision {
    pub fn is_allowed(&self) -> bool { matches!(self, Decision::Allowed { .. }) }
}

/// Fixed window in-memory rate limiter (pod local).
#[derive(Clone)]
pub struct InMemoryRateLimiter {
    store: Arc<DashMap<String, Window>>,
    pub enabled: bool,
}

impl InMemoryRateLimiter {
    pub fn new(enabled: bool) -> Self {
        Self { store: Arc::new(DashMap::new()), enabled }
    }

    pub fn check(&self, key: &str, limit: usize, window: Duration) -> Decision {
        self.check_at(key, limit, window, Instant::now())
    }

    fn check_at(&self, key: &str, limit: usize, window: Duration, now: Instant) -> Decision {
        if !self.enabled { return Decision::Allowed { remaining: limit }; }
        let mut entry = self.store.entry(key.to_string()).or_insert(Window { count: 0, expires_at: now + window });
        if now >= entry.expires_at {
            *entry = Window { count: 0, expires_at: now + window };
        }
        if entry.count < limit {
            entry.count += 1;
            Decision::Allowed { remaining: limit - entry.count }
        } else {
            Decision::Limited { retry_after: entry.expires_at.saturating_duration_since(now) }
        }
    }

    /// Drops finished windows; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.store.len();
        self.store.retain(|_, w| w.expires_at > now);
        before.saturating_sub(self.store.len())
    }

    pub fn tracked_keys(&self) -> usize { self.store.len() }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BucketLimit {
    pub limit: usize,
    pub window: Duration,
}

/// Per-bucket limits derived from env.
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub auth: BucketLimit,
    pub supplier: BucketLimit,
    pub checkout: BucketLimit,
    pub api: BucketLimit,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let b = |limit, secs| BucketLimit { limit, window: Duration::from_secs(secs) };
        Self { auth: b(10, 60), supplier: b(3, 3600), checkout: b(10, 60), api: b(120, 60) }
    }
}

impl RateLimitConfig {
    pub fn from_lookup(get: &impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        fn read(get: &impl Fn(&str) -> Option<String>, name: &'static str, default: u64) -> Result<u64, ConfigError> {
            match get(name) {
                None => Ok(default),
                Some(v) => v.trim().parse().map_err(|_| ConfigError::Invalid { name, value: v }),
            }
        }
        fn bucket(get: &impl Fn(&str) -> Option<String>, limit: &'static str, window: &'static str, d: BucketLimit) -> Result<BucketLimit, ConfigError> {
            Ok(BucketLimit {
                limit: read(get, limit, d.limit as u64)? as usize,
                window: Duration::from_secs(read(get, window, d.window.as_secs())?),
            })
        }
        let d = Self::default();
        Ok(Self {
            auth: bucket(get, "RL_AUTH_LIMIT", "RL_AUTH_WINDOW", d.auth)?,
            supplier: bucket(get, "RL_SUPPLIER_LIMIT", "RL_SUPPLIER_WINDOW", d.supplier)?,
            checkout: bucket(get, "RL_CHECKOUT_LIMIT", "RL_CHECKOUT_WINDOW", d.checkout)?,
            api: bucket(get, "RL_API_LIMIT", "RL_API_WINDOW", d.api)?,
        })
    }

    pub fn rule(&self, bucket: Bucket) -> BucketLimit {
        match bucket {
            Bucket::Auth => self.auth,
            Bucket::Supplier => self.supplier,
            Bucket::Checkout => self.checkout,
            Bucket::Api => self.api,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bucket {
    Auth,
    Supplier,
    Checkout,
    Api,
}

impl Bucket {
    pub fn name(self) -> &'static str {
        match self {
            Bucket::Auth => "auth",
            Bucket::Supplier => "supplier",
            Bucket::Checkout => "checkout",
            Bucket::Api => "api",
        }
    }
}

/// High level guard used by the middleware.
#[derive(Clone)]
pub struct RateLimiterFacade {
    pub limiter: InMemoryRateLimiter,
    pub cfg: RateLimitConfig,
}

impl RateLimiterFacade {
    pub fn new(limiter: InMemoryRateLimiter, cfg: RateLimitConfig) -> Self { Self { limiter, cfg } }

    pub fn check(&self, bucket: Bucket, client: &str) -> Decision {
        let b = self.cfg.rule(bucket);
        self.limiter.check(&format!("{}:{client}", bucket.name()), b.limit, b.window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_window_basic() {
        let rl = InMemoryRateLimiter::new(true);
        let window = Duration::from_secs(60);
        let t0 = Instant::now();
        assert_eq!(rl.check_at("k", 3, window, t0), Decision::Allowed { remaining: 2 });
        assert!(rl.check_at("k", 3, window, t0).is_allowed());
        assert_eq!(rl.check_at("k", 3, window, t0), Decision::Allowed { remaining: 0 });
        let later = t0 + Duration::from_secs(20);
        assert_eq!(rl.check_at("k", 3, window, later), Decision::Limited { retry_after: Duration::from_secs(40) });
        // other keys are independent
        assert!(rl.check_at("other", 3, window, later).is_allowed());
    }

    #[test]
    fn window_resets_on_expiry() {
        let rl = InMemoryRateLimiter::new(true);
        let window = Duration::from_secs(10);
        let t0 = Instant::now();
        assert!(rl.check_at("k", 1, window, t0).is_allowed());
        assert!(!rl.check_at("k", 1, window, t0 + Duration::from_secs(9)).is_allowed());
        // the window is fixed: rejected attempts do not extend it
        assert!(rl.check_at("k", 1, window, t0 + Duration::from_secs(10)).is_allowed());
    }

    #[test]
    fn disabled_limiter_allows_everything() {
        let rl = InMemoryRateLimiter::new(false);
        for _ in 0..10 { assert!(rl.check("k", 1, Duration::from_secs(60)).is_allowed()); }
        assert_eq!(rl.tracked_keys(), 0);
    }

    #[test]
    fn purge_drops_only_finished_windows() {
        let rl = InMemoryRateLimiter::new(true);
        rl.check("short", 1, Duration::ZERO);
        rl.check("long", 1, Duration::from_secs(600));
        assert_eq!(rl.purge_expired(), 1);
        assert_eq!(rl.tracked_keys(), 1);
    }

    #[test]
    fn buckets_are_keyed_separately() {
        let mut cfg = RateLimitConfig::default();
        cfg.auth = BucketLimit { limit: 1, window: Duration::from_secs(60) };
        let f = RateLimiterFacade::new(InMemoryRateLimiter::new(true), cfg);
        assert!(f.check(Bucket::Auth, "1.2.3.4").is_allowed());
        assert!(!f.check(Bucket::Auth, "1.2.3.4").is_allowed());
        assert!(f.check(Bucket::Auth, "5.6.7.8").is_allowed());
        assert!(f.check(Bucket::Api, "1.2.3.4").is_allowed());
    }
}
