//! Per-domain token bucket rate limiting.
//!
//! Each key (normally a domain) gets its own bucket, created lazily on first
//! use. Refill happens lazily at acquire time, so an idle bucket costs nothing
//! until it is touched again.

use crate::error::{Result, ScanError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

/// How often a blocked caller re-checks its bucket
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound applied to any blocking acquire timeout
pub const MAX_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(300);

/// A single token bucket
#[derive(Debug)]
pub struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket holding `capacity` tokens, refilled at `refill_rate` tokens per second
    pub fn new(refill_rate: f64, capacity: f64) -> Self {
        Self {
            tokens: capacity,
            capacity,
            refill_rate,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Take `tokens` if available, otherwise return how long until they will be
    pub fn try_take(&mut self, tokens: f64) -> std::result::Result<(), Duration> {
        self.refill();

        if self.tokens >= tokens {
            self.tokens -= tokens;
            return Ok(());
        }

        let wait_secs = (tokens - self.tokens) / self.refill_rate;
        Err(Duration::from_secs_f64(wait_secs.max(0.0)))
    }

    /// Refill the bucket to capacity
    pub fn reset(&mut self) {
        self.tokens = self.capacity;
        self.last_refill = Instant::now();
    }

    pub fn available(&self) -> f64 {
        self.tokens
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_refill)
    }
}

/// Token bucket limiter keyed by domain.
///
/// Cloning shares the underlying buckets, so one limiter can be handed to
/// several concurrent scans of the same domain.
#[derive(Debug, Clone)]
pub struct DomainRateLimiter {
    buckets: Arc<Mutex<HashMap<String, Arc<Mutex<TokenBucket>>>>>,
    rate: f64,
    capacity: f64,
}

impl DomainRateLimiter {
    /// Limiter admitting `requests_per_second` with a burst of twice that.
    /// A rate of zero or less disables limiting.
    pub fn new(requests_per_second: f64) -> Self {
        Self::with_capacity(requests_per_second, requests_per_second * 2.0)
    }

    pub fn with_capacity(requests_per_second: f64, capacity: f64) -> Self {
        Self {
            buckets: Arc::new(Mutex::new(HashMap::new())),
            rate: requests_per_second,
            capacity,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.rate > 0.0
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    async fn bucket(&self, key: &str) -> Arc<Mutex<TokenBucket>> {
        let mut buckets = self.buckets.lock().await;
        buckets
            .entry(key.to_string())
            .or_insert_with(|| {
                debug!("Creating rate limit bucket for {}", key);
                Arc::new(Mutex::new(TokenBucket::new(self.rate, self.capacity)))
            })
            .clone()
    }

    /// Non-blocking acquire. Fails with `RateLimitExceeded` carrying the number
    /// of seconds until enough tokens will have accrued.
    pub async fn try_acquire(&self, key: &str, tokens: u32) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        let bucket = self.bucket(key).await;
        let mut bucket = bucket.lock().await;
        bucket
            .try_take(f64::from(tokens))
            .map_err(|wait| ScanError::RateLimitExceeded {
                retry_after: wait.as_secs_f64(),
            })
    }

    /// Blocking acquire. Polls the bucket at a bounded interval until the
    /// tokens are granted or `timeout` elapses, returning `false` on timeout.
    pub async fn acquire(&self, key: &str, tokens: u32, timeout: Duration) -> bool {
        if !self.is_enabled() {
            return true;
        }

        let timeout = timeout.min(MAX_ACQUIRE_TIMEOUT);
        let started = Instant::now();
        let bucket = self.bucket(key).await;

        loop {
            let wait = {
                let mut bucket = bucket.lock().await;
                match bucket.try_take(f64::from(tokens)) {
                    Ok(()) => return true,
                    Err(wait) => wait,
                }
            };

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                warn!("Rate limiter acquire for {} timed out after {:?}", key, timeout);
                return false;
            }

            let remaining = timeout - elapsed;
            let pause = wait.min(DEFAULT_POLL_INTERVAL).min(remaining);
            debug!("Rate limiter waiting {:?} for {}", pause, key);
            sleep(pause.max(Duration::from_millis(1))).await;
        }
    }

    /// Blocking acquire that reports a timeout as an error
    pub async fn acquire_or_err(&self, key: &str, timeout: Duration) -> Result<()> {
        if self.acquire(key, 1, timeout).await {
            Ok(())
        } else {
            Err(ScanError::RateLimitTimeout {
                key: key.to_string(),
                timeout,
            })
        }
    }

    /// Refill the bucket for `key`, if it exists
    pub async fn reset(&self, key: &str) {
        let bucket = self.buckets.lock().await.get(key).cloned();
        if let Some(bucket) = bucket {
            bucket.lock().await.reset();
        }
    }

    /// Drop buckets that have not been touched for longer than `max_age`.
    /// Returns the number of buckets removed.
    pub async fn cleanup_idle(&self, max_age: Duration) -> usize {
        let mut buckets = self.buckets.lock().await;
        let now = Instant::now();

        let mut stale = Vec::new();
        for (key, bucket) in buckets.iter() {
            if bucket.lock().await.idle_for(now) > max_age {
                stale.push(key.clone());
            }
        }

        for key in &stale {
            buckets.remove(key);
            debug!("Removed rate limiter for domain: {}", key);
        }
        stale.len()
    }

    pub async fn bucket_count(&self) -> usize {
        self.buckets.lock().await.len()
    }
}

impl Default for DomainRateLimiter {
    fn default() -> Self {
        Self::new(5.0)
    }
}
