//! Per-caller throttle for extraction requests.
//!
//! Each caller may start one extraction per interval. State lives in the
//! limiter instance the processor is given; nothing is process-global.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// Entries idle longer than this are purged on every check.
const STALE_AFTER: Duration = Duration::from_secs(3600);

pub struct ExtractionRateLimiter {
    last_call: HashMap<String, Instant>,
    interval: Duration,
}

impl ExtractionRateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            last_call: HashMap::new(),
            interval,
        }
    }

    /// Record a call by `caller`. Returns `Err(retry_after_secs)` if the caller
    /// is still inside its interval; a rejected call does not reset the window.
    pub fn check(&mut self, caller: &str) -> Result<(), u64> {
        let now = Instant::now();
        self.last_call
            .retain(|_, last| now.duration_since(*last) < STALE_AFTER);

        if let Some(last) = self.last_call.get(caller) {
            let elapsed = now.duration_since(*last);
            if elapsed < self.interval {
                let remaining = self.interval - elapsed;
                // Round up so callers never retry a moment too early.
                let retry_after = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
                return Err(retry_after.max(1));
            }
        }

        self.last_call.insert(caller.to_string(), now);
        Ok(())
    }

    pub fn tracked_callers(&self) -> usize {
        self.last_call.len()
    }
}

impl Default for ExtractionRateLimiter {
    fn default() -> Self {
        Self::new(crate::pipeline_config::PipelineConfig::default().rate_limit_interval())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn second_call_within_interval_is_rejected() {
        let mut limiter = ExtractionRateLimiter::default();
        assert!(limiter.check("alice").is_ok());

        tokio::time::advance(Duration::from_millis(1500)).await;
        assert_eq!(limiter.check("alice"), Err(4));
    }

    #[tokio::test(start_paused = true)]
    async fn call_after_interval_is_allowed() {
        let mut limiter = ExtractionRateLimiter::default();
        assert!(limiter.check("alice").is_ok());
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(limiter.check("alice").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn rejection_does_not_extend_window() {
        let mut limiter = ExtractionRateLimiter::default();
        limiter.check("alice").unwrap();
        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(limiter.check("alice").is_err());
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(limiter.check("alice").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn callers_are_independent() {
        let mut limiter = ExtractionRateLimiter::default();
        assert!(limiter.check("alice").is_ok());
        assert!(limiter.check("bob").is_ok());
        assert!(limiter.check("alice").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_entries_are_purged() {
        let mut limiter = ExtractionRateLimiter::default();
        limiter.check("alice").unwrap();
        limiter.check("bob").unwrap();
        assert_eq!(limiter.tracked_callers(), 2);

        tokio::time::advance(Duration::from_secs(3601)).await;
        limiter.check("carol").unwrap();
        assert_eq!(limiter.tracked_callers(), 1);
    }
}
