//! Retry policy: attempt limits and exponential backoff with jitter.
//!
//! Pure functions only; the random sample is passed in by the caller so the
//! math is deterministic under test.

use serde::{Deserialize, Serialize};

/// Delay used when no policy is available at all.
pub const FALLBACK_DELAY_MS: u32 = 1000;

/// Default base delay for exponential backoff (in milliseconds).
pub const DEFAULT_BASE_DELAY_MS: u32 = 500;

/// Default cap on the backoff delay (in milliseconds).
pub const DEFAULT_MAX_DELAY_MS: u32 = 10_000;

/// Default number of attempts, including the first send.
pub const DEFAULT_MAX_ATTEMPTS: u16 = 10;

/// Default jitter, as a percentage of the computed delay.
pub const DEFAULT_JITTER_PCT: u8 = 20;

/// Exponential backoff settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub base_delay_ms: u32,

    /// Upper bound for any computed delay (must be >= base_delay_ms)
    pub max_delay_ms: u32,

    /// Maximum attempts including the first send; 0 means unlimited
    pub max_attempts: u16,

    /// Jitter percentage (0..=100) applied around the computed delay
    pub jitter_pct: u8,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            jitter_pct: DEFAULT_JITTER_PCT,
        }
    }
}

impl RetryPolicy {
    /// Whether attempt number `next_attempt` (1-based) may be made.
    pub fn is_attempt_allowed(&self, next_attempt: u16) -> bool {
        self.max_attempts == 0 || next_attempt <= self.max_attempts
    }

    /// Backoff delay after attempt number `attempt` failed.
    ///
    /// Computes `min(base * 2^(attempt-1), max)` without overflow, then
    /// spreads it uniformly over `[delay - jitter, delay + jitter]` using
    /// `random_sample`, never exceeding `max_delay_ms`.
    pub fn delay_ms(&self, attempt: u16, random_sample: u32) -> u32 {
        let attempt = attempt.max(1);
        let mut delay = self.base_delay_ms;

        for _ in 1..attempt {
            if delay >= self.max_delay_ms {
                delay = self.max_delay_ms;
                break;
            }
            if delay > self.max_delay_ms / 2 {
                delay = self.max_delay_ms;
            } else {
                delay *= 2;
            }
        }

        if self.jitter_pct == 0 {
            return delay;
        }

        // u64 keeps delay * pct exact for any u32 delay
        let jitter = (u64::from(delay) * u64::from(self.jitter_pct) / 100).min(u64::from(delay));
        if jitter == 0 {
            return delay;
        }

        let range = 2 * jitter + 1;
        let offset = u64::from(random_sample) % range;
        let result = u64::from(delay) - jitter + offset;

        result.min(u64::from(self.max_delay_ms)) as u32
    }
}

/// Attempt check tolerant of a missing policy (a missing policy never blocks).
pub fn is_attempt_allowed(policy: Option<&RetryPolicy>, next_attempt: u16) -> bool {
    policy.map_or(true, |p| p.is_attempt_allowed(next_attempt))
}

/// Delay computation tolerant of a missing policy.
///
/// Without a policy a fixed [`FALLBACK_DELAY_MS`] is returned so a
/// misconfiguration cannot turn into a tight retry loop.
pub fn calc_delay_ms(policy: Option<&RetryPolicy>, attempt: u16, random_sample: u32) -> u32 {
    policy.map_or(FALLBACK_DELAY_MS, |p| p.delay_ms(attempt, random_sample))
}
