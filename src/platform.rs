//! Platform collaborators: millisecond clock, random source and log sink.
//!
//! Callers pass a [`PlatformHooks`] with any subset of hooks installed; init
//! resolves it into a [`Platform`] where the clock and random source are
//! always present.

use std::sync::Arc;
use std::time::Instant;

/// Monotonic millisecond clock; wraps at `u32::MAX`.
pub type ClockFn = Arc<dyn Fn() -> u32 + Send + Sync>;

/// Source of 32-bit random samples for backoff jitter.
pub type RandomFn = Arc<dyn Fn() -> u32 + Send + Sync>;

/// Receiver for formatted log lines.
pub type LogSinkFn = Arc<dyn Fn(LogLevel, &str) + Send + Sync>;

/// Severity of a log line handed to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Error => write!(f, "error"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Debug => write!(f, "debug"),
        }
    }
}

/// Optional platform hooks supplied at init.
///
/// # Example
///
/// ```
/// use edge_uplink::platform::{LogLevel, PlatformHooks};
///
/// let hooks = PlatformHooks::default()
///     .with_random(|| 4)
///     .with_log_sink(|level: LogLevel, line: &str| eprintln!("[{}] {}", level, line));
/// ```
#[derive(Clone, Default)]
pub struct PlatformHooks {
    clock: Option<ClockFn>,
    random: Option<RandomFn>,
    log_sink: Option<LogSinkFn>,
}

impl PlatformHooks {
    /// Install a millisecond clock.
    pub fn with_clock(mut self, clock: impl Fn() -> u32 + Send + Sync + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Install a random source.
    pub fn with_random(mut self, random: impl Fn() -> u32 + Send + Sync + 'static) -> Self {
        self.random = Some(Arc::new(random));
        self
    }

    /// Install a log sink.
    pub fn with_log_sink(
        mut self,
        sink: impl Fn(LogLevel, &str) + Send + Sync + 'static,
    ) -> Self {
        self.log_sink = Some(Arc::new(sink));
        self
    }

    /// Fill in defaults for every hook that was not installed.
    ///
    /// The default clock counts milliseconds from this call; the default
    /// random source is `rand::random`.
    pub fn resolve(self) -> Platform {
        let clock: ClockFn = match self.clock {
            Some(clock) => clock,
            None => {
                let start = Instant::now();
                // Truncation to u32 is the 32-bit wraparound callers expect
                Arc::new(move || start.elapsed().as_millis() as u32)
            }
        };
        let random: RandomFn = match self.random {
            Some(random) => random,
            None => Arc::new(rand::random::<u32>),
        };

        Platform {
            clock,
            random,
            log_sink: self.log_sink,
        }
    }
}

impl std::fmt::Debug for PlatformHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformHooks")
            .field("clock", &self.clock.is_some())
            .field("random", &self.random.is_some())
            .field("log_sink", &self.log_sink.is_some())
            .finish()
    }
}

/// Resolved platform collaborators.
#[derive(Clone)]
pub struct Platform {
    clock: ClockFn,
    random: RandomFn,
    log_sink: Option<LogSinkFn>,
}

impl Platform {
    /// Current monotonic time in milliseconds.
    pub fn now_ms(&self) -> u32 {
        (self.clock)()
    }

    /// Next random sample.
    pub fn rand_u32(&self) -> u32 {
        (self.random)()
    }

    /// Whether a log sink is installed.
    pub fn has_log_sink(&self) -> bool {
        self.log_sink.is_some()
    }

    /// Forward a formatted line to the log sink, if one is installed.
    ///
    /// `line` is only evaluated when a sink is present.
    pub fn log(&self, level: LogLevel, line: impl FnOnce() -> String) {
        if let Some(sink) = &self.log_sink {
            sink(level, &line());
        }
    }
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform")
            .field("log_sink", &self.log_sink.is_some())
            .finish_non_exhaustive()
    }
}
