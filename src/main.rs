//! Edge Uplink - store-and-forward telemetry daemon
//!
//! Samples a (simulated) light sensor, queues each reading as an event and
//! delivers queued events one at a time to the HTTP ingestion endpoint,
//! retrying with exponential backoff while the network is unavailable.
//!
//! ## Features
//!
//! - Producer on a tokio interval; never blocked by network I/O
//! - Single consumer poll loop on a blocking worker thread
//! - Bounded queue, bounded retries, FIFO delivery
//! - Graceful shutdown on SIGINT
//!
//! ## Configuration
//!
//! If `UPLINK_CONFIG_FILE` is set, configuration is read from that JSON file.
//! Otherwise it is loaded from environment variables:
//!
//! - `UPLINK_SERVER_HOST` / `UPLINK_SERVER_PORT` / `UPLINK_SERVER_PATH`:
//!   ingestion endpoint (default: 127.0.0.1:8080/api/uplink)
//! - `UPLINK_DEVICE_ID`: device identifier (default: edge-device-01)
//! - `UPLINK_QUEUE_LEN`: queue capacity (default: 8)
//! - `UPLINK_RETRY_MAX_ATTEMPTS`: attempts per event, 0 = unlimited (default: 10)
//! - `RUST_LOG`: Logging level filter (default: info)
//!
//! See [`Config::from_env`] for the full list.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::interval;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use edge_uplink::config::{Config, ConfigError};
use edge_uplink::platform::PlatformHooks;
use edge_uplink::sensor::LightSensor;
use edge_uplink::uplink::{PollOutcome, UplinkCore};

/// Light sampling period in milliseconds
const SAMPLE_INTERVAL_MS: u64 = 1500;

/// Uplink poll period in milliseconds
const POLL_INTERVAL_MS: u64 = 100;

/// Environment variable naming a JSON configuration file
const CONFIG_FILE_VAR: &str = "UPLINK_CONFIG_FILE";

/// Interval between progress reports
const REPORT_INTERVAL: Duration = Duration::from_secs(30);

static UPLINK: UplinkCore = UplinkCore::new();

#[tokio::main]
async fn main() {
    // Initialize tracing subscriber with environment filter
    init_tracing();

    info!("Starting Edge Uplink service...");

    let config = match load_config() {
        Ok(config) => {
            info!(
                endpoint = %config.endpoint,
                device_id = %config.device_id,
                queue_len = config.queue_len,
                max_attempts = config.retry.max_attempts,
                "Configuration loaded"
            );
            config
        }
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    if let Err(e) = UPLINK.init(&config, PlatformHooks::default()) {
        error!(error = %e, "Failed to initialize uplink");
        std::process::exit(1);
    }

    let running = Arc::new(AtomicBool::new(true));

    // Poll loop - blocking sends, so it gets its own thread
    let poll_running = running.clone();
    let poll_handle = tokio::task::spawn_blocking(move || {
        info!("Poll loop started");
        run_poll_loop(&UPLINK, &poll_running);
        info!("Poll loop completed");
    });

    // Producer task - samples the sensor at a fixed period
    let producer_handle = tokio::spawn(async move {
        info!("Producer task started");
        run_producer(&UPLINK, LightSensor::with_defaults()).await;
    });

    // Wait for shutdown signal
    info!("Edge Uplink running. Press Ctrl+C to stop.");
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received, stopping...");
        }
        Err(e) => {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
    }

    // Graceful shutdown
    info!("Initiating graceful shutdown...");
    producer_handle.abort();
    running.store(false, Ordering::SeqCst);

    // An in-flight send is bounded by the socket timeouts
    let shutdown_timeout = Duration::from_millis(
        u64::from(config.send_timeout_ms) + u64::from(config.recv_timeout_ms) + POLL_INTERVAL_MS,
    );
    match tokio::time::timeout(shutdown_timeout, poll_handle).await {
        Ok(Ok(())) => {
            info!("Poll loop shut down gracefully");
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Poll loop panicked during shutdown");
        }
        Err(_) => {
            warn!("Poll loop shutdown timed out after {:?}", shutdown_timeout);
        }
    }

    // The queue lives in memory only
    let pending = UPLINK.queue_depth();
    if pending > 0 {
        warn!(pending, "Undelivered events discarded");
    }
    info!("Edge Uplink stopped");
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

/// Load configuration from `UPLINK_CONFIG_FILE` if set, else from the environment.
fn load_config() -> Result<Config, ConfigError> {
    match std::env::var(CONFIG_FILE_VAR) {
        Ok(path) => {
            info!(path = %path, "Loading configuration file");
            Config::from_json_file(&path)
        }
        Err(_) => Config::from_env(),
    }
}

/// Delivery counters for progress reports.
#[derive(Debug, Default)]
struct PollStats {
    delivered: u64,
    failed: u64,
    dropped: u64,
}

impl PollStats {
    fn record(&mut self, outcome: PollOutcome) {
        match outcome {
            PollOutcome::Delivered { .. } => self.delivered += 1,
            PollOutcome::Failed { .. } => self.failed += 1,
            PollOutcome::Dropped { .. } => self.dropped += 1,
            PollOutcome::Idle | PollOutcome::Busy | PollOutcome::NotDue => {}
        }
    }
}

/// Run the consumer loop until `running` is cleared.
///
/// Each iteration makes at most one delivery attempt, then sleeps for the
/// poll period.
fn run_poll_loop(uplink: &UplinkCore, running: &AtomicBool) {
    let mut stats = PollStats::default();
    let mut last_report_time = Instant::now();

    while running.load(Ordering::SeqCst) {
        stats.record(uplink.poll());

        if last_report_time.elapsed() >= REPORT_INTERVAL {
            info!(
                delivered = stats.delivered,
                failed = stats.failed,
                dropped = stats.dropped,
                queue_depth = uplink.queue_depth(),
                "Uplink progress"
            );
            stats = PollStats::default();
            last_report_time = Instant::now();
        }

        std::thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));
    }
}

/// Run the sensor producer, sampling at a fixed period until aborted.
async fn run_producer(uplink: &UplinkCore, mut sensor: LightSensor) {
    let mut ticker = interval(Duration::from_millis(SAMPLE_INTERVAL_MS));
    let mut skipped: u64 = 0;

    loop {
        ticker.tick().await;

        match sensor.sample_and_enqueue(uplink) {
            Ok(Some(_)) => {}
            Ok(None) => {
                skipped += 1;
                if skipped % 10 == 1 {
                    warn!(skipped, "Uplink backlog, samples are being skipped");
                }
            }
            Err(e) => {
                warn!(error = %e, "Sample not queued");
            }
        }
    }
}
