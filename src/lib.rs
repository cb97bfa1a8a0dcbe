//! Edge Uplink Library
//!
//! Store-and-forward telemetry uplink for edge devices: producers queue
//! discrete events, a single poll loop delivers them one at a time to an HTTP
//! endpoint with bounded, jittered exponential backoff.
//!
//! - **config**: Endpoint, device identity, timeouts and retry policy
//! - **queue**: Fixed-capacity FIFO of pending messages
//! - **retry**: Attempt limits and backoff delay computation
//! - **codec**: Event envelope encoding and response code scanning
//! - **transport**: Pluggable transport trait and the plaintext HTTP implementation
//! - **uplink**: The orchestrator tying the pieces together
//! - **sensor**: Simulated light sensor producer
//!
//! # Example
//!
//! ```no_run
//! use edge_uplink::config::Config;
//! use edge_uplink::platform::PlatformHooks;
//! use edge_uplink::uplink::{PollOutcome, UplinkCore};
//!
//! // Load configuration from environment
//! let config = Config::from_env().expect("Failed to load config");
//!
//! // Initialize the uplink with default clock and random source
//! let uplink = UplinkCore::new();
//! uplink
//!     .init(&config, PlatformHooks::default())
//!     .expect("Failed to init uplink");
//!
//! // Producers queue events from any thread
//! uplink
//!     .enqueue_event("DOOR_OPEN", r#"{"door":2}"#)
//!     .expect("Failed to queue event");
//!
//! // One consumer drives delivery
//! while uplink.queue_depth() > 0 {
//!     if let PollOutcome::Dropped { id, .. } = uplink.poll() {
//!         eprintln!("event {} dropped", id);
//!     }
//!     std::thread::sleep(std::time::Duration::from_millis(100));
//! }
//! ```

// Module declarations
pub mod codec;
pub mod config;
pub mod error;
pub mod message;
pub mod platform;
pub mod queue;
pub mod retry;
pub mod sensor;
pub mod transport;
pub mod uplink;

// Re-export commonly used types at crate root for convenience
pub use config::{Config, ConfigError, Endpoint, Scheme};
pub use error::UplinkError;
pub use message::Message;
pub use platform::{LogLevel, Platform, PlatformHooks};
pub use queue::{RingQueue, QUEUE_MAX_LEN};
pub use retry::RetryPolicy;
pub use transport::{Ack, HttpTransport, Transport};
pub use uplink::{PollOutcome, UplinkCore};
