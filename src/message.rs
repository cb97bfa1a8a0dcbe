//! Queued event messages and the fixed-capacity strings they carry.
//!
//! Every string that ends up in a message or in the configuration has a hard
//! upper bound. Values that do not fit are rejected as a whole, never clipped.

use serde::{Deserialize, Serialize};

use crate::error::UplinkError;

/// Maximum length of an event type, e.g. `LIGHT_ADC`.
pub const MAX_TYPE_LEN: usize = 31;

/// Maximum length of an event payload (a JSON object fragment).
pub const MAX_PAYLOAD_LEN: usize = 255;

/// Event category string.
pub type EventType = heapless::String<MAX_TYPE_LEN>;

/// Event payload string.
pub type Payload = heapless::String<MAX_PAYLOAD_LEN>;

/// Copy `src` into a bounded string.
///
/// Returns `BufferTooSmall` when `src` is longer than `N` bytes; nothing is
/// partially copied in that case.
pub fn bounded<const N: usize>(src: &str) -> Result<heapless::String<N>, UplinkError> {
    let mut out = heapless::String::<N>::new();
    out.push_str(src).map_err(|_| UplinkError::BufferTooSmall)?;
    Ok(out)
}

/// One event waiting in the queue.
///
/// Created by `enqueue_event`; only the poll path touches `attempt` and
/// `next_retry_at` afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Process-unique, monotonically increasing id used by the backend to deduplicate
    pub id: u32,

    /// Monotonic clock reading (ms) at enqueue time, sent as the event timestamp
    pub created_at: u32,

    /// Event category
    pub event_type: EventType,

    /// JSON object fragment; empty means `{}`
    pub payload: Payload,

    /// Send attempts made so far (0 = never attempted)
    pub attempt: u16,

    /// Earliest clock reading (ms) at which the message may be (re)sent
    pub next_retry_at: u32,
}

impl Message {
    /// Build a message that is immediately eligible for sending.
    ///
    /// The id is left at 0; it is assigned under the uplink lock right before
    /// the push.
    pub fn new(event_type: &str, payload: &str, now_ms: u32) -> Result<Self, UplinkError> {
        Ok(Self {
            id: 0,
            created_at: now_ms,
            event_type: bounded(event_type)?,
            payload: bounded(payload)?,
            attempt: 0,
            next_retry_at: now_ms,
        })
    }

    /// Whether the message may be sent at `now_ms`.
    pub fn is_due(&self, now_ms: u32) -> bool {
        time_is_due(now_ms, self.next_retry_at)
    }
}

/// Wraparound-safe "now has reached due" check for the 32-bit millisecond clock.
pub fn time_is_due(now_ms: u32, due_ms: u32) -> bool {
    (now_ms.wrapping_sub(due_ms) as i32) >= 0
}
