//! Error kinds shared by every layer of the uplink.
//!
//! The same small set of kinds is used from the queue up to the orchestrator.
//! Callers of [`UplinkCore::enqueue_event`](crate::uplink::UplinkCore::enqueue_event)
//! see them directly; failures inside the poll path are absorbed by the retry loop.

/// Errors that can occur anywhere in the uplink pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UplinkError {
    /// An argument or configuration value is out of range
    InvalidArg,

    /// The uplink context has not been initialized yet
    NotInitialized,

    /// The queue has no free slot; nothing was overwritten
    QueueFull,

    /// The queue holds no messages
    QueueEmpty,

    /// A fixed-capacity buffer cannot hold the full value
    BufferTooSmall,

    /// The requested scheme or feature is not available
    Unsupported,

    /// Connect, write or read failed, or the response was malformed
    TransportError,

    /// JSON encoding failed
    CodecError,

    /// Internal invariant broken (for example a poisoned lock)
    Internal,
}

impl std::fmt::Display for UplinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UplinkError::InvalidArg => write!(f, "Invalid argument"),
            UplinkError::NotInitialized => write!(f, "Uplink not initialized"),
            UplinkError::QueueFull => write!(f, "Queue is full"),
            UplinkError::QueueEmpty => write!(f, "Queue is empty"),
            UplinkError::BufferTooSmall => write!(f, "Buffer too small"),
            UplinkError::Unsupported => write!(f, "Unsupported operation"),
            UplinkError::TransportError => write!(f, "Transport failure"),
            UplinkError::CodecError => write!(f, "JSON codec failure"),
            UplinkError::Internal => write!(f, "Internal error"),
        }
    }
}

impl std::error::Error for UplinkError {}
