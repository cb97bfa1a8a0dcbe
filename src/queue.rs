//! Fixed-capacity ring queue of pending messages.
//!
//! The queue is storage only: it knows nothing about the network and does no
//! locking of its own. The uplink holds its mutex around every
//! peek-modify-pop sequence.

use crate::error::UplinkError;
use crate::message::Message;

/// Compile-time upper bound on the queue capacity.
pub const QUEUE_MAX_LEN: usize = 8;

/// FIFO of messages backed by a fixed array of `N` slots.
///
/// The usable capacity is chosen at [`RingQueue::new`] and never exceeds `N`.
/// A full queue refuses new messages; it never overwrites the oldest one.
#[derive(Debug, Clone)]
pub struct RingQueue<const N: usize = QUEUE_MAX_LEN> {
    /// Slot storage
    slots: [Message; N],

    /// Usable slots (1..=N)
    capacity: usize,

    /// Index of the oldest message
    head: usize,

    /// Index of the next free slot
    tail: usize,

    /// Number of queued messages
    count: usize,
}

impl<const N: usize> RingQueue<N> {
    /// Create an empty queue.
    ///
    /// `capacity` is clamped to `1..=N`.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: std::array::from_fn(|_| Message::default()),
            capacity: capacity.clamp(1, N.max(1)),
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    /// Usable capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Check if the queue is full.
    pub fn is_full(&self) -> bool {
        self.count >= self.capacity
    }

    /// Get the number of queued messages.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Append a message at the tail.
    ///
    /// # Errors
    ///
    /// - `InvalidArg` if the queue has no backing storage (`N == 0`)
    /// - `QueueFull` if every usable slot is taken
    pub fn push(&mut self, msg: Message) -> Result<(), UplinkError> {
        if N == 0 {
            return Err(UplinkError::InvalidArg);
        }
        if self.is_full() {
            return Err(UplinkError::QueueFull);
        }

        self.slots[self.tail] = msg;
        self.tail = (self.tail + 1) % self.capacity;
        self.count += 1;
        Ok(())
    }

    /// Mutable access to the oldest message.
    ///
    /// The poll loop updates `attempt` and `next_retry_at` in place through
    /// this reference.
    pub fn peek_front(&mut self) -> Result<&mut Message, UplinkError> {
        if self.is_empty() {
            return Err(UplinkError::QueueEmpty);
        }
        Ok(&mut self.slots[self.head])
    }

    /// Remove the oldest message.
    pub fn pop(&mut self) -> Result<(), UplinkError> {
        if self.is_empty() {
            return Err(UplinkError::QueueEmpty);
        }

        // Clear the slot so stale payloads don't linger in memory
        self.slots[self.head] = Message::default();
        self.head = (self.head + 1) % self.capacity;
        self.count -= 1;
        Ok(())
    }
}

impl Default for RingQueue<QUEUE_MAX_LEN> {
    fn default() -> Self {
        Self::new(QUEUE_MAX_LEN)
    }
}
