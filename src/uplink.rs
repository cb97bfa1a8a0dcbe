//! Uplink orchestrator: enqueue events from any thread, deliver them one at a
//! time from a single poll loop.
//!
//! All mutable state (queue, id counter, in-flight flag) sits behind one
//! mutex that is never held across network I/O. Producers therefore never
//! wait on the network, and at most one send is in flight per context.

use std::sync::{Mutex, MutexGuard, OnceLock};

use tracing::{debug, error, info, warn};

use crate::codec::{self, EventJson, LIGHT_ADC_TYPE};
use crate::config::{Config, Scheme};
use crate::error::UplinkError;
use crate::message::Message;
use crate::platform::{LogLevel, Platform, PlatformHooks};
use crate::queue::RingQueue;
use crate::retry;
use crate::transport::{Ack, HttpTransport, TcpConnector, Transport, RESPONSE_BODY_LEN};

/// What a single [`UplinkCore::poll`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Not initialized, or nothing queued
    Idle,

    /// Another send is in flight
    Busy,

    /// The head message is waiting for its retry time
    NotDue,

    /// The head message was accepted and removed
    Delivered { id: u32 },

    /// The send failed; the message stays at the head until `retry_in_ms` elapses
    Failed {
        id: u32,
        attempt: u16,
        retry_in_ms: u32,
    },

    /// The message ran out of attempts and was removed undelivered
    Dropped { id: u32, attempts: u16 },
}

/// State shared between producers and the poll loop.
struct Shared {
    queue: RingQueue,
    next_message_id: u32,
    sending: bool,
}

/// Everything fixed at init time.
struct Inner {
    config: Config,
    platform: Platform,
    transport: Box<dyn Transport>,
    shared: Mutex<Shared>,
}

impl Inner {
    fn lock(&self) -> Result<MutexGuard<'_, Shared>, UplinkError> {
        self.shared.lock().map_err(|_| {
            error!("Uplink state lock poisoned");
            UplinkError::Internal
        })
    }
}

/// Store-and-forward uplink context.
///
/// Construct with [`UplinkCore::new`] (usable in a `static`) and call
/// [`UplinkCore::init`] once, or build an initialized context around a custom
/// transport with [`UplinkCore::with_transport`].
///
/// Producers call [`enqueue_event`](UplinkCore::enqueue_event) from any
/// thread; one consumer calls [`poll`](UplinkCore::poll) periodically.
///
/// # Example
///
/// ```no_run
/// use edge_uplink::config::Config;
/// use edge_uplink::platform::PlatformHooks;
/// use edge_uplink::uplink::UplinkCore;
///
/// static UPLINK: UplinkCore = UplinkCore::new();
///
/// UPLINK
///     .init(&Config::default(), PlatformHooks::default())
///     .expect("Failed to init uplink");
///
/// UPLINK.enqueue_light_adc(1234).ok();
/// loop {
///     UPLINK.poll();
///     std::thread::sleep(std::time::Duration::from_millis(100));
/// }
/// ```
pub struct UplinkCore {
    inner: OnceLock<Inner>,
}

impl UplinkCore {
    /// Create an uninitialized context.
    pub const fn new() -> Self {
        Self {
            inner: OnceLock::new(),
        }
    }

    /// Create an initialized context that sends through `transport`.
    ///
    /// Any endpoint scheme is accepted; the transport decides what it serves.
    ///
    /// # Errors
    ///
    /// `InvalidArg` if the configuration does not validate.
    pub fn with_transport(
        config: &Config,
        hooks: PlatformHooks,
        transport: Box<dyn Transport>,
    ) -> Result<Self, UplinkError> {
        let core = Self::new();
        core.install(config, hooks, transport)?;
        Ok(core)
    }

    /// Initialize with the plaintext HTTP transport.
    ///
    /// The configuration is validated and copied in; missing platform hooks
    /// get their defaults. Message ids start at 1.
    ///
    /// # Errors
    ///
    /// - `InvalidArg` if the configuration does not validate or the context
    ///   was already initialized
    /// - `Unsupported` for any scheme other than HTTP
    pub fn init(&self, config: &Config, hooks: PlatformHooks) -> Result<(), UplinkError> {
        if config.endpoint.scheme != Scheme::Http {
            error!(scheme = %config.endpoint.scheme, "No transport available for scheme");
            return Err(UplinkError::Unsupported);
        }

        let transport: HttpTransport<TcpConnector> = HttpTransport::default();
        self.install(config, hooks, Box::new(transport))
    }

    fn install(
        &self,
        config: &Config,
        hooks: PlatformHooks,
        transport: Box<dyn Transport>,
    ) -> Result<(), UplinkError> {
        config.validate().map_err(|e| {
            error!(error = %e, "Invalid uplink configuration");
            UplinkError::from(e)
        })?;

        let inner = Inner {
            config: config.clone(),
            platform: hooks.resolve(),
            transport,
            shared: Mutex::new(Shared {
                queue: RingQueue::new(usize::from(config.queue_len)),
                next_message_id: 1,
                sending: false,
            }),
        };

        if self.inner.set(inner).is_err() {
            warn!("Uplink already initialized");
            return Err(UplinkError::InvalidArg);
        }

        info!(
            endpoint = %config.endpoint,
            device_id = %config.device_id,
            queue_len = config.queue_len,
            max_attempts = config.retry.max_attempts,
            "Uplink initialized"
        );
        if let Some(inner) = self.inner.get() {
            inner.platform.log(LogLevel::Info, || {
                format!("uplink ready: {}", config.endpoint)
            });
        }
        Ok(())
    }

    /// Whether `init` (or `with_transport`) has completed.
    pub fn is_initialized(&self) -> bool {
        self.inner.get().is_some()
    }

    /// Queue an event for delivery and return its message id.
    ///
    /// Never touches the network. The lock is held only to assign the id and
    /// push.
    ///
    /// # Errors
    ///
    /// - `NotInitialized` before `init`
    /// - `InvalidArg` if `event_type` is empty
    /// - `BufferTooSmall` if `event_type` or `payload_json` exceeds its bound;
    ///   the queue is left unchanged
    /// - `QueueFull` if no slot is free
    pub fn enqueue_event(&self, event_type: &str, payload_json: &str) -> Result<u32, UplinkError> {
        let inner = self.inner.get().ok_or(UplinkError::NotInitialized)?;
        if event_type.is_empty() {
            return Err(UplinkError::InvalidArg);
        }

        let now = inner.platform.now_ms();
        let mut msg = Message::new(event_type, payload_json, now)?;

        let mut shared = inner.lock()?;
        let id = shared.next_message_id;
        msg.id = id;
        shared.queue.push(msg)?;
        // Id 0 is never handed out, even after the counter wraps
        shared.next_message_id = id.wrapping_add(1).max(1);
        let depth = shared.queue.len();
        drop(shared);

        debug!(id, event_type, depth, "Event queued");
        Ok(id)
    }

    /// Queue a light sensor reading as a `LIGHT_ADC` event with payload `{"adc":N}`.
    pub fn enqueue_light_adc(&self, adc_value: u32) -> Result<u32, UplinkError> {
        let payload = codec::build_light_adc_payload(adc_value)?;
        self.enqueue_event(LIGHT_ADC_TYPE, &payload)
    }

    /// Number of queued messages; 0 before init.
    pub fn queue_depth(&self) -> usize {
        self.inner
            .get()
            .and_then(|inner| inner.lock().ok())
            .map_or(0, |shared| shared.queue.len())
    }

    /// Attempt delivery of the head message if it is due.
    ///
    /// Sends at most one message per call and returns immediately if another
    /// send is in flight. Failures are retried with backoff; a message that
    /// has used all its attempts is dropped so it cannot block the queue.
    pub fn poll(&self) -> PollOutcome {
        let Some(inner) = self.inner.get() else {
            return PollOutcome::Idle;
        };

        let msg = match begin_send(inner) {
            Ok(msg) => msg,
            Err(outcome) => return outcome,
        };

        let in_flight = InFlight::new(inner);
        let result = send(inner, &msg);
        finish_send(in_flight, &msg, result)
    }
}

impl Default for UplinkCore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for UplinkCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UplinkCore")
            .field("initialized", &self.is_initialized())
            .field("queue_depth", &self.queue_depth())
            .finish()
    }
}

/// Ownership of the `sending` flag for the duration of one send.
///
/// [`InFlight::end`] clears the flag under the caller's lock. If the send
/// unwinds instead, dropping the guard clears it so later polls are not
/// stuck on `Busy`.
struct InFlight<'a> {
    inner: &'a Inner,
    active: bool,
}

impl<'a> InFlight<'a> {
    fn new(inner: &'a Inner) -> Self {
        Self {
            inner,
            active: true,
        }
    }

    fn end(mut self, shared: &mut Shared) {
        shared.sending = false;
        self.active = false;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        warn!("Send aborted, clearing in-flight flag");
        if let Ok(mut shared) = self.inner.shared.lock() {
            shared.sending = false;
        }
    }
}

/// Pick the head message and mark it in flight.
///
/// Returns a private copy with `attempt` already incremented, or the
/// outcome to report when there is nothing to send.
fn begin_send(inner: &Inner) -> Result<Message, PollOutcome> {
    let now = inner.platform.now_ms();
    let mut guard = inner.lock().map_err(|_| PollOutcome::Idle)?;
    let shared = &mut *guard;

    if shared.sending {
        return Err(PollOutcome::Busy);
    }

    let head = shared.queue.peek_front().map_err(|_| PollOutcome::Idle)?;
    if !head.is_due(now) {
        return Err(PollOutcome::NotDue);
    }

    let next_attempt = head.attempt.saturating_add(1);
    if !retry::is_attempt_allowed(Some(&inner.config.retry), next_attempt) {
        let (id, attempts) = (head.id, head.attempt);
        let _ = shared.queue.pop();
        report_drop(inner, id, attempts);
        return Err(PollOutcome::Dropped { id, attempts });
    }

    head.attempt = next_attempt;
    let msg = head.clone();
    shared.sending = true;
    Ok(msg)
}

/// Encode and transmit one message. Runs without the lock.
fn send(inner: &Inner, msg: &Message) -> Result<Ack, UplinkError> {
    let json: EventJson = codec::build_event(
        &inner.config.device_id,
        msg.id,
        msg.created_at,
        &msg.event_type,
        &msg.payload,
    )
    .map_err(|e| {
        warn!(id = msg.id, error = %e, "Failed to encode event");
        UplinkError::CodecError
    })?;

    let mut body = [0u8; RESPONSE_BODY_LEN];
    let exchange = inner.transport.post_json(
        &inner.config.endpoint,
        &inner.platform,
        &json,
        inner.config.send_timeout_ms,
        inner.config.recv_timeout_ms,
        &mut body,
    )?;

    Ok(Ack::from_response(&exchange, &body))
}

/// Apply the result of a send to the queue head.
fn finish_send(
    in_flight: InFlight<'_>,
    msg: &Message,
    result: Result<Ack, UplinkError>,
) -> PollOutcome {
    let inner = in_flight.inner;
    let success = matches!(&result, Ok(ack) if ack.is_success());

    let Ok(mut guard) = inner.lock() else {
        return PollOutcome::Idle;
    };
    let shared = &mut *guard;
    in_flight.end(shared);

    let head = match shared.queue.peek_front() {
        Ok(head) if head.id == msg.id => head,
        _ => {
            warn!(id = msg.id, "Queue head changed during send");
            return PollOutcome::Idle;
        }
    };

    if success {
        let _ = shared.queue.pop();
        debug!(id = msg.id, attempt = msg.attempt, "Event delivered");
        return PollOutcome::Delivered { id: msg.id };
    }

    let (ack, cause) = match result {
        Ok(ack) => (ack, None),
        Err(e) => (Ack::NONE, Some(e)),
    };

    // Last allowed attempt failed: drop now rather than wait out another backoff
    if !retry::is_attempt_allowed(Some(&inner.config.retry), msg.attempt.saturating_add(1)) {
        let _ = shared.queue.pop();
        report_drop(inner, msg.id, msg.attempt);
        return PollOutcome::Dropped {
            id: msg.id,
            attempts: msg.attempt,
        };
    }

    let delay = retry::calc_delay_ms(
        Some(&inner.config.retry),
        msg.attempt,
        inner.platform.rand_u32(),
    );
    head.next_retry_at = inner.platform.now_ms().wrapping_add(delay);

    warn!(
        id = msg.id,
        http_status = ack.http_status,
        app_code = ack.app_code,
        error = ?cause,
        attempt = msg.attempt,
        retry_in_ms = delay,
        "Send failed, will retry"
    );
    inner.platform.log(LogLevel::Warn, || {
        format!(
            "send failed: http={} code={} attempt={} next_delay={} ms",
            ack.http_status, ack.app_code, msg.attempt, delay
        )
    });

    PollOutcome::Failed {
        id: msg.id,
        attempt: msg.attempt,
        retry_in_ms: delay,
    }
}

fn report_drop(inner: &Inner, id: u32, attempts: u16) {
    error!(id, attempts, "Attempts exhausted, dropping event");
    inner.platform.log(LogLevel::Error, || {
        format!("drop message id={} after {} attempts", id, attempts)
    });
}
