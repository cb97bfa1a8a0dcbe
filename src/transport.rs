//! Transport abstraction: deliver one JSON document, report the HTTP status
//! and the response body.
//!
//! The uplink only sees the [`Transport`] trait. The shipped implementation
//! is plaintext HTTP over a blocking [`Connector`]; a secured transport can be
//! substituted through [`UplinkCore::with_transport`](crate::uplink::UplinkCore::with_transport)
//! without touching the queue or the retry logic.

pub mod http;

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use crate::codec::{parse_app_code, APP_CODE_UNKNOWN};
use crate::config::Endpoint;
use crate::error::UplinkError;
use crate::platform::Platform;

pub use http::HttpTransport;

/// Size of the response body buffer handed to the transport by the uplink.
pub const RESPONSE_BODY_LEN: usize = 512;

/// Outcome of one HTTP exchange as seen by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exchange {
    /// Status code from the response line, 0 if it could not be parsed
    pub http_status: u16,

    /// Bytes written into the caller's body buffer
    pub body_len: usize,

    /// The body did not fit; `body_len` bytes were kept and the rest drained
    pub truncated: bool,
}

/// Server acknowledgement: transport status plus application code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    /// HTTP status code, 0 when no response was received
    pub http_status: u16,

    /// `"code"` field of the response body, or [`APP_CODE_UNKNOWN`]
    pub app_code: i32,
}

impl Ack {
    /// Acknowledgement for an exchange that produced no usable response.
    pub const NONE: Ack = Ack {
        http_status: 0,
        app_code: APP_CODE_UNKNOWN,
    };

    /// Build an acknowledgement from a completed exchange and its body.
    ///
    /// A truncated body is still scanned, so a `"code"` near the start of an
    /// oversized response decides the outcome as usual.
    pub fn from_response(exchange: &Exchange, body: &[u8]) -> Self {
        let len = exchange.body_len.min(body.len());
        Self {
            http_status: exchange.http_status,
            app_code: parse_app_code(&body[..len]),
        }
    }

    /// Delivery succeeded: 2xx status and an application code of 0 or none at all.
    pub fn is_success(&self) -> bool {
        let http_ok = (200..300).contains(&self.http_status);
        let app_ok = self.app_code == 0 || self.app_code == APP_CODE_UNKNOWN;
        http_ok && app_ok
    }
}

/// Sends one JSON document to an endpoint.
pub trait Transport: Send + Sync {
    /// POST `json` to `endpoint` and copy the response body into `body`.
    ///
    /// Blocks for at most one connect + write + read cycle, bounded by the
    /// two timeouts.
    ///
    /// # Errors
    ///
    /// - `InvalidArg` if the endpoint host cannot be used as given
    /// - `TransportError` on connect/write failure or an incomplete response header
    /// - `BufferTooSmall` if the request header did not fit; an oversized
    ///   response body is reported through [`Exchange::truncated`] instead
    /// - `Unsupported` if the transport cannot serve the endpoint's scheme
    fn post_json(
        &self,
        endpoint: &Endpoint,
        platform: &Platform,
        json: &str,
        send_timeout_ms: u32,
        recv_timeout_ms: u32,
        body: &mut [u8],
    ) -> Result<Exchange, UplinkError>;
}

/// One open, blocking, connection-oriented byte stream.
pub trait Connection: Read + Write + Send {
    /// Close the connection. Errors are ignored; the connection is dropped afterwards.
    fn close(&mut self) {}
}

impl Connection for TcpStream {
    fn close(&mut self) {
        let _ = self.shutdown(Shutdown::Both);
    }
}

/// Opens connections with send/receive timeouts applied.
pub trait Connector: Send + Sync {
    /// Connect to `addr`.
    ///
    /// `send_timeout` bounds the connect and every write, `recv_timeout`
    /// bounds every read.
    fn connect(
        &self,
        addr: SocketAddr,
        send_timeout: Duration,
        recv_timeout: Duration,
    ) -> io::Result<Box<dyn Connection>>;
}

/// [`Connector`] over `std::net::TcpStream`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    fn connect(
        &self,
        addr: SocketAddr,
        send_timeout: Duration,
        recv_timeout: Duration,
    ) -> io::Result<Box<dyn Connection>> {
        let stream = TcpStream::connect_timeout(&addr, send_timeout)?;
        stream.set_write_timeout(Some(send_timeout))?;
        stream.set_read_timeout(Some(recv_timeout))?;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }
}

/// Millisecond timeout as a non-zero `Duration`.
pub(crate) fn timeout(ms: u32) -> Duration {
    // Zero would mean "no timeout" to some socket APIs and is rejected by others
    Duration::from_millis(u64::from(ms.max(1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(status: u16, body: &[u8]) -> (Exchange, Vec<u8>) {
        (
            Exchange {
                http_status: status,
                body_len: body.len(),
                truncated: false,
            },
            body.to_vec(),
        )
    }

    #[test]
    fn test_ack_success_rules() {
        let cases: &[(u16, &[u8], bool)] = &[
            (200, br#"{"code":0}"#, true),
            (204, b"", true),
            (299, br#"{"ok":true}"#, true),
            (200, br#"{"code":-5}"#, false),
            (200, br#"{"code":1}"#, false),
            (199, br#"{"code":0}"#, false),
            (300, br#"{"code":0}"#, false),
            (500, b"", false),
            (0, b"", false),
        ];

        for &(status, body, expected) in cases {
            let (ex, buf) = exchange(status, body);
            let ack = Ack::from_response(&ex, &buf);
            assert_eq!(ack.is_success(), expected, "status {} body {:?}", status, body);
        }
    }

    #[test]
    fn test_ack_reads_only_reported_body() {
        // Stale bytes past body_len must not be scanned
        let buf = br#"{"a":1}{"code":9}"#;
        let ex = Exchange {
            http_status: 200,
            body_len: 7,
            truncated: false,
        };
        let ack = Ack::from_response(&ex, buf);
        assert_eq!(ack.app_code, APP_CODE_UNKNOWN);
        assert!(ack.is_success());
    }

    #[test]
    fn test_ack_from_truncated_body() {
        let buf = br#"{"code":0,"pad":"xxxx"#;
        let ex = Exchange {
            http_status: 200,
            body_len: buf.len(),
            truncated: true,
        };
        let ack = Ack::from_response(&ex, buf);
        assert_eq!(ack.app_code, 0);
        assert!(ack.is_success());

        let buf = br#"{"code":12,"pad":"xx"#;
        let ex = Exchange { body_len: buf.len(), ..ex };
        assert!(!Ack::from_response(&ex, buf).is_success());
    }

    #[test]
    fn test_ack_none_is_failure() {
        assert!(!Ack::NONE.is_success());
    }

    #[test]
    fn test_timeout_never_zero() {
        assert_eq!(timeout(0), Duration::from_millis(1));
        assert_eq!(timeout(2000), Duration::from_millis(2000));
    }
}
