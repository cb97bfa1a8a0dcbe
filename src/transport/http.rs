//! Plaintext HTTP/1.1 transport.
//!
//! One connection per call, no keep-alive. The response is scanned byte by
//! byte so the header terminator and the status code are found even when
//! they straddle read boundaries.

use std::fmt::Write as _;
use std::io::{ErrorKind, Read, Write};
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};

use tracing::{debug, warn};

use super::{timeout, Connection, Connector, Exchange, TcpConnector, Transport};
use crate::config::Endpoint;
use crate::error::UplinkError;
use crate::platform::{LogLevel, Platform};

/// Maximum size of the request line plus headers.
pub const REQUEST_HEADER_LEN: usize = 256;

/// Bytes of the response header kept for status parsing.
pub const RESPONSE_HEADER_LEN: usize = 512;

/// Read chunk size.
const READ_CHUNK_LEN: usize = 128;

/// `\r\n\r\n` as a big-endian rolling window.
const HEADER_END_MARKER: u32 = 0x0D0A_0D0A;

/// HTTP transport over any [`Connector`].
///
/// # Example
///
/// ```no_run
/// use edge_uplink::config::Config;
/// use edge_uplink::platform::PlatformHooks;
/// use edge_uplink::transport::{HttpTransport, Transport};
///
/// let config = Config::default();
/// let platform = PlatformHooks::default().resolve();
/// let transport: HttpTransport = HttpTransport::default();
/// let mut body = [0u8; 512];
///
/// let exchange = transport.post_json(
///     &config.endpoint,
///     &platform,
///     r#"{"deviceId":"dev1","messageId":1,"ts":0,"type":"PING","payload":{}}"#,
///     config.send_timeout_ms,
///     config.recv_timeout_ms,
///     &mut body,
/// );
/// println!("{:?}", exchange);
/// ```
#[derive(Debug, Clone, Default)]
pub struct HttpTransport<C = TcpConnector> {
    connector: C,
}

impl<C: Connector> HttpTransport<C> {
    /// Create a transport that opens connections through `connector`.
    pub fn new(connector: C) -> Self {
        Self { connector }
    }
}

impl<C: Connector> Transport for HttpTransport<C> {
    fn post_json(
        &self,
        endpoint: &Endpoint,
        platform: &Platform,
        json: &str,
        send_timeout_ms: u32,
        recv_timeout_ms: u32,
        body: &mut [u8],
    ) -> Result<Exchange, UplinkError> {
        let header = request_header(endpoint, json.len())?;

        let addr = resolve(endpoint).map_err(|e| {
            warn!(host = %endpoint.host, error = %e, "Failed to resolve host");
            platform.log(LogLevel::Error, || {
                format!("resolve host failed: {}", endpoint.host)
            });
            e
        })?;

        let mut conn = self
            .connector
            .connect(addr, timeout(send_timeout_ms), timeout(recv_timeout_ms))
            .map_err(|e| {
                debug!(addr = %addr, error = %e, "Connect failed");
                UplinkError::TransportError
            })?;

        let result = exchange(conn.as_mut(), &header, json, body);
        conn.close();

        match &result {
            Ok(ex) if ex.truncated => warn!(
                addr = %addr,
                status = ex.http_status,
                kept = ex.body_len,
                "Response body exceeded buffer, remainder drained"
            ),
            Ok(ex) => debug!(
                addr = %addr,
                status = ex.http_status,
                body_len = ex.body_len,
                "HTTP exchange complete"
            ),
            Err(e) => debug!(addr = %addr, error = %e, "HTTP exchange failed"),
        }
        result
    }
}

/// Request line and headers for a POST of `content_len` bytes.
fn request_header(
    endpoint: &Endpoint,
    content_len: usize,
) -> Result<heapless::String<REQUEST_HEADER_LEN>, UplinkError> {
    let mut header = heapless::String::new();
    write!(
        header,
        "POST {} HTTP/1.1\r\n\
         Host: {}\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n",
        endpoint.path, endpoint.host, content_len
    )
    .map_err(|_| UplinkError::BufferTooSmall)?;
    Ok(header)
}

/// Turn the endpoint host into a socket address.
///
/// Without `use_dns` the host must be an IP literal.
fn resolve(endpoint: &Endpoint) -> Result<SocketAddr, UplinkError> {
    if !endpoint.use_dns {
        let ip: IpAddr = endpoint
            .host
            .parse()
            .map_err(|_| UplinkError::InvalidArg)?;
        return Ok(SocketAddr::new(ip, endpoint.port));
    }

    (endpoint.host.as_str(), endpoint.port)
        .to_socket_addrs()
        .map_err(|_| UplinkError::TransportError)?
        .next()
        .ok_or(UplinkError::TransportError)
}

/// Write the request and scan the whole response.
fn exchange(
    conn: &mut dyn Connection,
    header: &str,
    json: &str,
    body: &mut [u8],
) -> Result<Exchange, UplinkError> {
    conn.write_all(header.as_bytes())
        .and_then(|_| conn.write_all(json.as_bytes()))
        .and_then(|_| conn.flush())
        .map_err(|e| {
            debug!(error = %e, "Request write failed");
            UplinkError::TransportError
        })?;

    let mut scanner = ResponseScanner::new(body);
    let mut chunk = [0u8; READ_CHUNK_LEN];

    // Read until the peer closes; a timeout or reset also ends the response
    loop {
        match conn.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => scanner.feed(&chunk[..n]),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!(error = %e, "Response read ended");
                break;
            }
        }
    }

    scanner.finish()
}

/// Incremental response parser writing the body into a caller buffer.
struct ResponseScanner<'a> {
    header: [u8; RESPONSE_HEADER_LEN],
    header_used: usize,
    header_done: bool,
    marker: u32,
    http_status: u16,
    body: &'a mut [u8],
    body_used: usize,
    truncated: bool,
}

impl<'a> ResponseScanner<'a> {
    fn new(body: &'a mut [u8]) -> Self {
        Self {
            header: [0; RESPONSE_HEADER_LEN],
            header_used: 0,
            header_done: false,
            marker: 0,
            http_status: 0,
            body,
            body_used: 0,
            truncated: false,
        }
    }

    fn feed(&mut self, bytes: &[u8]) {
        for &b in bytes {
            if self.header_done {
                self.push_body(b);
                continue;
            }

            // Oversized headers are still scanned for the terminator, just not kept
            if self.header_used < self.header.len() {
                self.header[self.header_used] = b;
                self.header_used += 1;
            }

            self.marker = (self.marker << 8) | u32::from(b);
            if self.marker == HEADER_END_MARKER {
                self.header_done = true;
                self.http_status = parse_status(&self.header[..self.header_used]);
            }
        }
    }

    fn push_body(&mut self, b: u8) {
        match self.body.get_mut(self.body_used) {
            Some(slot) => {
                *slot = b;
                self.body_used += 1;
            }
            None => self.truncated = true,
        }
    }

    fn finish(self) -> Result<Exchange, UplinkError> {
        if !self.header_done {
            return Err(UplinkError::TransportError);
        }
        Ok(Exchange {
            http_status: self.http_status,
            body_len: self.body_used,
            truncated: self.truncated,
        })
    }
}

/// Status code from a response header such as `HTTP/1.1 200 OK\r\n...`.
///
/// Reads the three bytes after the first space; returns 0 unless all three
/// are ASCII digits.
fn parse_status(header: &[u8]) -> u16 {
    // Shortest meaningful status line: "HTTP/1.1 200"
    if header.len() < 12 {
        return 0;
    }

    let Some(space) = header.iter().position(|&b| b == b' ') else {
        return 0;
    };

    match header.get(space + 1..space + 4) {
        Some(digits) if digits.iter().all(u8::is_ascii_digit) => digits
            .iter()
            .fold(0u16, |acc, &d| acc * 10 + u16::from(d - b'0')),
        _ => 0,
    }
}
