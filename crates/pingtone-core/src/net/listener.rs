//! UDP listener feeding the sample window
//!
//! ## Wire Format
//!
//! Each datagram carries exactly one 5-byte record:
//!
//! ```text
//! [u32_le magnitude][u8 tag]
//! ```
//!
//! Datagrams of any other length are logged and dropped. The listener never
//! fails on bad input; only binding the socket can fail.

use crate::shutdown::ShutdownListener;
use crate::stats::window::SampleWindow;
use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::UdpSocket;

/// Length of one wire record in bytes
pub const RECORD_LEN: usize = 5;

/// Receive buffer size; larger than a record so oversized datagrams are
/// detected instead of silently truncated
const RECV_BUFFER_LEN: usize = 512;

/// Errors decoding a datagram
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("Datagram must be {expected} bytes, got {actual}")]
    BadLength { expected: usize, actual: usize },
}

/// Errors setting up the listener
#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("Failed to bind UDP socket on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// One decoded measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireRecord {
    /// Measured magnitude (latency in µs)
    pub magnitude: u32,
    /// Inclusion tag checked against the window filter
    pub tag: u8,
}

impl WireRecord {
    /// Encode into the 5-byte wire layout
    pub fn encode(&self) -> [u8; RECORD_LEN] {
        let m = self.magnitude.to_le_bytes();
        [m[0], m[1], m[2], m[3], self.tag]
    }
}

/// Decode a datagram into a record
///
/// # Example
/// ```
/// use pingtone_core::decode_record;
///
/// let record = decode_record(&[0x10, 0x27, 0, 0, 3]).unwrap();
/// assert_eq!(record.magnitude, 10_000);
/// assert_eq!(record.tag, 3);
/// assert!(decode_record(&[1, 2, 3]).is_err());
/// ```
pub fn decode_record(datagram: &[u8]) -> Result<WireRecord, WireError> {
    let bytes: &[u8; RECORD_LEN] = datagram.try_into().map_err(|_| WireError::BadLength {
        expected: RECORD_LEN,
        actual: datagram.len(),
    })?;
    Ok(WireRecord {
        magnitude: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        tag: bytes[4],
    })
}

/// Datagram counters, updated by the listener task
#[derive(Debug, Default)]
pub struct ListenerStats {
    received: AtomicU64,
    malformed: AtomicU64,
}

impl ListenerStats {
    /// Well-formed records received (before tag filtering)
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Datagrams dropped for having the wrong length
    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }
}

/// Decode one datagram and record it into `window`
///
/// Malformed datagrams leave the window untouched.
pub fn ingest(
    window: &SampleWindow,
    stats: &ListenerStats,
    datagram: &[u8],
) -> Result<WireRecord, WireError> {
    match decode_record(datagram) {
        Ok(record) => {
            stats.received.fetch_add(1, Ordering::Relaxed);
            window.record(record.magnitude, record.tag);
            Ok(record)
        }
        Err(e) => {
            stats.malformed.fetch_add(1, Ordering::Relaxed);
            Err(e)
        }
    }
}

/// Address to hand to the socket
///
/// An empty host (`":12345"`) means every IPv4 interface. Anything else is
/// passed through, so host names resolve at bind time.
pub fn bind_address(addr: &str) -> Cow<'_, str> {
    if addr.starts_with(':') {
        Cow::Owned(format!("0.0.0.0{}", addr))
    } else {
        Cow::Borrowed(addr)
    }
}

/// Async UDP receiver writing measurements into a [`SampleWindow`]
pub struct UdpListener {
    socket: UdpSocket,
    window: Arc<SampleWindow>,
    stats: Arc<ListenerStats>,
}

impl UdpListener {
    /// Bind to `addr` (e.g. `0.0.0.0:12345`, `localhost:9000` or `:12345`)
    pub async fn bind(addr: &str, window: Arc<SampleWindow>) -> Result<Self, ListenerError> {
        let target = bind_address(addr);
        let socket = UdpSocket::bind(target.as_ref())
            .await
            .map_err(|source| ListenerError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        Ok(Self {
            socket,
            window,
            stats: Arc::new(ListenerStats::default()),
        })
    }

    /// Address the socket is bound to
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Counters shared with the supervisor
    pub fn stats(&self) -> Arc<ListenerStats> {
        Arc::clone(&self.stats)
    }

    /// Receive until shutdown
    ///
    /// Receive errors are logged and the loop continues; only the shutdown
    /// signal ends it.
    pub async fn run(self, mut shutdown: ShutdownListener) {
        let mut buf = [0u8; RECV_BUFFER_LEN];
        let local = self
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        tracing::info!(
            addr = %local,
            filter = ?self.window.filter().tags(),
            "UDP listener running"
        );

        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, peer)) => {
                        if let Err(e) = ingest(&self.window, &self.stats, &buf[..len]) {
                            tracing::warn!(peer = %peer, error = %e, "Ignoring malformed datagram");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "UDP receive failed");
                    }
                },
            }
        }

        tracing::info!(
            received = self.stats.received(),
            malformed = self.stats.malformed(),
            "UDP listener stopped"
        );
    }
}
