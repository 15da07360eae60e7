//! Error types shared across the wire codec, interface workers, and
//! configuration loading.
//!
//! Following the conventions already in use across this codebase, these
//! are plain enums with hand-written `Display`/`Error` impls rather
//! than a derive macro.

use std::fmt;
use std::net::IpAddr;

/// Errors that can occur while decoding a DNS message from the wire.
///
/// Each variant carries the byte offset at which the failure was
/// discovered, so a caller logging a dropped datagram can point at the
/// exact byte that broke decoding.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum WireError {
    /// A decoder ran off the end of its input.
    InsufficientData { at: usize },

    /// A label length byte was `>= 64` with non-pointer top bits.
    InvalidLabelLength { at: usize, length: u8 },

    /// A compression pointer was followed back to an offset already
    /// visited while decoding the same name.
    CircularCompressionPointer { at: usize, pointer: u16 },
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::InsufficientData { at } => {
                write!(f, "insufficient data at byte offset {at}")
            }
            WireError::InvalidLabelLength { at, length } => {
                write!(f, "invalid label length {length} at byte offset {at}")
            }
            WireError::CircularCompressionPointer { at, pointer } => write!(
                f,
                "circular compression pointer to offset {pointer} at byte offset {at}"
            ),
        }
    }
}

impl std::error::Error for WireError {}

/// The socket operation a [`SocketError`] happened during.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SocketOp {
    Bind,
    Send,
    Recv,
    SetOpt,
    JoinMulticast,
}

impl fmt::Display for SocketOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SocketOp::Bind => "bind",
            SocketOp::Send => "send",
            SocketOp::Recv => "recv",
            SocketOp::SetOpt => "setsockopt",
            SocketOp::JoinMulticast => "join_multicast",
        };
        f.write_str(s)
    }
}

/// An OS-level socket failure, tagged with which operation and
/// interface it happened on.
#[derive(Debug)]
pub struct SocketError {
    pub op: SocketOp,
    pub ifname: String,
    pub address: Option<IpAddr>,
    pub source: std::io::Error,
}

impl fmt::Display for SocketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed on interface {}: {}",
            self.op, self.ifname, self.source
        )
    }
}

impl std::error::Error for SocketError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Top-level error type unifying wire decode failures, socket
/// failures, and configuration loading failures.
#[derive(Debug)]
pub enum Error {
    Wire(WireError),
    Socket(SocketError),
    Config(config::ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Wire(e) => write!(f, "wire decode error: {e}"),
            Error::Socket(e) => write!(f, "socket error: {e}"),
            Error::Config(e) => write!(f, "configuration error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Wire(e) => Some(e),
            Error::Socket(e) => Some(e),
            Error::Config(e) => Some(e),
        }
    }
}

impl From<WireError> for Error {
    fn from(e: WireError) -> Self {
        Error::Wire(e)
    }
}

impl From<SocketError> for Error {
    fn from(e: SocketError) -> Self {
        Error::Socket(e)
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::Config(e)
    }
}
