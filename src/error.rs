use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while writing a query into a fixed-size buffer.
/// Nothing is written when one of these is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("label `{label}` is {len} bytes long, labels are limited to 63")]
    LabelTooLong { label: String, len: usize },

    #[error("encoded name is {len} bytes long, names are limited to 255")]
    NameTooLong { len: usize },

    #[error("message needs {needed} bytes but the buffer holds {capacity}")]
    BufferOverflow { needed: usize, capacity: usize },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{0} bytes is too short for a DNS header")]
pub struct ShortHeader(pub usize);

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    FileRead(String, String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Missing required option `{0}`")]
    Missing(&'static str),

    #[error("Server `{0}` is not an IPv4 address")]
    InvalidServer(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Why a single probe produced no sample.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("failed to open UDP socket: {0}")]
    Socket(#[source] io::Error),

    #[error("failed to bind socket to interface {interface}: {source}")]
    InterfaceBind {
        interface: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to send query to {server}: {source}")]
    Transmit {
        server: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to receive reply: {0}")]
    Receive(#[source] io::Error),

    #[error("no reply from {server} within {timeout:?}")]
    Timeout { server: SocketAddr, timeout: Duration },

    #[error("reply contains no answers (rcode {rcode})")]
    EmptyAnswer { rcode: u8 },

    #[error("malformed reply: {0}")]
    MalformedReply(#[from] ShortHeader),

    #[error("failed to encode query: {0}")]
    Encoding(#[from] EncodeError),
}

impl ProbeError {
    /// Short tag used as the `reason` field of failure logs.
    pub fn reason(&self) -> &'static str {
        match self {
            ProbeError::Socket(_) => "socket",
            ProbeError::InterfaceBind { .. } => "interface-bind",
            ProbeError::Transmit { .. } => "transmit",
            ProbeError::Receive(_) => "recv-error",
            ProbeError::Timeout { .. } => "timeout",
            ProbeError::EmptyAnswer { .. } => "empty-answer",
            ProbeError::MalformedReply(_) => "malformed-reply",
            ProbeError::Encoding(_) => "encoding-overflow",
        }
    }
}
