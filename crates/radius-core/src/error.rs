//! Error types for RADIUS packet handling

use thiserror::Error;

/// A type alias for handling `Result`s with `RadiusError`
pub type Result<T> = std::result::Result<T, RadiusError>;

/// Errors that can occur while parsing or correlating RADIUS traffic.
///
/// Per-packet errors never abort processing: the caller drops the packet,
/// bumps a counter and moves on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RadiusError {
    /// Packet was not carried over UDP
    #[error("packet is not RADIUS over UDP")]
    NotUdp,

    /// Payload too short to hold a RADIUS header
    #[error("payload too short for RADIUS header: {available} bytes")]
    TruncatedHeader {
        /// Bytes actually available
        available: usize,
    },

    /// Message code is not one the collector understands
    #[error("unknown RADIUS code {0}")]
    UnknownCode(u8),
}
