//! Error types for record encoding and export framing

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EncoderError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncoderError {
    /// BER output was requested but the encoder only produces DER
    #[error("encoder does not support BER output")]
    BerUnsupported,

    /// Record could not be encoded
    #[error("failed to encode record: {0}")]
    EncodeFailed(String),

    /// Export frame did not start with the expected magic
    #[error("bad export frame magic {0:#010x}")]
    BadMagic(u32),

    /// Export frame was shorter than its headers claim
    #[error("export frame truncated: needed {required} bytes, had {available}")]
    FrameTruncated { required: usize, available: usize },

    /// Record-type tag in an export frame is unknown
    #[error("unknown record type tag {0}")]
    UnknownRecordType(u16),
}
