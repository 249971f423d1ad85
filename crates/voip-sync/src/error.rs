//! Error types for VoIP synchronisation

use thiserror::Error;

pub type Result<T> = std::result::Result<T, VoipSyncError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VoipSyncError {
    /// SIP message carried no Call-ID
    #[error("SIP message has no Call-ID")]
    MissingCallId,

    /// INVITE without a usable To: URI identity
    #[error("unable to derive SIP identity from To: URI")]
    MissingToIdentity,

    /// SDP media description named an unusable address or port
    #[error("invalid RTP media endpoint: {0}")]
    InvalidMediaEndpoint(String),

    /// Provisioner frame was shorter than its fields claim
    #[error("provisioner message truncated: needed {required} bytes, had {available}")]
    ProvisionerTruncated { required: usize, available: usize },

    /// Provisioner frame opcode is unknown
    #[error("unknown provisioner opcode {0}")]
    UnknownOpcode(u16),

    /// Provisioner frame body could not be decoded
    #[error("invalid provisioner message: {0}")]
    InvalidProvisionerMessage(String),
}
