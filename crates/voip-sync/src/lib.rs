//! SIP/VoIP synchronisation engine
//!
//! Matches parsed SIP messages against interception targets by Call-ID,
//! SDP session identifier or SIP identity, maintains per-call communication
//! identifiers (CINs), learns RTP endpoints from SDP and pushes stream
//! descriptors to capture threads, and emits dialog-typed IPMMIRI encoding
//! jobs for the encoder pool.
//!
//! All intercept state is owned by one sync task; communication with the
//! rest of the collector happens over typed channels.

pub mod engine;
pub mod error;
pub mod intercept;
pub mod provisioning;
pub mod rtp;
pub mod sip;
pub mod targets;

pub use engine::{SyncCommand, VoipStats, VoipSyncConfig, VoipSyncEngine};
pub use error::{Result, VoipSyncError};
pub use intercept::{CinShared, SdpIdentifier, VoipIntercept};
pub use provisioning::{
    decode_provisioner_message, encode_provisioner_message, InterceptAnnouncement,
    ProvisionerMessage,
};
pub use rtp::{CapturePush, RtpStream, RtpStreamDescriptor, StreamSide};
pub use sip::{SipIdentity, SipMessage};
pub use targets::SipTarget;
