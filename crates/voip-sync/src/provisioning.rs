//! Provisioner control messages
//!
//! Inbound frames from the provisioner, length-framed binary:
//!
//! ```text
//! opcode (u16) | liid len (u16) | liid | opcode-specific body
//! ```
//!
//! Intercept announcements carry the internal id and destination id;
//! target messages carry a username and optional realm, each u16
//! length-prefixed (zero length meaning absent). Integers are big-endian.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, VoipSyncError};
use crate::sip::SipIdentity;

pub const OP_VOIPINTERCEPT_START: u16 = 1;
pub const OP_VOIPINTERCEPT_HALT: u16 = 2;
pub const OP_SIP_TARGET_ADD: u16 = 3;
pub const OP_SIP_TARGET_WITHDRAW: u16 = 4;

/// Body of a `VOIPINTERCEPT_START`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptAnnouncement {
    pub liid: String,
    pub internal_id: u64,
    pub destination_id: u32,
}

/// A decoded provisioner frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionerMessage {
    InterceptStart(InterceptAnnouncement),
    InterceptHalt { liid: String },
    TargetAdd { liid: String, identity: SipIdentity },
    TargetWithdraw { liid: String, identity: SipIdentity },
}

impl ProvisionerMessage {
    pub fn liid(&self) -> &str {
        match self {
            ProvisionerMessage::InterceptStart(ann) => &ann.liid,
            ProvisionerMessage::InterceptHalt { liid }
            | ProvisionerMessage::TargetAdd { liid, .. }
            | ProvisionerMessage::TargetWithdraw { liid, .. } => liid,
        }
    }
}

fn take_string(buf: &mut impl Buf) -> Result<String> {
    if buf.remaining() < 2 {
        return Err(VoipSyncError::ProvisionerTruncated {
            required: 2,
            available: buf.remaining(),
        });
    }
    let len = usize::from(buf.get_u16());
    if buf.remaining() < len {
        return Err(VoipSyncError::ProvisionerTruncated {
            required: len,
            available: buf.remaining(),
        });
    }
    let raw = buf.copy_to_bytes(len);
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

fn take_identity(buf: &mut impl Buf) -> Result<SipIdentity> {
    let username = take_string(buf)?;
    if username.is_empty() {
        return Err(VoipSyncError::InvalidProvisionerMessage(
            "target username is empty".into(),
        ));
    }
    let realm = take_string(buf)?;
    Ok(SipIdentity {
        username,
        realm: if realm.is_empty() { None } else { Some(realm) },
    })
}

fn put_string(buf: &mut BytesMut, value: &str) {
    buf.put_u16(value.len() as u16);
    buf.put_slice(value.as_bytes());
}

/// Decode one provisioner frame
pub fn decode_provisioner_message(buf: &mut impl Buf) -> Result<ProvisionerMessage> {
    if buf.remaining() < 2 {
        return Err(VoipSyncError::ProvisionerTruncated {
            required: 2,
            available: buf.remaining(),
        });
    }
    let opcode = buf.get_u16();
    let liid = take_string(buf)?;
    if liid.is_empty() {
        return Err(VoipSyncError::InvalidProvisionerMessage(
            "LIID is empty".into(),
        ));
    }

    match opcode {
        OP_VOIPINTERCEPT_START => {
            if buf.remaining() < 12 {
                return Err(VoipSyncError::ProvisionerTruncated {
                    required: 12,
                    available: buf.remaining(),
                });
            }
            let internal_id = buf.get_u64();
            let destination_id = buf.get_u32();
            Ok(ProvisionerMessage::InterceptStart(InterceptAnnouncement {
                liid,
                internal_id,
                destination_id,
            }))
        }
        OP_VOIPINTERCEPT_HALT => Ok(ProvisionerMessage::InterceptHalt { liid }),
        OP_SIP_TARGET_ADD => Ok(ProvisionerMessage::TargetAdd {
            liid,
            identity: take_identity(buf)?,
        }),
        OP_SIP_TARGET_WITHDRAW => Ok(ProvisionerMessage::TargetWithdraw {
            liid,
            identity: take_identity(buf)?,
        }),
        other => Err(VoipSyncError::UnknownOpcode(other)),
    }
}

/// Encode a provisioner frame (used by tests and the provisioner shim)
pub fn encode_provisioner_message(msg: &ProvisionerMessage) -> Bytes {
    let mut buf = BytesMut::new();
    match msg {
        ProvisionerMessage::InterceptStart(ann) => {
            buf.put_u16(OP_VOIPINTERCEPT_START);
            put_string(&mut buf, &ann.liid);
            buf.put_u64(ann.internal_id);
            buf.put_u32(ann.destination_id);
        }
        ProvisionerMessage::InterceptHalt { liid } => {
            buf.put_u16(OP_VOIPINTERCEPT_HALT);
            put_string(&mut buf, liid);
        }
        ProvisionerMessage::TargetAdd { liid, identity } => {
            buf.put_u16(OP_SIP_TARGET_ADD);
            put_string(&mut buf, liid);
            put_string(&mut buf, &identity.username);
            put_string(&mut buf, identity.realm.as_deref().unwrap_or(""));
        }
        ProvisionerMessage::TargetWithdraw { liid, identity } => {
            buf.put_u16(OP_SIP_TARGET_WITHDRAW);
            put_string(&mut buf, liid);
            put_string(&mut buf, &identity.username);
            put_string(&mut buf, identity.realm.as_deref().unwrap_or(""));
        }
    }
    buf.freeze()
}
