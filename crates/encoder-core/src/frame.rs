//! Export record framing
//!
//! Results leave the collector as length-prefixed frames:
//!
//! ```text
//! magic (u32) | record-type tag (u16) | internal id (u64)
//! | body len (u16) | liid len (u16) | body | liid
//! ```
//!
//! where the body is the ETSI encoding (or the raw IP payload for
//! synchronisation records). All integers are big-endian.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{EncoderError, Result};
use crate::job::RecordType;

pub const EXPORT_MAGIC: u32 = 0x5c4c_4953;

/// Fixed part of the frame header in bytes
pub const FRAME_HEADER_LEN: usize = 4 + 2 + 8 + 2 + 2;

/// A decoded export frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub record_type: RecordType,
    pub internal_id: u64,
    pub body: Bytes,
    pub liid: String,
}

/// Encode one result body into an export frame
pub fn encode_export_frame(
    record_type: RecordType,
    internal_id: u64,
    liid: &str,
    body: &[u8],
) -> Bytes {
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + body.len() + liid.len());
    buf.put_u32(EXPORT_MAGIC);
    buf.put_u16(record_type.wire_tag());
    buf.put_u64(internal_id);
    buf.put_u16(body.len() as u16);
    buf.put_u16(liid.len() as u16);
    buf.put_slice(body);
    buf.put_slice(liid.as_bytes());
    buf.freeze()
}

/// Decode an export frame, consuming it from `buf`
pub fn decode_export_frame(buf: &mut impl Buf) -> Result<DecodedFrame> {
    if buf.remaining() < FRAME_HEADER_LEN {
        return Err(EncoderError::FrameTruncated {
            required: FRAME_HEADER_LEN,
            available: buf.remaining(),
        });
    }

    let magic = buf.get_u32();
    if magic != EXPORT_MAGIC {
        return Err(EncoderError::BadMagic(magic));
    }

    let tag = buf.get_u16();
    let record_type =
        RecordType::from_wire_tag(tag).ok_or(EncoderError::UnknownRecordType(tag))?;
    let internal_id = buf.get_u64();
    let body_len = usize::from(buf.get_u16());
    let liid_len = usize::from(buf.get_u16());

    if buf.remaining() < body_len + liid_len {
        return Err(EncoderError::FrameTruncated {
            required: body_len + liid_len,
            available: buf.remaining(),
        });
    }

    let body = buf.copy_to_bytes(body_len);
    let liid_bytes = buf.copy_to_bytes(liid_len);
    let liid = String::from_utf8_lossy(&liid_bytes).into_owned();

    Ok(DecodedFrame {
        record_type,
        internal_id,
        body,
        liid,
    })
}
