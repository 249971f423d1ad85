//! RADIUS packet parsing
//!
//! Turns a captured UDP datagram into a [`ParsedPacket`]: header fields,
//! attribute set, and the NAS/server addressing derived from the message
//! code. Parsing is defensive; a malformed attribute stream stops the walk
//! without discarding what was already parsed.

use std::net::SocketAddr;

use bytes::Bytes;
use tracing::info;

use crate::attributes::{attr_id, AttributeSet, RadiusAttribute};
use crate::error::{RadiusError, Result};

/// Code + identifier + length + 16-byte authenticator
pub const RADIUS_HEADER_LEN: usize = 20;

/// IP protocol number for UDP
pub const UDP_PROTOCOL: u8 = 17;

/// RADIUS message codes understood by the collector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RadiusCode {
    AccessRequest,
    AccessAccept,
    AccessReject,
    AccountingRequest,
    AccountingResponse,
    AccessChallenge,
}

impl RadiusCode {
    /// True for codes sent by the NAS towards the server
    pub fn is_request(self) -> bool {
        matches!(self, RadiusCode::AccessRequest | RadiusCode::AccountingRequest)
    }

    /// True for codes sent by the server back to the NAS
    pub fn is_response(self) -> bool {
        !self.is_request()
    }
}

impl TryFrom<u8> for RadiusCode {
    type Error = RadiusError;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            1 => Ok(RadiusCode::AccessRequest),
            2 => Ok(RadiusCode::AccessAccept),
            3 => Ok(RadiusCode::AccessReject),
            4 => Ok(RadiusCode::AccountingRequest),
            5 => Ok(RadiusCode::AccountingResponse),
            11 => Ok(RadiusCode::AccessChallenge),
            other => Err(RadiusError::UnknownCode(other)),
        }
    }
}

/// Acct-Status-Type values (attribute 40)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcctStatusType {
    Start,
    Stop,
    InterimUpdate,
    Other(u32),
}

impl From<u32> for AcctStatusType {
    fn from(value: u32) -> Self {
        match value {
            1 => AcctStatusType::Start,
            2 => AcctStatusType::Stop,
            3 => AcctStatusType::InterimUpdate,
            other => AcctStatusType::Other(other),
        }
    }
}

/// Transport-level view of a captured datagram, as handed over by the
/// per-packet classifier. The payload is the UDP payload.
#[derive(Debug, Clone)]
pub struct CapturedPacket {
    /// IP protocol number of the transport header
    pub ip_proto: u8,
    /// Layer-3/4 source of the datagram
    pub src: SocketAddr,
    /// Layer-3/4 destination of the datagram
    pub dst: SocketAddr,
    /// Transport payload
    pub payload: Bytes,
}

impl CapturedPacket {
    /// Convenience constructor for a UDP datagram
    pub fn udp(src: SocketAddr, dst: SocketAddr, payload: Bytes) -> Self {
        CapturedPacket {
            ip_proto: UDP_PROTOCOL,
            src,
            dst,
            payload,
        }
    }
}

/// Per-packet scratch state, reset before each parse.
///
/// The attribute set keeps its allocation between packets; this is the
/// parsed-attribute reuse pool, owned by the sync thread alone.
#[derive(Debug, Default)]
pub struct ParsedPacket {
    pub code: Option<RadiusCode>,
    pub identifier: u8,
    /// Cached Acct-Status-Type for fast FSM branching
    pub acct_status: Option<AcctStatusType>,
    pub nas_port: u32,
    /// Port on the NAS side of the exchange
    pub source_port: u16,
    pub attributes: AttributeSet,
    pub nas_addr: Option<SocketAddr>,
    pub server_addr: Option<SocketAddr>,
}

impl ParsedPacket {
    pub fn new() -> Self {
        ParsedPacket::default()
    }

    /// Clear all per-packet state, keeping allocations
    pub fn reset(&mut self) {
        self.code = None;
        self.identifier = 0;
        self.acct_status = None;
        self.nas_port = 0;
        self.source_port = 0;
        self.attributes.clear();
        self.nas_addr = None;
        self.server_addr = None;
    }

    /// Key identifying the request this packet belongs to within its NAS.
    ///
    /// A reply echoes the identifier and is addressed to the port the
    /// request came from, so `(identifier << 16) | nas-side port` pairs the
    /// two sides of an exchange.
    pub fn request_key(&self) -> u32 {
        (u32::from(self.identifier) << 16) | u32::from(self.source_port)
    }
}

/// Parse a captured datagram into `scratch`.
///
/// On success the scratch holds the header fields, NAS/server addressing
/// and every attribute up to the first malformed one. Errors mean the
/// packet is not usable at all and should be counted as dropped.
pub fn parse_packet(scratch: &mut ParsedPacket, pkt: &CapturedPacket) -> Result<()> {
    scratch.reset();

    if pkt.ip_proto != UDP_PROTOCOL {
        return Err(RadiusError::NotUdp);
    }

    let payload = &pkt.payload;
    if payload.len() < RADIUS_HEADER_LEN {
        return Err(RadiusError::TruncatedHeader {
            available: payload.len(),
        });
    }

    let code = RadiusCode::try_from(payload[0])?;
    scratch.code = Some(code);
    scratch.identifier = payload[1];

    let declared_len = usize::from(u16::from_be_bytes([payload[2], payload[3]]));
    if declared_len > payload.len() {
        info!(
            declared = declared_len,
            captured = payload.len(),
            "RADIUS packet was truncated, some attributes may be missed"
        );
    }

    // For requests the NAS is the source; for responses the roles invert
    // and the NAS-side port is the destination port.
    if code.is_request() {
        scratch.nas_addr = Some(pkt.src);
        scratch.server_addr = Some(pkt.dst);
        scratch.source_port = pkt.src.port();
    } else {
        scratch.nas_addr = Some(pkt.dst);
        scratch.server_addr = Some(pkt.src);
        scratch.source_port = pkt.dst.port();
    }

    walk_attributes(scratch, payload);
    Ok(())
}

fn walk_attributes(scratch: &mut ParsedPacket, payload: &Bytes) {
    let mut off = RADIUS_HEADER_LEN;

    while payload.len() - off > 2 {
        let att_type = payload[off];
        let att_len = usize::from(payload[off + 1]);

        if att_len < 2 {
            // a zero/one-length attribute cannot be advanced over
            break;
        }
        if att_len > payload.len() - off {
            // declared length runs past the captured bytes; keep what we have
            break;
        }

        let attr = RadiusAttribute {
            attr_type: att_type,
            value: payload.slice(off + 2..off + att_len),
        };

        if att_type == attr_id::ACCT_STATUS_TYPE {
            if let Some(v) = attr.as_u32() {
                scratch.acct_status = Some(AcctStatusType::from(v));
            }
        }

        scratch.attributes.insert_first_wins(attr);
        off += att_len;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    pub(crate) fn build_payload(code: u8, identifier: u8, attrs: &[(u8, &[u8])]) -> Bytes {
        let attr_len: usize = attrs.iter().map(|(_, v)| v.len() + 2).sum();
        let total = RADIUS_HEADER_LEN + attr_len;

        let mut buf = BytesMut::with_capacity(total);
        buf.put_u8(code);
        buf.put_u8(identifier);
        buf.put_u16(total as u16);
        buf.put_slice(&[0u8; 16]);
        for (t, v) in attrs {
            buf.put_u8(*t);
            buf.put_u8((v.len() + 2) as u8);
            buf.put_slice(v);
        }
        buf.freeze()
    }

    #[test]
    fn parses_header_and_attributes() {
        let payload = build_payload(1, 7, &[(attr_id::USER_NAME, b"alice")]);
        let pkt = CapturedPacket::udp(addr("10.0.0.2:1024"), addr("10.0.0.1:1812"), payload);

        let mut scratch = ParsedPacket::new();
        parse_packet(&mut scratch, &pkt).unwrap();

        assert_eq!(scratch.code, Some(RadiusCode::AccessRequest));
        assert_eq!(scratch.identifier, 7);
        assert_eq!(scratch.source_port, 1024);
        assert_eq!(scratch.nas_addr, Some(addr("10.0.0.2:1024")));
        assert_eq!(scratch.server_addr, Some(addr("10.0.0.1:1812")));
        let user = scratch.attributes.get(attr_id::USER_NAME).unwrap();
        assert_eq!(&user.value[..], b"alice");
    }

    #[test]
    fn response_inverts_nas_and_server() {
        let payload = build_payload(2, 7, &[]);
        let pkt = CapturedPacket::udp(addr("10.0.0.1:1812"), addr("10.0.0.2:1024"), payload);

        let mut scratch = ParsedPacket::new();
        parse_packet(&mut scratch, &pkt).unwrap();

        assert_eq!(scratch.nas_addr, Some(addr("10.0.0.2:1024")));
        assert_eq!(scratch.server_addr, Some(addr("10.0.0.1:1812")));
        assert_eq!(scratch.source_port, 1024);
        assert_eq!(scratch.request_key(), (7 << 16) | 1024);
    }

    #[test]
    fn non_udp_is_rejected() {
        let payload = build_payload(1, 1, &[]);
        let pkt = CapturedPacket {
            ip_proto: 6,
            src: addr("10.0.0.2:1024"),
            dst: addr("10.0.0.1:1812"),
            payload,
        };
        let mut scratch = ParsedPacket::new();
        assert_eq!(parse_packet(&mut scratch, &pkt), Err(RadiusError::NotUdp));
    }

    #[test]
    fn unknown_code_is_rejected() {
        let payload = build_payload(40, 1, &[]);
        let pkt = CapturedPacket::udp(addr("10.0.0.2:1024"), addr("10.0.0.1:1812"), payload);
        let mut scratch = ParsedPacket::new();
        assert_eq!(
            parse_packet(&mut scratch, &pkt),
            Err(RadiusError::UnknownCode(40))
        );
    }

    #[test]
    fn short_payload_is_rejected() {
        let pkt = CapturedPacket::udp(
            addr("10.0.0.2:1024"),
            addr("10.0.0.1:1812"),
            Bytes::from_static(&[1, 2, 0, 4]),
        );
        let mut scratch = ParsedPacket::new();
        assert_eq!(
            parse_packet(&mut scratch, &pkt),
            Err(RadiusError::TruncatedHeader { available: 4 })
        );
    }

    #[test]
    fn bad_attribute_length_stops_walk_but_keeps_prior() {
        // Second attribute claims 40 bytes but only a few remain.
        let mut buf = BytesMut::new();
        buf.put_u8(1);
        buf.put_u8(9);
        buf.put_u16(40);
        buf.put_slice(&[0u8; 16]);
        buf.put_u8(attr_id::USER_NAME);
        buf.put_u8(7);
        buf.put_slice(b"alice");
        buf.put_u8(attr_id::NAS_IDENTIFIER);
        buf.put_u8(40);
        buf.put_slice(b"nas");

        let pkt = CapturedPacket::udp(
            addr("10.0.0.2:1024"),
            addr("10.0.0.1:1812"),
            buf.freeze(),
        );
        let mut scratch = ParsedPacket::new();
        parse_packet(&mut scratch, &pkt).unwrap();

        assert!(scratch.attributes.get(attr_id::USER_NAME).is_some());
        assert!(scratch.attributes.get(attr_id::NAS_IDENTIFIER).is_none());
    }

    #[test]
    fn acct_status_is_cached() {
        let payload = build_payload(4, 3, &[(attr_id::ACCT_STATUS_TYPE, &[0, 0, 0, 2])]);
        let pkt = CapturedPacket::udp(addr("10.0.0.2:1024"), addr("10.0.0.1:1813"), payload);
        let mut scratch = ParsedPacket::new();
        parse_packet(&mut scratch, &pkt).unwrap();
        assert_eq!(scratch.acct_status, Some(AcctStatusType::Stop));
    }
}
