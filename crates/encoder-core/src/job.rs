//! Encoding jobs and results
//!
//! An [`EncodingJob`] carries one record to be encoded; its payload is a
//! tagged union with one case per intercept record type, so the worker's
//! dispatch is exhaustive.

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// Intercept record types carried through the export path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    IpCc,
    IpIri,
    IpMmCc,
    IpMmIri,
    UmtsCc,
    UmtsIri,
    /// Raw IP payload passed through for collector synchronisation
    RawIpSync,
}

impl RecordType {
    /// Tag used in the export frame header
    pub fn wire_tag(self) -> u16 {
        match self {
            RecordType::IpCc => 1,
            RecordType::IpIri => 2,
            RecordType::IpMmCc => 3,
            RecordType::IpMmIri => 4,
            RecordType::UmtsCc => 5,
            RecordType::UmtsIri => 6,
            RecordType::RawIpSync => 7,
        }
    }

    pub fn from_wire_tag(tag: u16) -> Option<Self> {
        match tag {
            1 => Some(RecordType::IpCc),
            2 => Some(RecordType::IpIri),
            3 => Some(RecordType::IpMmCc),
            4 => Some(RecordType::IpMmIri),
            5 => Some(RecordType::UmtsCc),
            6 => Some(RecordType::UmtsIri),
            7 => Some(RecordType::RawIpSync),
            _ => None,
        }
    }
}

/// Dialog typing for multimedia IRI records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IriType {
    Begin,
    Continue,
    End,
    Report,
}

impl IriType {
    pub fn as_u8(self) -> u8 {
        match self {
            IriType::Begin => 1,
            IriType::Continue => 2,
            IriType::End => 3,
            IriType::Report => 4,
        }
    }
}

/// One record's payload, tagged by intercept type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordPayload {
    RawIp(Bytes),
    IpCc(Bytes),
    IpIri(Bytes),
    IpMmIri { iri_type: IriType, contents: Bytes },
    IpMmCc(Bytes),
    UmtsCc(Bytes),
    UmtsIri { contents: Bytes, operator_id: Option<String> },
}

impl RecordPayload {
    pub fn record_type(&self) -> RecordType {
        match self {
            RecordPayload::RawIp(_) => RecordType::RawIpSync,
            RecordPayload::IpCc(_) => RecordType::IpCc,
            RecordPayload::IpIri(_) => RecordType::IpIri,
            RecordPayload::IpMmIri { .. } => RecordType::IpMmIri,
            RecordPayload::IpMmCc(_) => RecordType::IpMmCc,
            RecordPayload::UmtsCc(_) => RecordType::UmtsCc,
            RecordPayload::UmtsIri { .. } => RecordType::UmtsIri,
        }
    }

    pub fn contents(&self) -> &Bytes {
        match self {
            RecordPayload::RawIp(c)
            | RecordPayload::IpCc(c)
            | RecordPayload::IpIri(c)
            | RecordPayload::IpMmIri { contents: c, .. }
            | RecordPayload::IpMmCc(c)
            | RecordPayload::UmtsCc(c)
            | RecordPayload::UmtsIri { contents: c, .. } => c,
        }
    }
}

/// One unit of encoding work, owned by whoever holds it
#[derive(Debug, Clone)]
pub struct EncodingJob {
    pub payload: RecordPayload,
    pub liid: String,
    pub cin: String,
    pub seq_no: u32,
    pub dest_id: u32,
    pub internal_id: u64,
    pub timestamp: DateTime<Utc>,
    /// Ask for BER output; honoured only when the encoder supports it
    pub prefer_ber: bool,
    /// Pre-encoded header template prepended to the record body
    pub preencoded: Option<Bytes>,
}

impl EncodingJob {
    pub fn new(payload: RecordPayload, liid: impl Into<String>, cin: impl Into<String>) -> Self {
        EncodingJob {
            payload,
            liid: liid.into(),
            cin: cin.into(),
            seq_no: 0,
            dest_id: 0,
            internal_id: 0,
            timestamp: Utc::now(),
            prefer_ber: false,
            preencoded: None,
        }
    }

    pub fn with_seq_no(mut self, seq_no: u32) -> Self {
        self.seq_no = seq_no;
        self
    }

    pub fn with_dest_id(mut self, dest_id: u32) -> Self {
        self.dest_id = dest_id;
        self
    }
}

/// Outcome of encoding one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedResult {
    /// Encoded record body (the raw IP payload for `RawIpSync`)
    pub body: Bytes,
    pub liid: String,
    pub cin: String,
    pub seq_no: u32,
    pub dest_id: u32,
    pub record_type: RecordType,
    pub internal_id: u64,
    /// Worker that produced this result, for traceability
    pub encoded_by: usize,
    pub is_der: bool,
}

impl EncodedResult {
    /// Build the length-prefixed export frame for this result
    pub fn to_frame(&self) -> Bytes {
        crate::frame::encode_export_frame(
            self.record_type,
            self.internal_id,
            &self.liid,
            &self.body,
        )
    }
}

/// Message pushed to a forwarder queue. `EndOfStream` tells the forwarder
/// that no further results will arrive from this worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardMessage {
    Record(EncodedResult),
    EndOfStream,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_type_tags_round_trip() {
        for rt in [
            RecordType::IpCc,
            RecordType::IpIri,
            RecordType::IpMmCc,
            RecordType::IpMmIri,
            RecordType::UmtsCc,
            RecordType::UmtsIri,
            RecordType::RawIpSync,
        ] {
            assert_eq!(RecordType::from_wire_tag(rt.wire_tag()), Some(rt));
        }
        assert_eq!(RecordType::from_wire_tag(0), None);
    }

    #[test]
    fn payload_reports_its_record_type() {
        let payload = RecordPayload::IpMmIri {
            iri_type: IriType::Begin,
            contents: Bytes::from_static(b"INVITE"),
        };
        assert_eq!(payload.record_type(), RecordType::IpMmIri);
        assert_eq!(&payload.contents()[..], b"INVITE");
    }
}
