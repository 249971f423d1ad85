//! ETSI record body encoding
//!
//! The ASN.1 machinery proper lives behind the [`EtsiEncoder`] trait; the
//! worker only ever sees opaque encoded bodies. [`DerEncoder`] is the
//! default implementation and produces deterministic DER. BER output is
//! used only when a job asks for it and the encoder supports it.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{EncoderError, Result};
use crate::job::{EncodingJob, RecordPayload};

/// Encoder seam for ETSI record bodies
pub trait EtsiEncoder: Send {
    /// Whether this encoder can produce BER output
    fn supports_ber(&self) -> bool {
        false
    }

    /// Encode the job's record as DER
    fn encode_der(&mut self, job: &EncodingJob) -> Result<Bytes>;

    /// Encode the job's record as BER
    fn encode_ber(&mut self, _job: &EncodingJob) -> Result<Bytes> {
        Err(EncoderError::BerUnsupported)
    }
}

/// Deterministic DER encoder for intercept record bodies.
///
/// Each record becomes a SEQUENCE of the sequence number, the record
/// timestamp as GeneralizedTime, any type-specific fields (dialog typing
/// for multimedia IRI, operator identifier for UMTS IRI) and the payload
/// contents as an OCTET STRING. A job's pre-encoded template, when present,
/// is emitted ahead of those fields.
#[derive(Debug, Default)]
pub struct DerEncoder;

impl DerEncoder {
    pub fn new() -> Self {
        DerEncoder
    }
}

impl EtsiEncoder for DerEncoder {
    fn encode_der(&mut self, job: &EncodingJob) -> Result<Bytes> {
        let mut inner = BytesMut::new();

        if let Some(pre) = &job.preencoded {
            inner.put_slice(pre);
        }

        put_integer(&mut inner, job.seq_no);
        put_generalized_time(&mut inner, job);

        match &job.payload {
            RecordPayload::RawIp(_) => {
                // raw sync payloads bypass ASN.1 framing entirely
                return Err(EncoderError::EncodeFailed(
                    "raw IP sync records are not ETSI-encoded".into(),
                ));
            }
            RecordPayload::IpMmIri { iri_type, .. } => {
                put_tlv(&mut inner, 0x0a, &[iri_type.as_u8()]);
            }
            RecordPayload::UmtsIri { operator_id, .. } => {
                if let Some(op) = operator_id {
                    put_tlv(&mut inner, 0x0c, op.as_bytes());
                }
            }
            _ => {}
        }

        put_tlv(&mut inner, 0x04, job.payload.contents());

        let mut out = BytesMut::with_capacity(inner.len() + 4);
        put_tlv(&mut out, 0x30, &inner);
        Ok(out.freeze())
    }
}

fn put_tlv(buf: &mut BytesMut, tag: u8, content: &[u8]) {
    buf.put_u8(tag);
    put_length(buf, content.len());
    buf.put_slice(content);
}

/// DER definite-length encoding: short form below 128, long form above
fn put_length(buf: &mut BytesMut, len: usize) {
    if len < 128 {
        buf.put_u8(len as u8);
        return;
    }
    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    let significant = &bytes[skip..];
    buf.put_u8(0x80 | significant.len() as u8);
    buf.put_slice(significant);
}

/// Minimal two's-complement INTEGER
fn put_integer(buf: &mut BytesMut, value: u32) {
    let bytes = value.to_be_bytes();
    let skip = bytes
        .iter()
        .take_while(|b| **b == 0)
        .count()
        .min(bytes.len() - 1);
    let mut content: Vec<u8> = bytes[skip..].to_vec();
    if content[0] & 0x80 != 0 {
        content.insert(0, 0);
    }
    put_tlv(buf, 0x02, &content);
}

fn put_generalized_time(buf: &mut BytesMut, job: &EncodingJob) {
    let stamp = job.timestamp.format("%Y%m%d%H%M%SZ").to_string();
    put_tlv(buf, 0x18, stamp.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::IriType;
    use chrono::TimeZone;

    fn job(payload: RecordPayload) -> EncodingJob {
        let mut job = EncodingJob::new(payload, "LIID1", "1001");
        job.seq_no = 7;
        job.timestamp = chrono::Utc.with_ymd_and_hms(2024, 5, 4, 12, 30, 0).unwrap();
        job
    }

    #[test]
    fn der_body_is_a_sequence() {
        let mut enc = DerEncoder::new();
        let body = enc
            .encode_der(&job(RecordPayload::IpCc(Bytes::from_static(b"pkt"))))
            .unwrap();

        assert_eq!(body[0], 0x30);
        // INTEGER 7 comes first
        assert_eq!(&body[2..5], &[0x02, 0x01, 0x07]);
        // payload rides at the tail as an OCTET STRING
        assert_eq!(&body[body.len() - 5..], &[0x04, 0x03, b'p', b'k', b't']);
    }

    #[test]
    fn identical_jobs_encode_identically() {
        let mut enc = DerEncoder::new();
        let a = enc
            .encode_der(&job(RecordPayload::IpMmIri {
                iri_type: IriType::Begin,
                contents: Bytes::from_static(b"INVITE sip:x"),
            }))
            .unwrap();
        let b = enc
            .encode_der(&job(RecordPayload::IpMmIri {
                iri_type: IriType::Begin,
                contents: Bytes::from_static(b"INVITE sip:x"),
            }))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn umts_iri_carries_operator_id() {
        let mut enc = DerEncoder::new();
        let body = enc
            .encode_der(&job(RecordPayload::UmtsIri {
                contents: Bytes::from_static(b"x"),
                operator_id: Some("opa".into()),
            }))
            .unwrap();
        let needle = [0x0c, 0x03, b'o', b'p', b'a'];
        assert!(body.windows(needle.len()).any(|w| w == needle));
    }

    #[test]
    fn ber_is_refused_by_default() {
        let mut enc = DerEncoder::new();
        assert!(!enc.supports_ber());
        assert_eq!(
            enc.encode_ber(&job(RecordPayload::IpCc(Bytes::new()))),
            Err(EncoderError::BerUnsupported)
        );
    }

    #[test]
    fn long_form_length_is_used_for_large_payloads() {
        let mut enc = DerEncoder::new();
        let big = Bytes::from(vec![0xab; 300]);
        let body = enc.encode_der(&job(RecordPayload::IpCc(big))).unwrap();
        // outer sequence must use long-form length (0x82 = two length bytes)
        assert_eq!(body[1], 0x82);
    }
}
