//! VoIP intercepts and shared per-call state
//!
//! A [`VoipIntercept`] is one warrant: a LIID, its target identities, and
//! three keyed collections tying signalling identifiers to calls. A call's
//! shared state ([`CinShared`]) is referenced from both the Call-ID map and
//! the SDP map; `Arc` strong counts play the role of the reference count,
//! so the block frees when the last mapping is removed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::rtp::RtpStream;
use crate::sip::SipMessage;
use crate::targets::SipTarget;

/// Shared state for one communication under an intercept: the CIN and the
/// IRI sequence counter for records exported against it.
#[derive(Debug)]
pub struct CinShared {
    pub cin: u32,
    iri_seqno: AtomicU32,
}

impl CinShared {
    pub fn new(cin: u32) -> Self {
        CinShared {
            cin,
            iri_seqno: AtomicU32::new(0),
        }
    }

    /// Claim the next IRI sequence number
    pub fn next_iri_seq(&self) -> u32 {
        self.iri_seqno.fetch_add(1, Ordering::Relaxed)
    }

    pub fn iri_seq(&self) -> u32 {
        self.iri_seqno.load(Ordering::Relaxed)
    }
}

/// SDP origin key: (session id, version)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SdpIdentifier {
    pub session_id: u64,
    pub version: u64,
}

impl SdpIdentifier {
    pub fn new(session_id: u64, version: u64) -> Self {
        SdpIdentifier {
            session_id,
            version,
        }
    }

    /// Derive the key from a message's SDP origin fields. Unparseable
    /// values are logged and treated as absent.
    pub fn from_message(msg: &SipMessage) -> Self {
        let session_id = match msg.session_id() {
            Some(raw) => match raw.parse::<u64>() {
                Ok(v) => v,
                Err(_) => {
                    warn!(session_id = raw, "invalid session ID in SIP packet");
                    0
                }
            },
            None => 0,
        };
        let version = match msg.session_version() {
            Some(raw) => match raw.parse::<u64>() {
                Ok(v) => v,
                Err(_) => {
                    warn!(version = raw, "invalid session version in SIP packet");
                    0
                }
            },
            None => 0,
        };
        SdpIdentifier::new(session_id, version)
    }

    /// Whether the message carried a usable SDP origin at all
    pub fn is_set(&self) -> bool {
        self.session_id != 0 || self.version != 0
    }
}

/// One interception warrant and everything tracked under it
#[derive(Debug)]
pub struct VoipIntercept {
    pub liid: String,
    pub internal_id: u64,
    pub destination_id: u32,
    pub targets: Vec<SipTarget>,
    /// Call-ID -> shared call state
    pub cin_callid_map: HashMap<String, Arc<CinShared>>,
    /// (SDP session id, version) -> shared call state
    pub cin_sdp_map: HashMap<SdpIdentifier, Arc<CinShared>>,
    /// "LIID-CIN" -> RTP stream
    pub active_cins: HashMap<String, RtpStream>,
    pub active: bool,
    pub awaiting_confirm: bool,
}

impl VoipIntercept {
    pub fn new(liid: String, internal_id: u64, destination_id: u32) -> Self {
        VoipIntercept {
            liid,
            internal_id,
            destination_id,
            targets: Vec::new(),
            cin_callid_map: HashMap::new(),
            cin_sdp_map: HashMap::new(),
            active_cins: HashMap::new(),
            active: true,
            awaiting_confirm: false,
        }
    }

    /// Stream key for a CIN under this intercept
    pub fn stream_key(&self, cin: u32) -> String {
        format!("{}-{}", self.liid, cin)
    }

    /// Number of index entries (Call-ID plus SDP) referencing a CIN.
    ///
    /// Mirrors the reference count of the shared block; used by tests to
    /// check the mapping invariant.
    pub fn mapping_count(&self, cin: u32) -> usize {
        self.cin_callid_map.values().filter(|s| s.cin == cin).count()
            + self.cin_sdp_map.values().filter(|s| s.cin == cin).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sdp_identifier_parses_and_flags_bad_values() {
        let msg = SipMessage::invite().with_sdp_session("10", "0");
        let sdp = SdpIdentifier::from_message(&msg);
        assert_eq!(sdp, SdpIdentifier::new(10, 0));
        assert!(sdp.is_set());

        let msg = SipMessage::invite().with_sdp_session("not-a-number", "0");
        let sdp = SdpIdentifier::from_message(&msg);
        assert_eq!(sdp, SdpIdentifier::new(0, 0));
        assert!(!sdp.is_set());

        let msg = SipMessage::invite();
        assert!(!SdpIdentifier::from_message(&msg).is_set());
    }

    #[test]
    fn iri_sequence_numbers_are_monotonic() {
        let shared = CinShared::new(1234);
        assert_eq!(shared.next_iri_seq(), 0);
        assert_eq!(shared.next_iri_seq(), 1);
        assert_eq!(shared.iri_seq(), 2);
    }
}
