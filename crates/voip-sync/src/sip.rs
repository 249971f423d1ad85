//! Parsed SIP message view
//!
//! Byte-level SIP parsing happens upstream of this crate; the capture glue
//! hands over a [`SipMessage`] exposing just the fields the sync engine
//! needs. The builder-style `with_*` methods are how that glue (and the
//! tests) populate one.

use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// A SIP identity: username plus optional realm. A missing realm acts as a
/// wildcard when matching against targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SipIdentity {
    pub username: String,
    pub realm: Option<String>,
}

impl SipIdentity {
    pub fn new(username: impl Into<String>, realm: Option<&str>) -> Self {
        SipIdentity {
            username: username.into(),
            realm: realm.map(str::to_string),
        }
    }
}

impl fmt::Display for SipIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.realm {
            Some(realm) => write!(f, "{}@{}", self.username, realm),
            None => write!(f, "{}@*", self.username),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SipKind {
    Invite,
    Bye,
    Ok200,
    SessProg183,
    Other,
}

/// One parsed SIP message, as produced by the external parsing helper.
#[derive(Debug, Clone)]
pub struct SipMessage {
    kind: SipKind,
    call_id: Option<String>,
    cseq: Option<String>,
    to_identity: Option<SipIdentity>,
    auth_identities: Vec<SipIdentity>,
    proxy_auth_identities: Vec<SipIdentity>,
    session_id: Option<String>,
    session_version: Option<String>,
    media_ipaddr: Option<String>,
    media_port: Option<String>,
    payload: Bytes,
    timestamp: DateTime<Utc>,
}

impl SipMessage {
    fn of_kind(kind: SipKind) -> Self {
        SipMessage {
            kind,
            call_id: None,
            cseq: None,
            to_identity: None,
            auth_identities: Vec::new(),
            proxy_auth_identities: Vec::new(),
            session_id: None,
            session_version: None,
            media_ipaddr: None,
            media_port: None,
            payload: Bytes::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn invite() -> Self {
        Self::of_kind(SipKind::Invite)
    }

    pub fn bye() -> Self {
        Self::of_kind(SipKind::Bye)
    }

    pub fn ok200() -> Self {
        Self::of_kind(SipKind::Ok200)
    }

    pub fn sessprog183() -> Self {
        Self::of_kind(SipKind::SessProg183)
    }

    /// Any other request or response (ACK, OPTIONS, 1xx, ...)
    pub fn other() -> Self {
        Self::of_kind(SipKind::Other)
    }

    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = Some(call_id.into());
        self
    }

    pub fn with_cseq(mut self, cseq: impl Into<String>) -> Self {
        self.cseq = Some(cseq.into());
        self
    }

    pub fn with_to_identity(mut self, identity: SipIdentity) -> Self {
        self.to_identity = Some(identity);
        self
    }

    pub fn with_auth_identity(mut self, identity: SipIdentity) -> Self {
        self.auth_identities.push(identity);
        self
    }

    pub fn with_proxy_auth_identity(mut self, identity: SipIdentity) -> Self {
        self.proxy_auth_identities.push(identity);
        self
    }

    /// SDP origin line session id and version, as raw text
    pub fn with_sdp_session(mut self, session_id: &str, version: &str) -> Self {
        self.session_id = Some(session_id.to_string());
        self.session_version = Some(version.to_string());
        self
    }

    /// SDP media connection address and port, as raw text
    pub fn with_media(mut self, ipaddr: &str, port: &str) -> Self {
        self.media_ipaddr = Some(ipaddr.to_string());
        self.media_port = Some(port.to_string());
        self
    }

    pub fn with_payload(mut self, payload: Bytes) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn call_id(&self) -> Option<&str> {
        self.call_id.as_deref()
    }

    pub fn cseq(&self) -> Option<&str> {
        self.cseq.as_deref()
    }

    pub fn to_uri_identity(&self) -> Option<&SipIdentity> {
        self.to_identity.as_ref()
    }

    /// Digest usernames from Proxy-Authorization (`proxy = true`) or
    /// Authorization headers
    pub fn auth_identities(&self, proxy: bool) -> &[SipIdentity] {
        if proxy {
            &self.proxy_auth_identities
        } else {
            &self.auth_identities
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn session_version(&self) -> Option<&str> {
        self.session_version.as_deref()
    }

    pub fn media_ipaddr(&self) -> Option<&str> {
        self.media_ipaddr.as_deref()
    }

    pub fn media_port(&self) -> Option<&str> {
        self.media_port.as_deref()
    }

    pub fn is_invite(&self) -> bool {
        self.kind == SipKind::Invite
    }

    pub fn is_bye(&self) -> bool {
        self.kind == SipKind::Bye
    }

    pub fn is_200ok(&self) -> bool {
        self.kind == SipKind::Ok200
    }

    pub fn is_183sessprog(&self) -> bool {
        self.kind == SipKind::SessProg183
    }

    /// Raw SIP bytes, exported inside IRI records
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
