//! Subscriber and session records

use std::net::SocketAddr;

/// Lifecycle of one subscriber's access session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// User has been seen but no exchange has concluded
    New,
    /// Authentication/authorisation in progress
    Authing,
    /// Session is up
    Active,
    /// Terminal: the session ended or was rejected
    Over,
}

/// Access-action emitted by a state transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessAction {
    Attempt,
    Accept,
    Reject,
    Retry,
    Failed,
    InterimUpdate,
    End,
    /// Session was already underway when interception started
    AlreadyActive,
}

/// A subscriber known to one NAS.
///
/// The (NAS, username) pair is unique: a user record lives under exactly
/// one NAS.
#[derive(Debug, Clone)]
pub struct RadiusUser {
    pub username: String,
    pub nas_identifier: Option<String>,
    pub state: SessionState,
    pub framed_ip4: Option<SocketAddr>,
    pub framed_ip6: Option<SocketAddr>,
}

impl RadiusUser {
    pub fn new(username: String) -> Self {
        RadiusUser {
            username,
            nas_identifier: None,
            state: SessionState::New,
            framed_ip4: None,
            framed_ip6: None,
        }
    }
}

/// An access session exposed to the rest of the collector.
///
/// Keyed by the `"<username>-<nas-identifier>-<nas-port>"` string; the CIN
/// is a stable hash of that key.
#[derive(Debug, Clone)]
pub struct AccessSession {
    pub session_id: String,
    pub cin: u32,
    pub assigned_ip: Option<SocketAddr>,
    pub iri_seqno: u32,
}

impl AccessSession {
    pub fn new(session_id: &str) -> Self {
        AccessSession {
            session_id: session_id.to_string(),
            cin: licollect_infra_common::hash32(session_id.as_bytes()),
            assigned_ip: None,
            iri_seqno: 0,
        }
    }

    /// Next IRI sequence number for this session
    pub fn next_iri_seqno(&mut self) -> u32 {
        let seq = self.iri_seqno;
        self.iri_seqno += 1;
        seq
    }
}
