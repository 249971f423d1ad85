//! RADIUS correlation engine
//!
//! Owns the server → NAS → user tables and the per-NAS maps of outstanding
//! requests, pairs responses with the request they answer, and drives the
//! session state machine. One engine instance belongs to one sync thread;
//! packets must be fed in capture order.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use tracing::{debug, info, warn};

use crate::attributes::{attr_id, AttributeSet};
use crate::error::Result;
use crate::fsm;
use crate::parser::{self, CapturedPacket, ParsedPacket, RadiusCode};
use crate::parser::AcctStatusType;
use crate::session::{AccessAction, AccessSession, RadiusUser, SessionState};

/// Counters for per-packet conditions that are logged and skipped rather
/// than treated as fatal.
#[derive(Debug, Default, Clone, Copy)]
pub struct EngineStats {
    /// Packets that could not be parsed or attributed to a user
    pub dropped_packets: u64,
    /// Responses with no outstanding request under their NAS
    pub orphan_responses: u64,
    /// Access requests that replaced a still-pending one with the same key
    pub duplicate_access_requests: u64,
    /// Accounting requests that replaced a still-pending one (frequent in
    /// practice, counted but not logged)
    pub duplicate_accounting_requests: u64,
}

#[derive(Debug)]
struct AccessRequestEntry {
    username: String,
}

#[derive(Debug)]
struct AccountingRequestEntry {
    username: String,
    status_type: Option<AcctStatusType>,
    input_octets: u64,
    output_octets: u64,
    acct_session_id: Option<String>,
}

/// Per-NAS state: subscribers plus the two outstanding-request maps, keyed
/// by `(identifier << 16) | source_port` of the original request.
#[derive(Debug)]
pub struct RadiusNas {
    nas_ip: String,
    users: HashMap<String, RadiusUser>,
    access_requests: HashMap<u32, AccessRequestEntry>,
    accounting_requests: HashMap<u32, AccountingRequestEntry>,
}

impl RadiusNas {
    fn new(nas_ip: String) -> Self {
        RadiusNas {
            nas_ip,
            users: HashMap::new(),
            access_requests: HashMap::new(),
            accounting_requests: HashMap::new(),
        }
    }
}

#[derive(Debug, Default)]
struct RadiusServer {
    nas_map: HashMap<String, RadiusNas>,
}

/// Outcome of one completed state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessEvent {
    pub action: AccessAction,
    pub old_state: SessionState,
    pub new_state: SessionState,
    pub username: String,
    pub session_id: String,
    pub cin: u32,
    pub assigned_ip: Option<SocketAddr>,
}

/// The access-plugin state engine. Single owner, no interior locking.
pub struct RadiusEngine {
    servers: HashMap<String, RadiusServer>,
    sessions: HashMap<String, AccessSession>,
    scratch: ParsedPacket,
    stats: EngineStats,
}

impl RadiusEngine {
    pub fn new() -> Self {
        RadiusEngine {
            servers: HashMap::new(),
            sessions: HashMap::new(),
            scratch: ParsedPacket::new(),
            stats: EngineStats::default(),
        }
    }

    /// Process one captured packet.
    ///
    /// Returns `Ok(Some(event))` when the packet completed a state
    /// transition for its subscriber, `Ok(None)` when the packet updated
    /// tables without emitting an action, and `Err` when the packet was
    /// unusable (already counted as dropped).
    pub fn process_packet(&mut self, pkt: &CapturedPacket) -> Result<Option<AccessEvent>> {
        if let Err(e) = parser::parse_packet(&mut self.scratch, pkt) {
            self.stats.dropped_packets += 1;
            debug!(error = %e, "dropping unusable RADIUS packet");
            return Err(e);
        }

        let code = match self.scratch.code {
            Some(c) => c,
            None => return Ok(None),
        };

        if let Some(port) = self
            .scratch
            .attributes
            .get(attr_id::NAS_PORT)
            .and_then(|a| a.as_u32())
        {
            self.scratch.nas_port = port;
        }

        let server_ip = match self.scratch.server_addr {
            Some(a) => a.ip().to_string(),
            None => return Ok(None),
        };
        let nas_ip = match self.scratch.nas_addr {
            Some(a) => a.ip().to_string(),
            None => return Ok(None),
        };

        let nas = self
            .servers
            .entry(server_ip)
            .or_default()
            .nas_map
            .entry(nas_ip.clone())
            .or_insert_with(|| RadiusNas::new(nas_ip));

        let username = match identify_user(nas, &mut self.scratch, &mut self.stats) {
            Some(u) => u,
            None => return Ok(None),
        };

        let scratch = &self.scratch;
        let Some(user) = nas.users.get_mut(&username) else {
            return Ok(None);
        };

        update_nas_identifier(user, scratch);

        let nas_identifier = user
            .nas_identifier
            .clone()
            .unwrap_or_else(|| nas.nas_ip.clone());
        let session_id = format!("{}-{}-{}", username, nas_identifier, scratch.nas_port);

        let old_state = user.state;
        let (new_state, action) = fsm::apply_fsm(old_state, code, scratch.acct_status);
        user.state = new_state;

        let mut assigned_ip = None;
        if matches!(
            action,
            Some(AccessAction::Accept) | Some(AccessAction::AlreadyActive)
        ) {
            assigned_ip = extract_assigned_ip(&scratch.attributes);
            match assigned_ip {
                Some(sa) if sa.is_ipv4() => user.framed_ip4 = Some(sa),
                Some(sa) => user.framed_ip6 = Some(sa),
                None => {}
            }
        }

        store_pending_request(nas, scratch, &username, &mut self.stats);

        let session = self
            .sessions
            .entry(session_id.clone())
            .or_insert_with(|| AccessSession::new(&session_id));
        if let Some(ip) = assigned_ip {
            session.assigned_ip = Some(ip);
        }

        Ok(action.map(|action| AccessEvent {
            action,
            old_state,
            new_state,
            username,
            session_id: session.session_id.clone(),
            cin: session.cin,
            assigned_ip,
        }))
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Look up a session by its exposed identifier
    pub fn session(&self, session_id: &str) -> Option<&AccessSession> {
        self.sessions.get(session_id)
    }

    /// Look up a subscriber under a specific server and NAS
    pub fn user(&self, server_ip: &str, nas_ip: &str, username: &str) -> Option<&RadiusUser> {
        self.servers
            .get(server_ip)?
            .nas_map
            .get(nas_ip)?
            .users
            .get(username)
    }

    /// Number of access requests still awaiting a response under a NAS
    pub fn pending_access_requests(&self, server_ip: &str, nas_ip: &str) -> usize {
        self.servers
            .get(server_ip)
            .and_then(|s| s.nas_map.get(nas_ip))
            .map(|n| n.access_requests.len())
            .unwrap_or(0)
    }

    /// Number of accounting requests still awaiting a response under a NAS
    pub fn pending_accounting_requests(&self, server_ip: &str, nas_ip: &str) -> usize {
        self.servers
            .get(server_ip)
            .and_then(|s| s.nas_map.get(nas_ip))
            .map(|n| n.accounting_requests.len())
            .unwrap_or(0)
    }
}

impl Default for RadiusEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve the subscriber a packet belongs to.
///
/// Requests carry a User-Name attribute and look up or create the user
/// record; responses are paired with the outstanding request under the same
/// key, consuming it. Responses that match nothing are counted and ignored.
fn identify_user(
    nas: &mut RadiusNas,
    scratch: &mut ParsedPacket,
    stats: &mut EngineStats,
) -> Option<String> {
    let code = scratch.code?;

    if code.is_request() {
        let attr = match scratch.attributes.get(attr_id::USER_NAME) {
            Some(a) => a,
            None => {
                debug!(nas = %nas.nas_ip, "request carried no User-Name attribute");
                stats.dropped_packets += 1;
                return None;
            }
        };
        let (username, truncated) = attr.as_text(255);
        if truncated {
            warn!(username = %username, "User-Name too long, truncated");
        }
        nas.users
            .entry(username.clone())
            .or_insert_with(|| RadiusUser::new(username.clone()));
        return Some(username);
    }

    let key = scratch.request_key();
    match code {
        RadiusCode::AccessAccept | RadiusCode::AccessReject | RadiusCode::AccessChallenge => {
            match nas.access_requests.remove(&key) {
                Some(req) => Some(req.username),
                None => {
                    stats.orphan_responses += 1;
                    debug!(key, nas = %nas.nas_ip, "access response with no matching request");
                    None
                }
            }
        }
        RadiusCode::AccountingResponse => match nas.accounting_requests.remove(&key) {
            Some(req) => {
                // the response inherits the request's status type
                scratch.acct_status = req.status_type;
                debug!(
                    in_octets = req.input_octets,
                    out_octets = req.output_octets,
                    session = req.acct_session_id.as_deref().unwrap_or("no session ID present"),
                    "matched accounting exchange"
                );
                Some(req.username)
            }
            None => {
                stats.orphan_responses += 1;
                debug!(key, nas = %nas.nas_ip, "accounting response with no matching request");
                None
            }
        },
        _ => None,
    }
}

fn update_nas_identifier(user: &mut RadiusUser, scratch: &ParsedPacket) {
    let attr = match scratch.attributes.get(attr_id::NAS_IDENTIFIER) {
        Some(a) => a,
        None => return,
    };
    let (nasid, truncated) = attr.as_text(255);
    if truncated {
        warn!(nas_identifier = %nasid, "NAS-Identifier too long, truncated");
    }

    if let Some(existing) = user.nas_identifier.as_deref() {
        if existing == nasid {
            return;
        }
        info!(
            username = %user.username,
            old = %existing,
            new = %nasid,
            "NAS-Identifier changed for user"
        );
    }
    user.nas_identifier = Some(nasid);
}

/// Extract the assigned address from Framed-IP-Address, falling back to
/// Framed-IPv6-Address. Port is always zero.
fn extract_assigned_ip(attrs: &AttributeSet) -> Option<SocketAddr> {
    if let Some(attr) = attrs.get(attr_id::FRAMED_IP_ADDRESS) {
        if attr.value.len() == 4 {
            let ip = Ipv4Addr::new(attr.value[0], attr.value[1], attr.value[2], attr.value[3]);
            return Some(SocketAddr::new(IpAddr::V4(ip), 0));
        }
    }

    if let Some(attr) = attrs.get(attr_id::FRAMED_IPV6_ADDRESS) {
        if attr.value.len() == 16 {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&attr.value[..16]);
            return Some(SocketAddr::new(IpAddr::V6(Ipv6Addr::from(octets)), 0));
        }
    }

    None
}

/// Record a request so the matching response can be paired later. A second
/// request under the same key replaces the first: logged for access
/// requests, silent for accounting requests.
fn store_pending_request(
    nas: &mut RadiusNas,
    scratch: &ParsedPacket,
    username: &str,
    stats: &mut EngineStats,
) {
    let key = scratch.request_key();

    match scratch.code {
        Some(RadiusCode::AccessRequest) => {
            let entry = AccessRequestEntry {
                username: username.to_string(),
            };
            if nas.access_requests.insert(key, entry).is_some() {
                stats.duplicate_access_requests += 1;
                warn!(
                    identifier = scratch.identifier,
                    port = scratch.source_port,
                    nas = %nas.nas_ip,
                    "received duplicate access request"
                );
            }
        }
        Some(RadiusCode::AccountingRequest) => {
            let mut entry = AccountingRequestEntry {
                username: username.to_string(),
                status_type: scratch.acct_status,
                input_octets: 0,
                output_octets: 0,
                acct_session_id: None,
            };
            if let Some(v) = scratch
                .attributes
                .get(attr_id::ACCT_INPUT_OCTETS)
                .and_then(|a| a.as_u32())
            {
                entry.input_octets = u64::from(v);
            }
            if let Some(v) = scratch
                .attributes
                .get(attr_id::ACCT_OUTPUT_OCTETS)
                .and_then(|a| a.as_u32())
            {
                entry.output_octets = u64::from(v);
            }
            if let Some(a) = scratch.attributes.get(attr_id::ACCT_SESSION_ID) {
                entry.acct_session_id = Some(a.as_text(255).0);
            }

            if nas.accounting_requests.insert(key, entry).is_some() {
                stats.duplicate_accounting_requests += 1;
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{BufMut, Bytes, BytesMut};

    const NAS: &str = "10.0.0.2";
    const SERVER: &str = "10.0.0.1";

    fn payload(code: u8, identifier: u8, attrs: &[(u8, &[u8])]) -> Bytes {
        let attr_len: usize = attrs.iter().map(|(_, v)| v.len() + 2).sum();
        let total = parser::RADIUS_HEADER_LEN + attr_len;

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

    fn request(code: u8, identifier: u8, nas_port: u16, attrs: &[(u8, &[u8])]) -> CapturedPacket {
        CapturedPacket::udp(
            format!("{}:{}", NAS, nas_port).parse().unwrap(),
            format!("{}:1812", SERVER).parse().unwrap(),
            payload(code, identifier, attrs),
        )
    }

    fn response(code: u8, identifier: u8, nas_port: u16, attrs: &[(u8, &[u8])]) -> CapturedPacket {
        CapturedPacket::udp(
            format!("{}:1812", SERVER).parse().unwrap(),
            format!("{}:{}", NAS, nas_port).parse().unwrap(),
            payload(code, identifier, attrs),
        )
    }

    #[test]
    fn orphan_response_is_counted_and_ignored() {
        let mut engine = RadiusEngine::new();
        let event = engine.process_packet(&response(2, 9, 4000, &[])).unwrap();
        assert!(event.is_none());
        assert_eq!(engine.stats().orphan_responses, 1);
    }

    #[test]
    fn request_without_username_is_dropped() {
        let mut engine = RadiusEngine::new();
        let event = engine.process_packet(&request(1, 1, 1024, &[])).unwrap();
        assert!(event.is_none());
        assert_eq!(engine.stats().dropped_packets, 1);
    }

    #[test]
    fn pending_request_is_consumed_exactly_once() {
        let mut engine = RadiusEngine::new();
        engine
            .process_packet(&request(1, 7, 1024, &[(attr_id::USER_NAME, b"alice")]))
            .unwrap();
        assert_eq!(engine.pending_access_requests(SERVER, NAS), 1);

        let event = engine.process_packet(&response(2, 7, 1024, &[])).unwrap();
        assert!(event.is_some());
        assert_eq!(engine.pending_access_requests(SERVER, NAS), 0);

        // the same response again finds nothing
        let event = engine.process_packet(&response(2, 7, 1024, &[])).unwrap();
        assert!(event.is_none());
        assert_eq!(engine.stats().orphan_responses, 1);
    }

    #[test]
    fn nas_identifier_change_is_applied() {
        let mut engine = RadiusEngine::new();
        engine
            .process_packet(&request(
                1,
                1,
                1024,
                &[(attr_id::USER_NAME, b"alice"), (attr_id::NAS_IDENTIFIER, b"nas-1")],
            ))
            .unwrap();
        engine
            .process_packet(&request(
                1,
                2,
                1024,
                &[(attr_id::USER_NAME, b"alice"), (attr_id::NAS_IDENTIFIER, b"nas-2")],
            ))
            .unwrap();

        let user = engine.user(SERVER, NAS, "alice").unwrap();
        assert_eq!(user.nas_identifier.as_deref(), Some("nas-2"));
    }

    #[test]
    fn session_id_falls_back_to_nas_ip() {
        let mut engine = RadiusEngine::new();
        let event = engine
            .process_packet(&request(1, 1, 1024, &[(attr_id::USER_NAME, b"bob")]))
            .unwrap()
            .unwrap();
        assert_eq!(event.session_id, format!("bob-{}-0", NAS));
    }
}
