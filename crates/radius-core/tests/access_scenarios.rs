//! End-to-end access-session scenarios driven through the engine

use bytes::{BufMut, Bytes, BytesMut};

use licollect_radius_core::{
    attr_id, AccessAction, CapturedPacket, RadiusEngine, SessionState, RADIUS_HEADER_LEN,
};

const NAS: &str = "192.0.2.100";
const SERVER: &str = "192.0.2.1";

fn payload(code: u8, identifier: u8, attrs: &[(u8, &[u8])]) -> Bytes {
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

fn from_nas(code: u8, identifier: u8, nas_port: u16, attrs: &[(u8, &[u8])]) -> CapturedPacket {
    CapturedPacket::udp(
        format!("{}:{}", NAS, nas_port).parse().unwrap(),
        format!("{}:1812", SERVER).parse().unwrap(),
        payload(code, identifier, attrs),
    )
}

fn from_server(code: u8, identifier: u8, nas_port: u16, attrs: &[(u8, &[u8])]) -> CapturedPacket {
    CapturedPacket::udp(
        format!("{}:1812", SERVER).parse().unwrap(),
        format!("{}:{}", NAS, nas_port).parse().unwrap(),
        payload(code, identifier, attrs),
    )
}

#[test]
fn happy_path_access() {
    let mut engine = RadiusEngine::new();

    let attempt = engine
        .process_packet(&from_nas(
            1,
            7,
            1024,
            &[(attr_id::USER_NAME, b"alice"), (attr_id::NAS_IDENTIFIER, b"nas-1")],
        ))
        .unwrap()
        .expect("attempt emitted");

    assert_eq!(attempt.action, AccessAction::Attempt);
    assert_eq!(attempt.old_state, SessionState::New);
    assert_eq!(attempt.new_state, SessionState::Authing);
    assert_eq!(attempt.session_id, "alice-nas-1-0");

    let accept = engine
        .process_packet(&from_server(
            2,
            7,
            1024,
            &[(attr_id::FRAMED_IP_ADDRESS, &[192, 0, 2, 5])],
        ))
        .unwrap()
        .expect("accept emitted");

    assert_eq!(accept.action, AccessAction::Accept);
    assert_eq!(accept.old_state, SessionState::Authing);
    assert_eq!(accept.new_state, SessionState::Active);
    assert_eq!(accept.session_id, "alice-nas-1-0");
    assert_eq!(accept.assigned_ip, Some("192.0.2.5:0".parse().unwrap()));

    let session = engine.session("alice-nas-1-0").unwrap();
    assert_eq!(session.assigned_ip, Some("192.0.2.5:0".parse().unwrap()));
}

#[test]
fn reject_terminates_session() {
    let mut engine = RadiusEngine::new();

    let attempt = engine
        .process_packet(&from_nas(1, 8, 2000, &[(attr_id::USER_NAME, b"bob")]))
        .unwrap()
        .expect("attempt emitted");
    assert_eq!(attempt.action, AccessAction::Attempt);

    let reject = engine
        .process_packet(&from_server(3, 8, 2000, &[]))
        .unwrap()
        .expect("reject emitted");

    assert_eq!(reject.action, AccessAction::Reject);
    assert_eq!(reject.old_state, SessionState::Authing);
    assert_eq!(reject.new_state, SessionState::Over);
    assert!(reject.assigned_ip.is_none());

    let user = engine.user(SERVER, NAS, "bob").unwrap();
    assert_eq!(user.state, SessionState::Over);
}

#[test]
fn accounting_late_join() {
    let mut engine = RadiusEngine::new();

    // Interim accounting for a session that predates the intercept: the
    // request installs the user and pending entry without any action...
    let interim_req = engine
        .process_packet(&from_nas(
            4,
            21,
            3000,
            &[
                (attr_id::USER_NAME, b"carol"),
                (attr_id::ACCT_STATUS_TYPE, &[0, 0, 0, 3]),
            ],
        ))
        .unwrap();
    assert!(interim_req.is_none());

    // ...and the matching response jumps the session straight to active.
    let event = engine
        .process_packet(&from_server(5, 21, 3000, &[]))
        .unwrap()
        .expect("already-active emitted");

    assert_eq!(event.action, AccessAction::AlreadyActive);
    assert_eq!(event.old_state, SessionState::New);
    assert_eq!(event.new_state, SessionState::Active);
}

#[test]
fn duplicate_access_request_replaces_pending_entry() {
    let mut engine = RadiusEngine::new();

    let first = engine
        .process_packet(&from_nas(1, 9, 4000, &[(attr_id::USER_NAME, b"dave")]))
        .unwrap();
    assert_eq!(first.map(|e| e.action), Some(AccessAction::Attempt));

    // retransmission with the same (identifier, port)
    let second = engine
        .process_packet(&from_nas(1, 9, 4000, &[(attr_id::USER_NAME, b"dave")]))
        .unwrap();
    assert!(second.is_none(), "only one attempt may be emitted");

    assert_eq!(engine.pending_access_requests(SERVER, NAS), 1);
    assert_eq!(engine.stats().duplicate_access_requests, 1);

    // the reply still pairs with the surviving entry
    let accept = engine
        .process_packet(&from_server(2, 9, 4000, &[]))
        .unwrap()
        .expect("accept emitted");
    assert_eq!(accept.action, AccessAction::Accept);
    assert_eq!(engine.pending_access_requests(SERVER, NAS), 0);
}

#[test]
fn full_accounting_lifecycle() {
    let mut engine = RadiusEngine::new();

    // Start request/response brings the session up
    engine
        .process_packet(&from_nas(
            4,
            30,
            5000,
            &[
                (attr_id::USER_NAME, b"erin"),
                (attr_id::ACCT_STATUS_TYPE, &[0, 0, 0, 1]),
                (attr_id::ACCT_SESSION_ID, b"sess-1"),
            ],
        ))
        .unwrap();
    let accept = engine
        .process_packet(&from_server(
            5,
            30,
            5000,
            &[(attr_id::FRAMED_IP_ADDRESS, &[198, 51, 100, 7])],
        ))
        .unwrap()
        .expect("accept emitted");
    assert_eq!(accept.action, AccessAction::Accept);
    assert_eq!(accept.assigned_ip, Some("198.51.100.7:0".parse().unwrap()));

    // Interim keeps it active
    engine
        .process_packet(&from_nas(
            4,
            31,
            5000,
            &[
                (attr_id::USER_NAME, b"erin"),
                (attr_id::ACCT_STATUS_TYPE, &[0, 0, 0, 3]),
            ],
        ))
        .unwrap();
    let interim = engine
        .process_packet(&from_server(5, 31, 5000, &[]))
        .unwrap()
        .expect("interim emitted");
    assert_eq!(interim.action, AccessAction::InterimUpdate);
    assert_eq!(interim.new_state, SessionState::Active);

    // Stop tears it down
    engine
        .process_packet(&from_nas(
            4,
            32,
            5000,
            &[
                (attr_id::USER_NAME, b"erin"),
                (attr_id::ACCT_STATUS_TYPE, &[0, 0, 0, 2]),
            ],
        ))
        .unwrap();
    let end = engine
        .process_packet(&from_server(5, 32, 5000, &[]))
        .unwrap()
        .expect("end emitted");
    assert_eq!(end.action, AccessAction::End);
    assert_eq!(end.new_state, SessionState::Over);
}
