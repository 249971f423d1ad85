//! The VoIP sync engine
//!
//! One engine instance is owned by the VoIP sync task. It holds every
//! intercept table, matches SIP messages to calls of interest, manages RTP
//! stream lifecycles (including the post-BYE timeout), handles provisioner
//! control messages and emits IPMMIRI encoding jobs.

use std::collections::{HashMap, HashSet};
use std::future::poll_fn;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::time::DelayQueue;
use tracing::{debug, info, warn};

use licollect_encoder_core::{EncodingJob, IriType, RecordPayload};
use licollect_infra_common::{hash32, CollectorConfig};

use crate::error::{Result, VoipSyncError};
use crate::intercept::{CinShared, SdpIdentifier, VoipIntercept};
use crate::provisioning::{InterceptAnnouncement, ProvisionerMessage};
use crate::rtp::{CapturePush, RtpStream, StreamSide};
use crate::sip::SipMessage;
use crate::targets::{self, target_matches};

/// Tuning for the sync engine
#[derive(Debug, Clone)]
pub struct VoipSyncConfig {
    /// Delay between a matched BYE and stream halt
    pub bye_timeout: Duration,
    /// Request BER encoding on emitted jobs
    pub prefer_ber: bool,
}

impl Default for VoipSyncConfig {
    fn default() -> Self {
        VoipSyncConfig {
            bye_timeout: Duration::from_secs(30),
            prefer_ber: false,
        }
    }
}

impl From<&CollectorConfig> for VoipSyncConfig {
    fn from(config: &CollectorConfig) -> Self {
        VoipSyncConfig {
            bye_timeout: Duration::from_secs(config.bye_timeout_secs),
            prefer_ber: config.prefer_ber,
        }
    }
}

/// Engine counters
#[derive(Debug, Default, Clone, Copy)]
pub struct VoipStats {
    pub exported_iris: u64,
    pub bad_sip_messages: u64,
    pub bye_timeouts_fired: u64,
    pub dropped_jobs: u64,
}

/// Commands accepted by the sync task
#[derive(Debug)]
pub enum SyncCommand {
    Sip(SipMessage),
    Provisioner(ProvisionerMessage),
    /// Provisioner resync started: mark everything awaiting confirmation
    BeginResync,
    /// Provisioner resync finished: sweep anything not re-asserted
    FinishResync,
    Shutdown,
}

#[derive(Debug)]
struct ByeTimeoutRef {
    liid: String,
    stream_key: String,
}

pub struct VoipSyncEngine {
    config: VoipSyncConfig,
    intercepts: HashMap<String, VoipIntercept>,
    /// Call-IDs of interest across every intercept
    known_callids: HashSet<String>,
    capture_queues: Vec<mpsc::UnboundedSender<CapturePush>>,
    job_tx: mpsc::UnboundedSender<EncodingJob>,
    bye_timers: DelayQueue<ByeTimeoutRef>,
    stats: VoipStats,
}

impl VoipSyncEngine {
    pub fn new(config: VoipSyncConfig, job_tx: mpsc::UnboundedSender<EncodingJob>) -> Self {
        VoipSyncEngine {
            config,
            intercepts: HashMap::new(),
            known_callids: HashSet::new(),
            capture_queues: Vec::new(),
            job_tx,
            bye_timers: DelayQueue::new(),
            stats: VoipStats::default(),
        }
    }

    /// Register a capture thread; returns the receiving end of its queue
    pub fn register_capture_queue(&mut self) -> mpsc::UnboundedReceiver<CapturePush> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.capture_queues.push(tx);
        rx
    }

    /// Run the sync task until shutdown, processing commands in arrival
    /// order and firing BYE timeouts as they expire.
    pub async fn run(mut self, mut inbox: mpsc::Receiver<SyncCommand>) {
        loop {
            tokio::select! {
                cmd = inbox.recv() => {
                    match cmd {
                        Some(SyncCommand::Sip(msg)) => {
                            if let Err(e) = self.handle_sip_message(&msg) {
                                debug!(error = %e, "discarding SIP message");
                            }
                        }
                        Some(SyncCommand::Provisioner(pm)) => {
                            self.handle_provisioner_message(pm);
                        }
                        Some(SyncCommand::BeginResync) => self.begin_resync(),
                        Some(SyncCommand::FinishResync) => self.finish_resync(),
                        Some(SyncCommand::Shutdown) | None => break,
                    }
                }
                expired = poll_fn(|cx| self.bye_timers.poll_expired(cx)),
                        if !self.bye_timers.is_empty() => {
                    if let Some(expired) = expired {
                        let timeout = expired.into_inner();
                        self.handle_bye_timeout(&timeout.liid, &timeout.stream_key);
                    }
                }
            }
        }
        info!("voip sync engine stopped");
    }

    /// Process one parsed SIP message. Returns how many IRI records were
    /// emitted for it.
    pub fn handle_sip_message(&mut self, msg: &SipMessage) -> Result<usize> {
        let call_id = match msg.call_id() {
            Some(c) => c.to_string(),
            None => {
                self.stats.bad_sip_messages += 1;
                return Err(VoipSyncError::MissingCallId);
            }
        };
        let sdp = SdpIdentifier::from_message(msg);

        if msg.is_invite() {
            self.process_invite(msg, &call_id, &sdp)
        } else if self.known_callids.contains(&call_id) {
            self.process_in_dialog(msg, &call_id)
        } else {
            Ok(0)
        }
    }

    /// INVITE handling: resolve the call against each intercept's Call-ID
    /// and SDP maps, falling back to identity matching, then learn the SDP
    /// offer's media endpoint.
    fn process_invite(
        &mut self,
        msg: &SipMessage,
        call_id: &str,
        sdp: &SdpIdentifier,
    ) -> Result<usize> {
        let to_identity = match msg.to_uri_identity() {
            Some(id) => id.clone(),
            None => {
                self.stats.bad_sip_messages += 1;
                return Err(VoipSyncError::MissingToIdentity);
            }
        };

        let VoipSyncEngine {
            config,
            intercepts,
            known_callids,
            capture_queues,
            job_tx,
            stats,
            ..
        } = self;

        let mut exported = 0;
        for vint in intercepts.values_mut() {
            if !vint.active {
                continue;
            }

            let by_callid = vint.cin_callid_map.get(call_id).cloned();
            let by_sdp = if sdp.is_set() {
                vint.cin_sdp_map.get(sdp).cloned()
            } else {
                None
            };

            let (shared, iri_type) = match (by_callid, by_sdp) {
                (Some(by_callid), Some(by_sdp)) => {
                    if by_callid.cin != by_sdp.cin {
                        debug_assert_eq!(
                            by_callid.cin, by_sdp.cin,
                            "call-id and SDP maps disagree on CIN"
                        );
                        warn!(
                            liid = %vint.liid,
                            callid_cin = by_callid.cin,
                            sdp_cin = by_sdp.cin,
                            "call-id and SDP session point at different CINs, keeping the call-id mapping"
                        );
                        vint.cin_sdp_map.insert(sdp.clone(), Arc::clone(&by_callid));
                    }
                    (by_callid, IriType::Continue)
                }
                (Some(by_callid), None) => {
                    // new SDP session under a known call
                    if sdp.is_set() {
                        vint.cin_sdp_map.insert(sdp.clone(), Arc::clone(&by_callid));
                    }
                    (by_callid, IriType::Continue)
                }
                (None, Some(by_sdp)) => {
                    // new call-id for a session we already track
                    vint.cin_callid_map
                        .insert(call_id.to_string(), Arc::clone(&by_sdp));
                    known_callids.insert(call_id.to_string());
                    (by_sdp, IriType::Continue)
                }
                (None, None) => {
                    // try the To: URI first, then the auth usernames
                    let hit = target_matches(&vint.targets, &to_identity)
                        || msg
                            .auth_identities(true)
                            .iter()
                            .any(|id| target_matches(&vint.targets, id))
                        || msg
                            .auth_identities(false)
                            .iter()
                            .any(|id| target_matches(&vint.targets, id));
                    if !hit {
                        continue;
                    }
                    let shared = create_session(vint, known_callids, call_id, sdp);
                    (shared, IriType::Begin)
                }
            };

            let stream_key = vint.stream_key(shared.cin);
            let Some(stream) = vint.active_cins.get_mut(&stream_key) else {
                warn!(
                    cin = shared.cin,
                    liid = %vint.liid,
                    "unable to find CIN in the active call list"
                );
                continue;
            };

            // the offer describes the far end of the stream
            if let (Some(ip), Some(port)) = (msg.media_ipaddr(), msg.media_port()) {
                match parse_media_endpoint(ip, port) {
                    Ok((addr, port)) => {
                        stream.set_side(StreamSide::Other, addr, port);
                        activate_if_ready(stream, capture_queues);
                    }
                    Err(e) => {
                        warn!(liid = %vint.liid, error = %e, "ignoring SDP media description");
                    }
                }
            }

            stream.invite_cseq = msg.cseq().map(str::to_string);

            if push_iri_job(job_tx, config, vint, &shared, iri_type, msg, stats) {
                exported += 1;
            }
        }

        Ok(exported)
    }

    /// Non-INVITE message for a call we already track
    fn process_in_dialog(&mut self, msg: &SipMessage, call_id: &str) -> Result<usize> {
        let VoipSyncEngine {
            config,
            intercepts,
            capture_queues,
            bye_timers,
            job_tx,
            stats,
            ..
        } = self;

        let mut exported = 0;
        for vint in intercepts.values_mut() {
            let Some(shared) = vint.cin_callid_map.get(call_id).cloned() else {
                continue;
            };

            let liid = vint.liid.clone();
            let stream_key = vint.stream_key(shared.cin);
            let Some(stream) = vint.active_cins.get_mut(&stream_key) else {
                warn!(
                    cin = shared.cin,
                    liid = %liid,
                    "unable to find CIN in the active call list"
                );
                continue;
            };

            let mut iri_type = IriType::Report;

            if msg.is_200ok() {
                process_200ok(
                    stream,
                    msg,
                    capture_queues,
                    bye_timers,
                    config.bye_timeout,
                    &liid,
                    &mut iri_type,
                );
            }

            if msg.is_183sessprog() {
                process_sdp_answer(stream, msg, capture_queues);
            }

            if msg.is_bye() && !stream.bye_matched {
                stream.bye_cseq = msg.cseq().map(str::to_string);
            }

            if stream.bye_matched && iri_type != IriType::End {
                // everything after END is a report
                iri_type = IriType::Report;
            }

            if push_iri_job(job_tx, config, vint, &shared, iri_type, msg, stats) {
                exported += 1;
            }
        }

        Ok(exported)
    }

    /// Apply a provisioner control message
    pub fn handle_provisioner_message(&mut self, msg: ProvisionerMessage) {
        match msg {
            ProvisionerMessage::InterceptStart(ann) => self.start_intercept(ann),
            ProvisionerMessage::InterceptHalt { liid } => self.halt_intercept(&liid),
            ProvisionerMessage::TargetAdd { liid, identity } => {
                match self.intercepts.get_mut(&liid) {
                    Some(vint) => targets::add_target(vint, identity),
                    None => warn!(liid = %liid, "received SIP target for unknown VOIP LIID"),
                }
            }
            ProvisionerMessage::TargetWithdraw { liid, identity } => {
                match self.intercepts.get_mut(&liid) {
                    Some(vint) => targets::withdraw_target(vint, &identity),
                    None => {
                        warn!(liid = %liid, "received SIP target withdrawal for unknown VOIP LIID")
                    }
                }
            }
        }
    }

    fn start_intercept(&mut self, ann: InterceptAnnouncement) {
        if let Some(vint) = self.intercepts.get_mut(&ann.liid) {
            vint.internal_id = ann.internal_id;
            vint.destination_id = ann.destination_id;
            vint.awaiting_confirm = false;
            vint.active = true;
            return;
        }

        info!(liid = %ann.liid, "received VOIP intercept from provisioner");
        let vint = VoipIntercept::new(ann.liid.clone(), ann.internal_id, ann.destination_id);

        // forward any already-active streams to the capture threads
        for stream in vint.active_cins.values().filter(|s| s.active) {
            let desc = stream.descriptor();
            for q in &self.capture_queues {
                let _ = q.send(CapturePush::ActivateRtpStream(desc.clone()));
            }
        }

        self.intercepts.insert(ann.liid, vint);
    }

    /// Withdraw an intercept entirely, halting all of its streams
    fn halt_intercept(&mut self, liid: &str) {
        let Some(mut vint) = self.intercepts.remove(liid) else {
            warn!(
                liid = %liid,
                "received withdrawal for VOIP intercept that is not in the sync intercept list"
            );
            return;
        };

        info!(liid = %liid, "sync thread withdrawing VOIP intercept");

        let keys: Vec<String> = vint.active_cins.keys().cloned().collect();
        let mut removed_callids = Vec::new();
        for key in keys {
            removed_callids.extend(halt_stream(
                &mut vint,
                &self.capture_queues,
                &mut self.bye_timers,
                &key,
            ));
        }
        self.prune_known_callids(removed_callids);
    }

    /// Mark every intercept and active target as awaiting confirmation
    pub fn begin_resync(&mut self) {
        for vint in self.intercepts.values_mut() {
            vint.awaiting_confirm = true;
            for target in &mut vint.targets {
                if target.active {
                    target.awaiting_confirm = true;
                }
            }
        }
    }

    /// Sweep everything the provisioner did not re-assert during resync
    pub fn finish_resync(&mut self) {
        for vint in self.intercepts.values_mut() {
            vint.targets.retain(|t| !t.awaiting_confirm);
        }

        let stale: Vec<String> = self
            .intercepts
            .iter()
            .filter(|(_, v)| v.awaiting_confirm)
            .map(|(liid, _)| liid.clone())
            .collect();
        for liid in stale {
            self.halt_intercept(&liid);
        }
    }

    fn handle_bye_timeout(&mut self, liid: &str, stream_key: &str) {
        self.stats.bye_timeouts_fired += 1;
        debug!(liid = %liid, stream_key = %stream_key, "BYE timeout fired");

        let Some(vint) = self.intercepts.get_mut(liid) else {
            return;
        };
        // the timer already fired; forget its key so halt does not try to
        // cancel it
        if let Some(stream) = vint.active_cins.get_mut(stream_key) {
            stream.timeout_key = None;
        }
        let removed =
            halt_stream(vint, &self.capture_queues, &mut self.bye_timers, stream_key);
        self.prune_known_callids(removed);
    }

    /// Drop call-ids from the global set once no intercept maps them
    fn prune_known_callids(&mut self, callids: Vec<String>) {
        for call_id in callids {
            let still_mapped = self
                .intercepts
                .values()
                .any(|v| v.cin_callid_map.contains_key(&call_id));
            if !still_mapped {
                self.known_callids.remove(&call_id);
            }
        }
    }

    pub fn stats(&self) -> &VoipStats {
        &self.stats
    }

    pub fn intercept(&self, liid: &str) -> Option<&VoipIntercept> {
        self.intercepts.get(liid)
    }

    pub fn is_known_callid(&self, call_id: &str) -> bool {
        self.known_callids.contains(call_id)
    }

    pub fn pending_bye_timeouts(&self) -> usize {
        self.bye_timers.len()
    }
}

/// Install a fresh call under an intercept: new CIN hashed from the
/// Call-ID, stream shell, and both index mappings.
fn create_session(
    vint: &mut VoipIntercept,
    known_callids: &mut HashSet<String>,
    call_id: &str,
    sdp: &SdpIdentifier,
) -> Arc<CinShared> {
    let cin = hash32(call_id.as_bytes());
    let shared = Arc::new(CinShared::new(cin));

    let stream_key = vint.stream_key(cin);
    vint.active_cins
        .insert(stream_key.clone(), RtpStream::new(stream_key, &vint.liid, cin));

    vint.cin_callid_map
        .insert(call_id.to_string(), Arc::clone(&shared));
    known_callids.insert(call_id.to_string());

    if sdp.is_set() {
        vint.cin_sdp_map.insert(sdp.clone(), Arc::clone(&shared));
    }

    info!(liid = %vint.liid, cin, "new voip session for intercept");
    shared
}

/// 200 OK: either the answer to our INVITE (media learning) or the answer
/// to our BYE (session over, start the halt timer).
fn process_200ok(
    stream: &mut RtpStream,
    msg: &SipMessage,
    capture_queues: &[mpsc::UnboundedSender<CapturePush>],
    bye_timers: &mut DelayQueue<ByeTimeoutRef>,
    bye_timeout: Duration,
    liid: &str,
    iri_type: &mut IriType,
) {
    let cseq = msg.cseq();

    if stream.invite_cseq.is_some() && stream.invite_cseq.as_deref() == cseq {
        process_sdp_answer(stream, msg, capture_queues);
    } else if stream.bye_cseq.is_some() && stream.bye_cseq.as_deref() == cseq && !stream.bye_matched
    {
        let key = bye_timers.insert(
            ByeTimeoutRef {
                liid: liid.to_string(),
                stream_key: stream.stream_key.clone(),
            },
            bye_timeout,
        );
        stream.timeout_key = Some(key);
        stream.bye_matched = true;
        *iri_type = IriType::End;
    }
}

/// Media learning from a 183/200 answering our INVITE: the answer names
/// the target side of the stream.
fn process_sdp_answer(
    stream: &mut RtpStream,
    msg: &SipMessage,
    capture_queues: &[mpsc::UnboundedSender<CapturePush>],
) {
    if stream.invite_cseq.is_none() || stream.invite_cseq.as_deref() != msg.cseq() {
        return;
    }

    if let (Some(ip), Some(port)) = (msg.media_ipaddr(), msg.media_port()) {
        match parse_media_endpoint(ip, port) {
            Ok((addr, port)) => {
                stream.set_side(StreamSide::Target, addr, port);
                stream.invite_cseq = None;
                activate_if_ready(stream, capture_queues);
            }
            Err(e) => {
                warn!(stream_key = %stream.stream_key, error = %e, "ignoring SDP media description");
            }
        }
    }
}

/// Push the stream to every capture thread once both halves are known
fn activate_if_ready(stream: &mut RtpStream, capture_queues: &[mpsc::UnboundedSender<CapturePush>]) {
    if stream.active || !stream.is_complete() {
        return;
    }

    let desc = stream.descriptor();
    for q in capture_queues {
        let _ = q.send(CapturePush::ActivateRtpStream(desc.clone()));
    }
    stream.active = true;
    info!(stream_key = %stream.stream_key, "RTP stream pushed to capture threads");
}

fn parse_media_endpoint(ip: &str, port: &str) -> Result<(IpAddr, u16)> {
    let port: u32 = port
        .parse()
        .map_err(|_| VoipSyncError::InvalidMediaEndpoint(format!("port {:?}", port)))?;
    if port > 65535 {
        return Err(VoipSyncError::InvalidMediaEndpoint(format!(
            "port {} out of range",
            port
        )));
    }
    let addr: IpAddr = ip
        .parse()
        .map_err(|_| VoipSyncError::InvalidMediaEndpoint(format!("address {:?}", ip)))?;
    Ok((addr, port as u16))
}

/// Emit one IPMMIRI job carrying the SIP payload. Returns false when the
/// encoder side is gone.
fn push_iri_job(
    job_tx: &mpsc::UnboundedSender<EncodingJob>,
    config: &VoipSyncConfig,
    vint: &VoipIntercept,
    shared: &CinShared,
    iri_type: IriType,
    msg: &SipMessage,
    stats: &mut VoipStats,
) -> bool {
    let job = EncodingJob {
        payload: RecordPayload::IpMmIri {
            iri_type,
            contents: msg.payload().clone(),
        },
        liid: vint.liid.clone(),
        cin: shared.cin.to_string(),
        seq_no: shared.next_iri_seq(),
        dest_id: vint.destination_id,
        internal_id: vint.internal_id,
        timestamp: msg.timestamp(),
        prefer_ber: config.prefer_ber,
        preencoded: None,
    };

    if job_tx.send(job).is_err() {
        warn!("error while trying to export IRI containing SIP message");
        stats.dropped_jobs += 1;
        false
    } else {
        stats.exported_iris += 1;
        true
    }
}

/// Halt one stream: cancel its timer, tell capture threads, unlink it and
/// release its index mappings. Returns the call-ids whose mappings went
/// away so the caller can prune the global set.
fn halt_stream(
    vint: &mut VoipIntercept,
    capture_queues: &[mpsc::UnboundedSender<CapturePush>],
    bye_timers: &mut DelayQueue<ByeTimeoutRef>,
    stream_key: &str,
) -> Vec<String> {
    let Some(mut stream) = vint.active_cins.remove(stream_key) else {
        return Vec::new();
    };

    if let Some(key) = stream.timeout_key.take() {
        bye_timers.try_remove(&key);
    }

    if stream.active {
        for q in capture_queues {
            let _ = q.send(CapturePush::HaltRtpStream {
                stream_key: stream_key.to_string(),
            });
        }
    }

    let cin = stream.cin;
    let removed: Vec<String> = vint
        .cin_callid_map
        .iter()
        .filter(|(_, shared)| shared.cin == cin)
        .map(|(call_id, _)| call_id.clone())
        .collect();
    for call_id in &removed {
        vint.cin_callid_map.remove(call_id);
    }
    vint.cin_sdp_map.retain(|_, shared| shared.cin != cin);

    debug!(stream_key = %stream_key, cin, "halted RTP stream");
    removed
}
