//! RTP stream lifecycle
//!
//! A stream is created as a shell when an INVITE first matches a target,
//! learns its two 5-tuple halves from SDP offers and answers, and becomes
//! active (pushed to every capture thread) once both halves are known.
//! Capture threads receive deep-copied descriptors, never references into
//! sync-thread state.

use std::net::IpAddr;

use tokio_util::time::delay_queue;

/// Which half of the 5-tuple an SDP media line describes. The initial
/// offer names the far end; the answer names the target side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSide {
    Target,
    Other,
}

/// Per-call RTP stream state, owned by its intercept's `active_cins` table
#[derive(Debug)]
pub struct RtpStream {
    /// "LIID-CIN", the handle capture threads know the stream by
    pub stream_key: String,
    pub liid: String,
    pub cin: u32,
    pub target: Option<(IpAddr, u16)>,
    pub other: Option<(IpAddr, u16)>,
    /// Whether the stream has been pushed to capture threads
    pub active: bool,
    /// CSeq of the most recent INVITE, so its answer can be paired
    pub invite_cseq: Option<String>,
    /// CSeq of the most recent BYE
    pub bye_cseq: Option<String>,
    /// Set once a 200 OK matched the BYE CSeq
    pub bye_matched: bool,
    pub(crate) timeout_key: Option<delay_queue::Key>,
}

impl RtpStream {
    pub fn new(stream_key: String, liid: &str, cin: u32) -> Self {
        RtpStream {
            stream_key,
            liid: liid.to_string(),
            cin,
            target: None,
            other: None,
            active: false,
            invite_cseq: None,
            bye_cseq: None,
            bye_matched: false,
            timeout_key: None,
        }
    }

    /// Record one side's media endpoint, replacing any previous value
    pub fn set_side(&mut self, side: StreamSide, addr: IpAddr, port: u16) {
        match side {
            StreamSide::Target => self.target = Some((addr, port)),
            StreamSide::Other => self.other = Some((addr, port)),
        }
    }

    /// Both halves of the 5-tuple are known
    pub fn is_complete(&self) -> bool {
        self.target.is_some() && self.other.is_some()
    }

    /// Deep copy for hand-off to capture threads
    pub fn descriptor(&self) -> RtpStreamDescriptor {
        RtpStreamDescriptor {
            stream_key: self.stream_key.clone(),
            liid: self.liid.clone(),
            cin: self.cin,
            target: self.target,
            other: self.other,
        }
    }
}

/// Copy of a stream's identifying state, safe to move across threads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpStreamDescriptor {
    pub stream_key: String,
    pub liid: String,
    pub cin: u32,
    pub target: Option<(IpAddr, u16)>,
    pub other: Option<(IpAddr, u16)>,
}

/// Message sent to every capture thread's inbound queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapturePush {
    /// Start intercepting this stream
    ActivateRtpStream(RtpStreamDescriptor),
    /// Stop intercepting the stream with this key
    HaltRtpStream { stream_key: String },
}
