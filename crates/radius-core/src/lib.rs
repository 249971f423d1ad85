//! RADIUS access-plugin state engine
//!
//! This crate ingests RADIUS packets observed on the wire, correlates
//! request/response pairs per NAS, identifies the subscriber each exchange
//! belongs to, and drives a per-user session state machine that emits
//! access-action events (attempt, accept, reject, interim update, end).
//!
//! The engine is single-owner state: one sync thread owns a [`RadiusEngine`]
//! and feeds it packets in capture order. Nothing here blocks or shares.

pub mod attributes;
pub mod engine;
pub mod error;
pub mod fsm;
pub mod parser;
pub mod session;

pub use attributes::{attr_id, AttributeSet, RadiusAttribute};
pub use engine::{AccessEvent, EngineStats, RadiusEngine};
pub use error::{RadiusError, Result};
pub use parser::{AcctStatusType, CapturedPacket, ParsedPacket, RadiusCode, RADIUS_HEADER_LEN};
pub use session::{AccessAction, AccessSession, RadiusUser, SessionState};
