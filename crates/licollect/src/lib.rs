//! # licollect
//!
//! Lawful interception collector core. This umbrella crate re-exports the
//! subsystem crates and provides the wiring that turns them into one
//! running pipeline:
//!
//! - [`radius`]: RADIUS access-plugin state engine
//! - [`voip`]: SIP/VoIP synchronisation engine
//! - [`encoder`]: encoding jobs and the ETSI encoder worker pool
//! - [`infra`]: logging, configuration and the named queue registry
//!
//! See [`pipeline`] for assembling the collector threads and queues.

pub use licollect_encoder_core as encoder;
pub use licollect_infra_common as infra;
pub use licollect_radius_core as radius;
pub use licollect_voip_sync as voip;

pub mod pipeline;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
