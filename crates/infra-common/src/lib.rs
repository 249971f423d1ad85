/*!
# licollect-infra-common

A common infrastructure layer for the licollect collector that provides:

- Logging setup shared by every collector thread
- Collector configuration loading
- The named in-process queue registry used to wire sync threads,
  encoder workers and forwarders together
- Small shared utilities (stable 32-bit hashing for CIN derivation)
*/

pub mod config;
pub mod error;
pub mod logging;
pub mod queues;
pub mod util;

pub use config::CollectorConfig;
pub use error::{Error, Result};
pub use logging::{setup_logging, LoggingConfig};
pub use queues::{encoder_control_name, forwarder_queue_name, seq_push_queue_name, QueueRegistry};
pub use util::hash32;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
