//! Collector configuration
//!
//! One flat config struct covering the thread/queue topology and the few
//! encoding knobs the workers need. Loaded from JSON; all fields have
//! defaults suitable for a single-lane test deployment.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Top-level configuration for a collector process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Number of sequence-tracker ingress lanes feeding the encoder pool
    #[serde(default = "default_seqtrackers")]
    pub seqtrackers: usize,

    /// Number of encoder worker threads
    #[serde(default = "default_encoder_workers")]
    pub encoder_workers: usize,

    /// Number of forwarder queues
    #[serde(default = "default_forwarders")]
    pub forwarders: usize,

    /// High-water mark for each forwarder queue
    #[serde(default = "default_forwarder_hwm")]
    pub forwarder_hwm: usize,

    /// Operator identifier attached to UMTS IRI records (at most 5 bytes used)
    #[serde(default)]
    pub operator_id: String,

    /// Prefer BER encoding when the encoder supports it
    #[serde(default)]
    pub prefer_ber: bool,

    /// Seconds to wait after a matched BYE before halting an RTP stream
    #[serde(default = "default_bye_timeout_secs")]
    pub bye_timeout_secs: u64,
}

fn default_seqtrackers() -> usize {
    1
}

fn default_encoder_workers() -> usize {
    2
}

fn default_forwarders() -> usize {
    1
}

fn default_forwarder_hwm() -> usize {
    1_000_000
}

fn default_bye_timeout_secs() -> u64 {
    30
}

impl Default for CollectorConfig {
    fn default() -> Self {
        CollectorConfig {
            seqtrackers: default_seqtrackers(),
            encoder_workers: default_encoder_workers(),
            forwarders: default_forwarders(),
            forwarder_hwm: default_forwarder_hwm(),
            operator_id: String::new(),
            prefer_ber: false,
            bye_timeout_secs: default_bye_timeout_secs(),
        }
    }
}

impl CollectorConfig {
    /// Load configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: CollectorConfig =
            serde_json::from_str(&raw).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate topology values that must be non-zero
    pub fn validate(&self) -> Result<()> {
        if self.seqtrackers == 0 {
            return Err(Error::Config("seqtrackers must be at least 1".into()));
        }
        if self.encoder_workers == 0 {
            return Err(Error::Config("encoder_workers must be at least 1".into()));
        }
        if self.forwarders == 0 {
            return Err(Error::Config("forwarders must be at least 1".into()));
        }
        Ok(())
    }
}
