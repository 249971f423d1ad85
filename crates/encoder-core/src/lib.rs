//! Encoding jobs and the encoder worker pool
//!
//! Producers (the sync engines) hand per-record encoding jobs to a set of
//! ingress lanes; a pool of worker tasks drains the lanes, produces
//! ETSI-formatted byte sequences and pushes the results to forwarder
//! queues. Job payload buffers change owner at each hand-off: producer
//! until enqueued, worker until pushed, forwarder afterwards.

pub mod error;
pub mod etsi;
pub mod frame;
pub mod job;
pub mod pool;
pub mod worker;

pub use error::{EncoderError, Result};
pub use etsi::{DerEncoder, EtsiEncoder};
pub use frame::{decode_export_frame, encode_export_frame, DecodedFrame, EXPORT_MAGIC};
pub use job::{
    EncodedResult, EncodingJob, ForwardMessage, IriType, RecordPayload, RecordType,
};
pub use pool::EncoderPool;
pub use worker::{shared_ingress, EncoderWorker, SharedIngress, WorkerStats};
