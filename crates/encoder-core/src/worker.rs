//! Encoder worker event loop
//!
//! Each worker drains jobs from every ingress lane, encodes them and pushes
//! results to the forwarder queues. Workers share lanes: a lane receiver
//! sits behind a mutex that is only ever held for non-blocking drains,
//! never across an await. A broadcast control channel signals stop; any
//! message on it halts the worker.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::etsi::EtsiEncoder;
use crate::job::{EncodedResult, EncodingJob, ForwardMessage, RecordPayload};

/// Jobs drained from one lane per pass
pub const JOB_BATCH_LIMIT: usize = 50;

/// Sleep between passes when every lane was empty; keeps the loop
/// responsive to control without spinning
pub const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Operator identifiers longer than this are truncated before encoding
pub const OPERATOR_ID_MAX: usize = 5;

/// An ingress lane receiver shared across the worker pool
pub type SharedIngress = Arc<Mutex<mpsc::Receiver<EncodingJob>>>;

/// Wrap a lane receiver for sharing across workers
pub fn shared_ingress(rx: mpsc::Receiver<EncodingJob>) -> SharedIngress {
    Arc::new(Mutex::new(rx))
}

/// Per-worker counters
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkerStats {
    pub jobs_encoded: u64,
    pub encode_errors: u64,
    /// Jobs lost because a forwarder queue went away mid-batch
    pub forward_errors: u64,
    pub drained_at_shutdown: u64,
}

pub struct EncoderWorker {
    worker_id: usize,
    ingress: Vec<SharedIngress>,
    forwarders: Vec<mpsc::Sender<ForwardMessage>>,
    control: broadcast::Receiver<()>,
    encoder: Box<dyn EtsiEncoder + Send>,
    operator_id: String,
    stats: WorkerStats,
    halted: bool,
}

impl EncoderWorker {
    pub fn new(
        worker_id: usize,
        ingress: Vec<SharedIngress>,
        forwarders: Vec<mpsc::Sender<ForwardMessage>>,
        control: broadcast::Receiver<()>,
        encoder: Box<dyn EtsiEncoder + Send>,
        operator_id: String,
    ) -> Self {
        EncoderWorker {
            worker_id,
            ingress,
            forwarders,
            control,
            encoder,
            operator_id,
            stats: WorkerStats::default(),
            halted: false,
        }
    }

    /// Run until the control channel signals stop, then drain and finish
    pub async fn run(mut self) -> WorkerStats {
        while !self.halted {
            self.poll_next_jobs().await;
        }
        self.teardown().await;
        info!(worker = self.worker_id, "halting encoder worker");
        self.stats
    }

    async fn poll_next_jobs(&mut self) {
        match self.control.try_recv() {
            Ok(()) => {
                self.halted = true;
                return;
            }
            Err(broadcast::error::TryRecvError::Empty) => {}
            // lagged or closed both mean a stop intent was broadcast
            Err(_) => {
                self.halted = true;
                return;
            }
        }

        let mut handled = 0;
        for lane in 0..self.ingress.len() {
            handled += self.process_jobs(lane).await;
        }
        if handled == 0 {
            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
        }
    }

    /// Drain up to [`JOB_BATCH_LIMIT`] jobs from one lane and dispatch them
    async fn process_jobs(&mut self, lane: usize) -> usize {
        let mut batch = Vec::new();
        {
            let mut rx = self.ingress[lane].lock();
            while batch.len() < JOB_BATCH_LIMIT {
                match rx.try_recv() {
                    Ok(job) => batch.push(job),
                    Err(_) => break,
                }
            }
        }

        let count = batch.len();
        let mut batch = batch.into_iter();
        while let Some(job) = batch.next() {
            let record_type = job.payload.record_type();
            match self.encode_job(job) {
                Ok(result) => {
                    // TODO hash across forwarders by LIID/CIN instead of
                    // always using index 0
                    if let Err(e) = self.forwarders[0].send(ForwardMessage::Record(result)).await {
                        // this job and everything left in the batch is lost
                        let lost = 1 + batch.len() as u64;
                        self.stats.forward_errors += lost;
                        warn!(
                            worker = self.worker_id,
                            lost,
                            error = %e,
                            "error while pushing encoded result to forwarder"
                        );
                        break;
                    }
                    self.stats.jobs_encoded += 1;
                }
                Err(e) => {
                    self.stats.encode_errors += 1;
                    warn!(
                        worker = self.worker_id,
                        record_type = ?record_type,
                        error = %e,
                        "encoder worker had an error when encoding record"
                    );
                }
            }
        }
        count
    }

    fn encode_job(&mut self, mut job: EncodingJob) -> Result<EncodedResult> {
        if let RecordPayload::UmtsIri { operator_id, .. } = &mut job.payload {
            if operator_id.is_none() && !self.operator_id.is_empty() {
                *operator_id = Some(truncate_operator_id(&self.operator_id));
            }
        }

        let record_type = job.payload.record_type();
        let (body, is_der) = match &job.payload {
            // Raw sync payloads pass through unencoded; the result must be
            // flagged DER for the forwarder to handle it correctly.
            RecordPayload::RawIp(contents) => (contents.clone(), true),
            _ => {
                if job.prefer_ber && self.encoder.supports_ber() {
                    (self.encoder.encode_ber(&job)?, false)
                } else {
                    (self.encoder.encode_der(&job)?, true)
                }
            }
        };

        Ok(EncodedResult {
            body,
            liid: job.liid,
            cin: job.cin,
            seq_no: job.seq_no,
            dest_id: job.dest_id,
            record_type,
            internal_id: job.internal_id,
            encoded_by: self.worker_id,
            is_der,
        })
    }

    /// Drain leftover jobs, then signal end-of-stream to every forwarder
    async fn teardown(&mut self) {
        for lane in &self.ingress {
            let mut rx = lane.lock();
            while rx.try_recv().is_ok() {
                self.stats.drained_at_shutdown += 1;
            }
        }
        if self.stats.drained_at_shutdown > 0 {
            debug!(
                worker = self.worker_id,
                drained = self.stats.drained_at_shutdown,
                "discarded queued jobs at shutdown"
            );
        }

        for fwd in &self.forwarders {
            let _ = fwd.send(ForwardMessage::EndOfStream).await;
        }
    }
}

/// Clip the operator id to at most [`OPERATOR_ID_MAX`] bytes, backing up
/// to a character boundary so a multi-byte id cannot split mid-character.
fn truncate_operator_id(raw: &str) -> String {
    let mut cut = OPERATOR_ID_MAX.min(raw.len());
    while !raw.is_char_boundary(cut) {
        cut -= 1;
    }
    raw[..cut].to_string()
}
