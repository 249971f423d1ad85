//! Collector pipeline wiring
//!
//! Assembles the long-lived tasks and the queues between them: the VoIP
//! sync engine feeding encoder ingress lanes through the named queue
//! registry, the encoder worker pool, and forwarder queue endpoints. The
//! RADIUS sync task is spawned separately since its events feed a
//! different record path.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use licollect_encoder_core::{
    shared_ingress, DerEncoder, EncoderPool, EncodingJob, ForwardMessage,
};
use licollect_infra_common::{
    forwarder_queue_name, seq_push_queue_name, CollectorConfig, QueueRegistry,
};
use licollect_radius_core::{AccessEvent, CapturedPacket, RadiusEngine};
use licollect_voip_sync::{CapturePush, SyncCommand, VoipSyncConfig, VoipSyncEngine};

/// Capacity of each encoder ingress lane
pub const INGRESS_LANE_CAPACITY: usize = 8192;

/// Capacity of the sync-command inbox
pub const SYNC_INBOX_CAPACITY: usize = 1024;

/// A running collector pipeline plus the endpoints the caller drives
pub struct CollectorPipeline {
    /// Command inbox of the VoIP sync task
    pub sync_tx: mpsc::Sender<SyncCommand>,
    /// One receiver per registered capture thread
    pub capture_rxs: Vec<mpsc::UnboundedReceiver<CapturePush>>,
    /// One receiver per forwarder queue
    pub forwarder_rxs: Vec<mpsc::Receiver<ForwardMessage>>,
    /// The encoder worker pool
    pub encoder_pool: EncoderPool,
    sync_task: JoinHandle<()>,
    bridge_task: JoinHandle<()>,
}

impl CollectorPipeline {
    /// Build and start the pipeline described by `config`, registering
    /// `capture_threads` capture queues on the sync engine.
    pub fn spawn(config: &CollectorConfig, capture_threads: usize) -> Self {
        // encoder ingress lanes, one per sequence tracker
        let jobs: QueueRegistry<EncodingJob> = QueueRegistry::new();
        let mut lane_txs = Vec::new();
        let mut ingress = Vec::new();
        for i in 0..config.seqtrackers {
            let name = seq_push_queue_name(i);
            lane_txs.push(jobs.declare(&name, INGRESS_LANE_CAPACITY));
            ingress.push(shared_ingress(
                jobs.take_receiver(&name).expect("lane just declared"),
            ));
        }

        // forwarder queues
        let results: QueueRegistry<ForwardMessage> = QueueRegistry::new();
        let mut forwarder_txs = Vec::new();
        let mut forwarder_rxs = Vec::new();
        for i in 0..config.forwarders {
            let name = forwarder_queue_name(i);
            forwarder_txs.push(results.declare(&name, config.forwarder_hwm));
            forwarder_rxs.push(results.take_receiver(&name).expect("queue just declared"));
        }

        let encoder_pool = EncoderPool::spawn(
            config.encoder_workers,
            ingress,
            forwarder_txs,
            config.operator_id.clone(),
            || Box::new(DerEncoder::new()),
        );

        // VoIP sync engine and its job feed into lane 0
        let (job_tx, mut job_rx) = mpsc::unbounded_channel::<EncodingJob>();
        let mut engine = VoipSyncEngine::new(VoipSyncConfig::from(config), job_tx);
        let capture_rxs = (0..capture_threads)
            .map(|_| engine.register_capture_queue())
            .collect();

        let (sync_tx, sync_rx) = mpsc::channel(SYNC_INBOX_CAPACITY);
        let sync_task = tokio::spawn(engine.run(sync_rx));

        let lane0 = lane_txs[0].clone();
        let bridge_task = tokio::spawn(async move {
            while let Some(job) = job_rx.recv().await {
                if lane0.send(job).await.is_err() {
                    break;
                }
            }
            debug!("sync-to-encoder bridge finished");
        });

        CollectorPipeline {
            sync_tx,
            capture_rxs,
            forwarder_rxs,
            encoder_pool,
            sync_task,
            bridge_task,
        }
    }

    /// Stop the sync engine and the encoder pool, in dependency order
    pub async fn shutdown(self) {
        let _ = self.sync_tx.send(SyncCommand::Shutdown).await;
        let _ = self.sync_task.await;
        let _ = self.bridge_task.await;
        self.encoder_pool.shutdown().await;
    }
}

/// Spawn a RADIUS sync task owning its engine. Packets go in; access
/// events come out.
pub fn spawn_radius_task() -> (
    mpsc::Sender<CapturedPacket>,
    mpsc::UnboundedReceiver<AccessEvent>,
    JoinHandle<()>,
) {
    let (pkt_tx, mut pkt_rx) = mpsc::channel::<CapturedPacket>(SYNC_INBOX_CAPACITY);
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let task = tokio::spawn(async move {
        let mut engine = RadiusEngine::new();
        while let Some(pkt) = pkt_rx.recv().await {
            match engine.process_packet(&pkt) {
                Ok(Some(event)) => {
                    if event_tx.send(event).is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                // parse failures are already counted by the engine
                Err(_) => {}
            }
        }
        debug!("radius sync task finished");
    });

    (pkt_tx, event_rx, task)
}
