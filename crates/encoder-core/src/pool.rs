//! Encoder worker pool
//!
//! Spawns K workers over a shared set of ingress lanes and forwarder
//! queues, and owns the control broadcast used to stop them.

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::etsi::EtsiEncoder;
use crate::job::ForwardMessage;
use crate::worker::{EncoderWorker, SharedIngress, WorkerStats};

pub struct EncoderPool {
    control: broadcast::Sender<()>,
    handles: Vec<JoinHandle<WorkerStats>>,
}

impl EncoderPool {
    /// Spawn `count` workers. Each worker gets its own encoder from
    /// `make_encoder` and its own subscription to the control broadcast.
    pub fn spawn<F>(
        count: usize,
        ingress: Vec<SharedIngress>,
        forwarders: Vec<mpsc::Sender<ForwardMessage>>,
        operator_id: String,
        make_encoder: F,
    ) -> Self
    where
        F: Fn() -> Box<dyn EtsiEncoder + Send>,
    {
        let (control, _) = broadcast::channel(4);

        let handles = (0..count)
            .map(|worker_id| {
                let worker = EncoderWorker::new(
                    worker_id,
                    ingress.clone(),
                    forwarders.clone(),
                    control.subscribe(),
                    make_encoder(),
                    operator_id.clone(),
                );
                tokio::spawn(worker.run())
            })
            .collect();

        debug!(workers = count, "encoder pool spawned");
        EncoderPool { control, handles }
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Broadcast the stop intent without waiting for workers to exit
    pub fn stop(&self) {
        let _ = self.control.send(());
    }

    /// Stop every worker and collect their final stats
    pub async fn shutdown(self) -> Vec<WorkerStats> {
        let _ = self.control.send(());
        let results = futures::future::join_all(self.handles).await;
        results.into_iter().filter_map(|r| r.ok()).collect()
    }
}
