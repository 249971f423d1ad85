//! Named in-process queue registry
//!
//! The collector wires its threads together through named queues, mirroring
//! the socket URIs of the export path: `openliseqpush-<i>` for encoder
//! ingress lanes, `openlirespush-<i>` for forwarder queues and
//! `openliencodercontrol` for the stop broadcast. The registry maps those
//! names onto tokio mpsc channels so that producers and consumers can be
//! wired up from different spawn sites without sharing construction order.

use dashmap::DashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::error::{Error, Result};

/// Name of the encoder ingress lane fed by sequence tracker `i`
pub fn seq_push_queue_name(i: usize) -> String {
    format!("openliseqpush-{}", i)
}

/// Name of the result queue drained by forwarder `i`
pub fn forwarder_queue_name(i: usize) -> String {
    format!("openlirespush-{}", i)
}

/// Name of the encoder control broadcast channel
pub fn encoder_control_name() -> &'static str {
    "openliencodercontrol"
}

struct QueueEntry<T> {
    tx: mpsc::Sender<T>,
    rx: Mutex<Option<mpsc::Receiver<T>>>,
}

/// Registry of named bounded queues carrying messages of type `T`.
///
/// Each name is declared once with a capacity; any number of senders can be
/// obtained afterwards, and exactly one receiver can be taken.
pub struct QueueRegistry<T> {
    queues: DashMap<String, QueueEntry<T>>,
}

impl<T> QueueRegistry<T> {
    pub fn new() -> Self {
        QueueRegistry {
            queues: DashMap::new(),
        }
    }

    /// Declare a queue under `name`, creating the channel if it does not
    /// exist yet. Returns a sender either way; a redeclaration with a
    /// different capacity keeps the original channel.
    pub fn declare(&self, name: &str, capacity: usize) -> mpsc::Sender<T> {
        let entry = self.queues.entry(name.to_string()).or_insert_with(|| {
            let (tx, rx) = mpsc::channel(capacity);
            QueueEntry {
                tx,
                rx: Mutex::new(Some(rx)),
            }
        });
        entry.tx.clone()
    }

    /// Obtain another sender for an already-declared queue
    pub fn sender(&self, name: &str) -> Result<mpsc::Sender<T>> {
        self.queues
            .get(name)
            .map(|e| e.tx.clone())
            .ok_or_else(|| Error::UnknownQueue(name.to_string()))
    }

    /// Take the single receiver end of a declared queue
    pub fn take_receiver(&self, name: &str) -> Result<mpsc::Receiver<T>> {
        let entry = self
            .queues
            .get(name)
            .ok_or_else(|| Error::UnknownQueue(name.to_string()))?;
        let mut slot = entry.rx.lock().expect("queue receiver lock poisoned");
        slot.take().ok_or_else(|| Error::ReceiverTaken(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }
}

impl<T> Default for QueueRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
