use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use robolink_packet::{CorrelationId, OutputPacket};

use crate::error::Result;
use crate::pending::{Outgoing, PendingTable};

/// Per-connection state shared by the sending and receiving loops.
///
/// The pending table sits behind a single lock; flags are atomics so they can be read
/// without taking it. Closing the gate takes the table lock, so it cannot land between
/// the sender's gate check and its dequeue.
#[derive(Debug)]
pub struct ConnectionState {
    initialized: AtomicBool,
    sending_stopped: AtomicBool,
    running: AtomicBool,
    pending: Mutex<PendingTable>,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionState {
    /// Fresh state: not initialized, gate open, running.
    pub fn new() -> Self {
        Self {
            initialized: AtomicBool::new(false),
            sending_stopped: AtomicBool::new(false),
            running: AtomicBool::new(true),
            pending: Mutex::new(PendingTable::new()),
        }
    }

    /// Lock the pending table.
    ///
    /// A panic while holding the lock leaves the table consistent (every mutation is a
    /// single map/queue call), so poisoning is ignored.
    pub fn pending(&self) -> MutexGuard<'_, PendingTable> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn enqueue(&self, packet: OutputPacket) -> Result<CorrelationId> {
        self.pending().enqueue(packet)
    }

    pub fn dequeue_next(&self) -> Option<Outgoing> {
        self.pending().dequeue_next()
    }

    /// Dequeue the next packet unless the gate is closed.
    pub fn dequeue_if_open(&self) -> Option<Outgoing> {
        let mut pending = self.pending();
        if self.is_sending_stopped() {
            return None;
        }
        pending.dequeue_next()
    }

    pub fn acknowledge(&self, id: CorrelationId) -> bool {
        self.pending().acknowledge(id)
    }

    pub fn expire_pending(&self, ttl: Duration) -> Vec<CorrelationId> {
        self.pending().expire(ttl, Instant::now())
    }

    /// Record the handshake. Returns `true` only for the first call.
    pub fn mark_initialized(&self) -> bool {
        !self.initialized.swap(true, Ordering::SeqCst)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Close the flow-control gate.
    pub fn stop_sending(&self) {
        let _pending = self.pending();
        self.sending_stopped.store(true, Ordering::SeqCst);
    }

    /// Open the flow-control gate.
    pub fn resume_sending(&self) {
        self.sending_stopped.store(false, Ordering::SeqCst);
    }

    pub fn is_sending_stopped(&self) -> bool {
        self.sending_stopped.load(Ordering::SeqCst)
    }

    /// Ask both loops to finish their current iteration and exit.
    pub fn stop_running(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
