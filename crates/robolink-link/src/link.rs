use std::sync::Arc;
use std::thread::{self, JoinHandle};

use robolink_packet::{Command, CorrelationId, EventPacket, OutputPacket};
use robolink_transport::Transport;
use tracing::{debug, info, warn};

use crate::config::LinkConfig;
use crate::dispatch::EventDispatcher;
use crate::error::{LinkError, Result};
use crate::pending::PendingTable;
use crate::state::ConnectionState;
use crate::{receiver, sender};

const RECEIVER_THREAD: &str = "robolink-receiver";
const SENDER_THREAD: &str = "robolink-sender";

struct LinkShared {
    state: ConnectionState,
    dispatcher: Arc<EventDispatcher>,
    config: LinkConfig,
}

/// A running link: one receiving and one sending thread over a split transport.
///
/// Dropping a `Link` stops both loops and waits for them.
pub struct Link {
    shared: Arc<LinkShared>,
    receiver: Option<JoinHandle<Result<()>>>,
    sender: Option<JoinHandle<Result<()>>>,
}

impl Link {
    /// Start with the default [`LinkConfig`].
    pub fn start<T: Transport>(transport: T, dispatcher: Arc<EventDispatcher>) -> Result<Self> {
        Self::start_with_config(transport, dispatcher, LinkConfig::default())
    }

    /// Initialize `transport`, split it, and spawn both loops.
    pub fn start_with_config<T: Transport>(
        mut transport: T,
        dispatcher: Arc<EventDispatcher>,
        config: LinkConfig,
    ) -> Result<Self> {
        let name = transport.transport_name();
        transport.init()?;
        let (source, sink) = transport.split()?;
        info!(transport = name, ?config, "link starting");

        let shared = Arc::new(LinkShared {
            state: ConnectionState::new(),
            dispatcher,
            config,
        });

        let receiver = {
            let shared = Arc::clone(&shared);
            spawn(RECEIVER_THREAD, move || {
                let result =
                    receiver::run(source, &shared.state, &shared.dispatcher, &shared.config);
                shared.state.stop_running();
                result
            })?
        };

        let sender = {
            let shared = Arc::clone(&shared);
            spawn(SENDER_THREAD, move || {
                let result =
                    sender::run(sink, &shared.state, &shared.dispatcher, &shared.config);
                shared.state.stop_running();
                result
            })
        };
        let sender = match sender {
            Ok(handle) => handle,
            Err(err) => {
                shared.state.stop_running();
                let _ = receiver.join();
                return Err(err);
            }
        };

        Ok(Self {
            shared,
            receiver: Some(receiver),
            sender: Some(sender),
        })
    }

    /// A cloneable handle for submitting commands.
    pub fn handle(&self) -> LinkHandle {
        LinkHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Whether both loops are still running.
    pub fn is_running(&self) -> bool {
        self.shared.state.is_running()
    }

    /// Stop both loops and wait for them.
    pub fn shutdown(self) -> Result<()> {
        self.shared.state.stop_running();
        self.join()
    }

    /// Wait for both loops to end.
    ///
    /// Returns the receiver's error if it failed, else the sender's. A lost connection
    /// surfaces here as an error for which [`LinkError::is_disconnect`] holds.
    pub fn join(mut self) -> Result<()> {
        self.join_workers()
    }

    fn join_workers(&mut self) -> Result<()> {
        let receiver = join_worker(self.receiver.take(), RECEIVER_THREAD);
        let sender = join_worker(self.sender.take(), SENDER_THREAD);
        info!("link stopped");
        receiver.and(sender)
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        if self.receiver.is_none() && self.sender.is_none() {
            return;
        }
        self.shared.state.stop_running();
        if let Err(err) = self.join_workers() {
            debug!(error = %err, "link loop ended with error");
        }
    }
}

fn spawn<F>(name: &'static str, body: F) -> Result<JoinHandle<Result<()>>>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .map_err(|source| LinkError::Spawn { name, source })
}

fn join_worker(handle: Option<JoinHandle<Result<()>>>, name: &'static str) -> Result<()> {
    let Some(handle) = handle else {
        return Ok(());
    };
    match handle.join() {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => {
            warn!(thread = name, error = %err, "link loop failed");
            Err(err)
        }
        Err(_) => Err(LinkError::WorkerPanicked(name)),
    }
}

/// Cloneable handle to a running [`Link`].
#[derive(Clone)]
pub struct LinkHandle {
    shared: Arc<LinkShared>,
}

impl LinkHandle {
    /// Queue `command` under a fresh correlation id.
    pub fn send(&self, command: Command) -> Result<CorrelationId> {
        self.ensure_running()?;
        let mut pending = self.shared.state.pending();
        let id = self.allocate_id(&pending)?;
        pending.enqueue(OutputPacket::new(id, command))
    }

    /// Queue `command` and run `callback` with the event that answers it.
    ///
    /// The callback runs at most once, on the receiving thread, before any handler
    /// registered for the event's kind.
    pub fn send_with_response<F>(&self, command: Command, callback: F) -> Result<CorrelationId>
    where
        F: FnOnce(EventPacket) + Send + 'static,
    {
        self.ensure_running()?;
        let mut pending = self.shared.state.pending();
        let id = self.allocate_id(&pending)?;
        // Registered while the table is locked: the response cannot be processed first.
        self.shared.dispatcher.once(id, callback);
        if let Err(err) = pending.enqueue(OutputPacket::new(id, command)) {
            self.shared.dispatcher.cancel_once(id);
            return Err(err);
        }
        Ok(id)
    }

    /// Queue a packet whose correlation id the caller chose.
    pub fn enqueue(&self, packet: OutputPacket) -> Result<CorrelationId> {
        self.ensure_running()?;
        self.shared.state.enqueue(packet)
    }

    /// Drop `id` from the pending table as if the controller had acknowledged it.
    ///
    /// A response callback registered for `id` is dropped too.
    pub fn acknowledge(&self, id: CorrelationId) -> bool {
        self.shared.dispatcher.cancel_once(id);
        self.shared.state.acknowledge(id)
    }

    pub fn is_pending(&self, id: CorrelationId) -> bool {
        self.shared.state.pending().contains(id)
    }

    pub fn pending_len(&self) -> usize {
        self.shared.state.pending().len()
    }

    /// Commands not yet handed to the transport.
    pub fn queued_len(&self) -> usize {
        self.shared.state.pending().queued()
    }

    /// Whether the controller handshake has been received.
    pub fn is_initialized(&self) -> bool {
        self.shared.state.is_initialized()
    }

    /// Whether the controller asked the host to stop transmitting.
    pub fn is_sending_stopped(&self) -> bool {
        self.shared.state.is_sending_stopped()
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.is_running()
    }

    /// Ask both loops to stop. The owning [`Link`] still has to be joined.
    pub fn shutdown(&self) {
        self.shared.state.stop_running();
    }

    /// The dispatcher events are delivered through.
    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.shared.dispatcher
    }

    /// An id free in both the table and the one-shot registry. Callers hold the table
    /// lock, which is always taken before the registry lock.
    fn allocate_id(&self, pending: &PendingTable) -> Result<CorrelationId> {
        let dispatcher = &self.shared.dispatcher;
        pending.allocate_id_excluding(&mut rand::thread_rng(), |id| dispatcher.has_one_shot(id))
    }

    fn ensure_running(&self) -> Result<()> {
        if self.shared.state.is_running() {
            Ok(())
        } else {
            Err(LinkError::Stopped)
        }
    }
}
