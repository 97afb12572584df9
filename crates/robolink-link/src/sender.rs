use std::thread;
use std::time::{Duration, Instant};

use robolink_transport::FrameSink;
use tracing::{debug, warn};

use crate::config::LinkConfig;
use crate::dispatch::EventDispatcher;
use crate::error::Result;
use crate::state::ConnectionState;

const MAX_EXPIRY_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Drain the pending queue into `sink` until the link stops.
///
/// Each dequeued packet is written exactly once. While the flow-control gate is
/// closed nothing is dequeued. A write failure ends the loop. Expired commands lose
/// their response callback along with their table entry.
pub(crate) fn run<S: FrameSink>(
    mut sink: S,
    state: &ConnectionState,
    dispatcher: &EventDispatcher,
    config: &LinkConfig,
) -> Result<()> {
    let mut last_sweep = Instant::now();

    while state.is_running() {
        if let Some(ttl) = config.pending_ttl {
            if last_sweep.elapsed() >= ttl.min(MAX_EXPIRY_SWEEP_INTERVAL) {
                for id in state.expire_pending(ttl) {
                    dispatcher.cancel_once(id);
                    warn!(correlation_id = %id, ?ttl, "dropping unacknowledged command");
                }
                last_sweep = Instant::now();
            }
        }

        match state.dequeue_if_open() {
            Some(outgoing) => {
                config.indicator.on_transmit();
                debug!(
                    correlation_id = %outgoing.correlation_id,
                    kind = outgoing.kind.name(),
                    len = outgoing.frame.len(),
                    "sending command"
                );
                sink.write_frame(&outgoing.frame)?;
            }
            None => thread::sleep(config.send_interval),
        }
    }

    debug!("sender stopped");
    Ok(())
}
