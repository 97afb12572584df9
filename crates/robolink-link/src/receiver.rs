use robolink_packet::{classify, decode_event, split_subframes, CorrelationId, SubFrame};
use robolink_transport::FrameSource;
use tracing::{debug, error, info, trace, warn};

use crate::config::LinkConfig;
use crate::dispatch::EventDispatcher;
use crate::error::Result;
use crate::state::ConnectionState;

/// Read and process inbound frames until the link stops or the transport fails.
pub(crate) fn run<S: FrameSource>(
    mut source: S,
    state: &ConnectionState,
    dispatcher: &EventDispatcher,
    config: &LinkConfig,
) -> Result<()> {
    while state.is_running() {
        if !source.is_read_ready(config.read_poll_timeout)? {
            continue;
        }
        let raw = source.read_frame()?;
        config.indicator.on_receive();
        trace!(len = raw.len(), "read");
        process_read(&raw, state, dispatcher);
    }

    debug!("receiver stopped");
    Ok(())
}

/// Handle one physical read, sub-frame by sub-frame, in arrival order.
///
/// Nothing in here can fail the loop: malformed input is logged and skipped.
pub(crate) fn process_read(raw: &[u8], state: &ConnectionState, dispatcher: &EventDispatcher) {
    for sub_frame in split_subframes(raw) {
        match classify(sub_frame, state.is_initialized()) {
            SubFrame::Handshake => {
                if state.mark_initialized() {
                    info!("controller handshake received");
                    dispatcher.connection_started();
                }
            }
            SubFrame::SizeError => {
                error!("controller rejected packet size");
            }
            SubFrame::Stop => {
                debug!("controller requested stop");
                state.stop_sending();
            }
            SubFrame::Ack(id) => {
                state.resume_sending();
                // A plain acknowledgment means no response will follow.
                dispatcher.cancel_once(id);
                if state.acknowledge(id) {
                    debug!(correlation_id = %id, "command acknowledged");
                } else {
                    debug!(correlation_id = %id, "acknowledgment for unknown command");
                }
            }
            SubFrame::Response { event, suffix } => {
                let id = match CorrelationId::from_digit_bytes(suffix) {
                    Ok(id) => {
                        state.resume_sending();
                        state.acknowledge(id);
                        Some(id)
                    }
                    Err(err) => {
                        warn!(error = %err, "malformed response suffix");
                        None
                    }
                };
                deliver(event, id, dispatcher);
            }
            SubFrame::Event(event) => deliver(event, None, dispatcher),
            SubFrame::Unexpected(bytes) => {
                error!(
                    len = bytes.len(),
                    data = %String::from_utf8_lossy(bytes),
                    "unexpected packet"
                );
            }
        }
    }
}

fn deliver(bytes: &[u8], id: Option<CorrelationId>, dispatcher: &EventDispatcher) {
    match decode_event(bytes) {
        Ok(event) => {
            trace!(kind = event.kind().name(), correlation_id = ?id, "event");
            dispatcher.dispatch(&event, id);
        }
        Err(err) => warn!(error = %err, "dropping undecodable event"),
    }
}
