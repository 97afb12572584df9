use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use robolink_link::EventDispatcher;
use robolink_packet::{EventKind, EventPacket};
use tracing::info;

use crate::cmd::{start_link, MonitorArgs};
use crate::exit::{link_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_event, OutputFormat};

const RECV_SLICE: Duration = Duration::from_millis(100);

pub fn run(args: MonitorArgs, format: OutputFormat) -> CliResult<i32> {
    let dispatcher = Arc::new(EventDispatcher::new());
    let (tx, events) = mpsc::channel::<EventPacket>();
    for kind in EventKind::ALL {
        let tx = tx.clone();
        dispatcher.on(kind, move |event| {
            let _ = tx.send(*event);
        });
    }
    drop(tx);
    dispatcher.on_connection_start(|| info!("controller ready"));

    // Dial and accept block; they stay interruptible by the default handler.
    let link = start_link(&args.transport, &args.link, dispatcher)?;
    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) && link.is_running() {
        let event = match events.recv_timeout(RECV_SLICE) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        print_event(&event, None, format);
        printed = printed.saturating_add(1);

        if let Some(count) = args.count {
            if printed >= count {
                break;
            }
        }
    }

    // Events that were already dispatched when the link stopped.
    if args.count.map_or(true, |count| printed < count) {
        for event in events.try_iter() {
            print_event(&event, None, format);
            printed = printed.saturating_add(1);
            if args.count.is_some_and(|count| printed >= count) {
                break;
            }
        }
    }

    link.shutdown()
        .map_err(|err| link_error("link failed", err))?;
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
