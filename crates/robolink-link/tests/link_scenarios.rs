use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use bytes::{BufMut, Bytes, BytesMut};
use robolink_link::{ActivityIndicator, EventDispatcher, Link, LinkConfig, LinkHandle};
use robolink_packet::{
    decode_command, encode_event, Command, CorrelationId, DistanceReading, EventKind,
    EventPacket, MotorCommand, OutputPacket, RotationDirection,
};
use robolink_transport::{MemoryTransport, RemoteEnd};

const WAIT: Duration = Duration::from_secs(2);

fn config() -> LinkConfig {
    LinkConfig {
        send_interval: Duration::from_millis(1),
        read_poll_timeout: Duration::from_millis(10),
        ..LinkConfig::default()
    }
}

fn start(dispatcher: Arc<EventDispatcher>) -> (Link, LinkHandle, RemoteEnd) {
    start_with(dispatcher, config())
}

fn start_with(
    dispatcher: Arc<EventDispatcher>,
    config: LinkConfig,
) -> (Link, LinkHandle, RemoteEnd) {
    let (transport, remote) = MemoryTransport::pair();
    let link = Link::start_with_config(transport, dispatcher, config).unwrap();
    let handle = link.handle();
    (link, handle, remote)
}

fn cid(v: u16) -> CorrelationId {
    CorrelationId::new(v).unwrap()
}

fn distance(mm: f32) -> EventPacket {
    EventPacket::DistanceSensorResult(DistanceReading { distance_mm: mm })
}

fn event_frame(event: &EventPacket) -> BytesMut {
    let mut buf = BytesMut::new();
    encode_event(event, &mut buf);
    buf
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

fn received_id(frame: &Bytes) -> CorrelationId {
    decode_command(frame).unwrap().correlation_id
}

#[test]
fn commands_leave_in_enqueue_order() {
    let (link, handle, remote) = start(Arc::new(EventDispatcher::new()));

    let ids: Vec<CorrelationId> = [1001, 7002, 3003, 5004]
        .into_iter()
        .map(|v| {
            handle
                .enqueue(OutputPacket::new(cid(v), Command::MeasureLineTracer))
                .unwrap()
        })
        .collect();

    let sent: Vec<CorrelationId> = (0..ids.len())
        .map(|_| received_id(&remote.recv_timeout(WAIT).unwrap()))
        .collect();
    assert_eq!(sent, ids);
    assert!(remote.recv_timeout(Duration::from_millis(50)).is_none());

    link.shutdown().unwrap();
}

#[test]
fn stop_holds_transmission_until_acknowledged() {
    let (link, handle, remote) = start(Arc::new(EventDispatcher::new()));

    let first = handle.send(Command::MeasureDistance).unwrap();
    assert_eq!(received_id(&remote.recv_timeout(WAIT).unwrap()), first);

    remote.send(&b"Stop\r\n"[..]).unwrap();
    assert!(wait_until(|| handle.is_sending_stopped()));

    let second = handle.send(Command::MeasureNineAxis).unwrap();
    assert!(remote.recv_timeout(Duration::from_millis(100)).is_none());
    assert!(handle.is_pending(second));

    remote.send(first.to_ascii().to_vec()).unwrap();
    assert_eq!(received_id(&remote.recv_timeout(WAIT).unwrap()), second);
    assert!(!handle.is_sending_stopped());
    assert!(!handle.is_pending(first));

    link.shutdown().unwrap();
}

#[test]
fn unknown_acknowledgment_is_harmless() {
    let (link, handle, remote) = start(Arc::new(EventDispatcher::new()));
    let id = handle
        .enqueue(OutputPacket::new(cid(2468), Command::MeasureDistance))
        .unwrap();
    remote.recv_timeout(WAIT).unwrap();

    remote.send(&b"1357\r\n"[..]).unwrap();
    remote.send(&b"Stop\r\n"[..]).unwrap();
    assert!(wait_until(|| handle.is_sending_stopped()));

    assert!(handle.is_pending(id));
    assert_eq!(handle.pending_len(), 1);
    assert!(link.is_running());

    link.shutdown().unwrap();
}

#[test]
fn two_events_in_one_read_arrive_in_order() {
    let dispatcher = Arc::new(EventDispatcher::new());
    let (tx, rx) = mpsc::channel();
    dispatcher.on(EventKind::DistanceSensorResult, move |event| {
        let _ = tx.send(*event);
    });
    let (link, _handle, remote) = start(Arc::clone(&dispatcher));

    let mut raw = event_frame(&distance(10.0));
    raw.put_slice(b"\r\n");
    raw.put_slice(&event_frame(&distance(20.0)));
    raw.put_slice(b"\r\n");
    remote.send(raw.freeze()).unwrap();

    assert_eq!(rx.recv_timeout(WAIT).unwrap(), distance(10.0));
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), distance(20.0));

    link.shutdown().unwrap();
}

#[test]
fn response_to_motor_command_clears_entry_and_gate() {
    let dispatcher = Arc::new(EventDispatcher::new());
    let (tx, rx) = mpsc::channel();
    dispatcher.on(EventKind::DistanceSensorResult, move |event| {
        let _ = tx.send(*event);
    });
    let (link, handle, remote) = start(Arc::clone(&dispatcher));

    let id = handle
        .enqueue(OutputPacket::new(
            cid(4821),
            Command::BothSteppingMotor(MotorCommand::rotate(
                RotationDirection::RightForward,
                90.0,
                360.0,
            )),
        ))
        .unwrap();
    remote.recv_timeout(WAIT).unwrap();
    remote.send(&b"Stop\r\n"[..]).unwrap();
    assert!(wait_until(|| handle.is_sending_stopped()));

    let mut raw = event_frame(&distance(250.0));
    raw.put_slice(&id.to_digit_bytes());
    raw.put_slice(b"\r\n");
    remote.send(raw.freeze()).unwrap();

    assert_eq!(rx.recv_timeout(WAIT).unwrap(), distance(250.0));
    assert!(wait_until(|| !handle.is_pending(id)));
    assert!(!handle.is_sending_stopped());

    link.shutdown().unwrap();
}

#[test]
fn send_with_response_delivers_once() {
    let dispatcher = Arc::new(EventDispatcher::new());
    let (link, handle, remote) = start(Arc::clone(&dispatcher));

    let (tx, rx) = mpsc::channel();
    let id = handle
        .send_with_response(Command::MeasureDistance, move |event| {
            let _ = tx.send(event);
        })
        .unwrap();
    assert_eq!(received_id(&remote.recv_timeout(WAIT).unwrap()), id);

    for _ in 0..2 {
        let mut raw = event_frame(&distance(99.0));
        raw.put_slice(&id.to_digit_bytes());
        remote.send(raw.freeze()).unwrap();
    }

    assert_eq!(rx.recv_timeout(WAIT).unwrap(), distance(99.0));
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    assert_eq!(dispatcher.pending_one_shots(), 0);

    link.shutdown().unwrap();
}

#[test]
fn plain_ack_retires_response_callback() {
    let dispatcher = Arc::new(EventDispatcher::new());
    let (link, handle, remote) = start(Arc::clone(&dispatcher));

    let (tx, first_answers) = mpsc::channel();
    let id = handle
        .send_with_response(Command::MeasureDistance, move |event| {
            let _ = tx.send(event);
        })
        .unwrap();
    remote.recv_timeout(WAIT).unwrap();

    let mut ack = id.to_ascii().to_vec();
    ack.extend_from_slice(b"\r\n");
    remote.send(ack).unwrap();
    assert!(wait_until(|| !handle.is_pending(id)));
    assert!(wait_until(|| dispatcher.pending_one_shots() == 0));

    // A later command reusing the id gets its own answer.
    let (tx, second_answers) = mpsc::channel();
    dispatcher.once(id, move |event| {
        let _ = tx.send(event);
    });
    handle
        .enqueue(OutputPacket::new(id, Command::MeasureDistance))
        .unwrap();
    remote.recv_timeout(WAIT).unwrap();

    let mut raw = event_frame(&distance(777.0));
    raw.put_slice(&id.to_digit_bytes());
    remote.send(raw.freeze()).unwrap();

    assert_eq!(second_answers.recv_timeout(WAIT).unwrap(), distance(777.0));
    assert!(first_answers.try_recv().is_err());

    link.shutdown().unwrap();
}

#[test]
fn expiry_retires_response_callback() {
    let config = LinkConfig {
        pending_ttl: Some(Duration::from_millis(20)),
        ..config()
    };
    let dispatcher = Arc::new(EventDispatcher::new());
    let (link, handle, remote) = start_with(Arc::clone(&dispatcher), config);

    let (tx, answers) = mpsc::channel();
    let id = handle
        .send_with_response(Command::MeasureDistance, move |event| {
            let _ = tx.send(event);
        })
        .unwrap();
    remote.recv_timeout(WAIT).unwrap();

    assert!(wait_until(|| !handle.is_pending(id)));
    assert!(wait_until(|| dispatcher.pending_one_shots() == 0));

    let mut raw = event_frame(&distance(42.0));
    raw.put_slice(&id.to_digit_bytes());
    remote.send(raw.freeze()).unwrap();
    assert!(answers.recv_timeout(Duration::from_millis(100)).is_err());

    link.shutdown().unwrap();
}

#[test]
fn generated_ids_avoid_waiting_callbacks() {
    let dispatcher = Arc::new(EventDispatcher::new());
    for v in CorrelationId::MIN..=CorrelationId::MAX {
        if v != 6006 {
            dispatcher.once(cid(v), |_| {});
        }
    }
    let (link, handle, _remote) = start(Arc::clone(&dispatcher));

    let id = handle
        .send_with_response(Command::MeasureDistance, |_| {})
        .unwrap();
    assert_eq!(id, cid(6006));

    link.shutdown().unwrap();
}

#[test]
fn handshake_notifies_once() {
    let dispatcher = Arc::new(EventDispatcher::new());
    let starts = Arc::new(AtomicUsize::new(0));
    let s = Arc::clone(&starts);
    dispatcher.on_connection_start(move || {
        s.fetch_add(1, Ordering::SeqCst);
    });
    let (link, handle, remote) = start(Arc::clone(&dispatcher));

    assert!(!handle.is_initialized());
    remote.send(&b"Transmission Start\r\n"[..]).unwrap();
    remote.send(&b"Transmission Start\r\n"[..]).unwrap();
    remote.send(&b"Stop\r\n"[..]).unwrap();
    assert!(wait_until(|| handle.is_sending_stopped()));

    assert!(handle.is_initialized());
    assert_eq!(starts.load(Ordering::SeqCst), 1);

    link.shutdown().unwrap();
}

#[test]
fn malformed_input_keeps_loop_alive() {
    let dispatcher = Arc::new(EventDispatcher::new());
    let (tx, rx) = mpsc::channel();
    dispatcher.on(EventKind::DistanceSensorResult, move |event| {
        let _ = tx.send(*event);
    });
    let (link, _handle, remote) = start(Arc::clone(&dispatcher));

    remote.send(vec![0xffu8, 0xfe, 0x00]).unwrap();
    remote.send(vec![0x7fu8; 14]).unwrap();
    remote.send(&b"Invalid data size\r\n"[..]).unwrap();
    remote.send(event_frame(&distance(7.0)).freeze()).unwrap();

    assert_eq!(rx.recv_timeout(WAIT).unwrap(), distance(7.0));
    assert!(link.is_running());

    link.shutdown().unwrap();
}

#[test]
fn remote_close_is_reported_as_disconnect() {
    let (link, handle, mut remote) = start(Arc::new(EventDispatcher::new()));

    remote.close();
    assert!(wait_until(|| !handle.is_running()));

    let err = link.join().unwrap_err();
    assert!(err.is_disconnect(), "unexpected error: {err}");
}

#[test]
fn expired_commands_leave_the_table() {
    let config = LinkConfig {
        pending_ttl: Some(Duration::from_millis(20)),
        ..config()
    };
    let (link, handle, remote) = start_with(Arc::new(EventDispatcher::new()), config);

    let id = handle.send(Command::MeasureDistance).unwrap();
    remote.recv_timeout(WAIT).unwrap();
    assert!(wait_until(|| !handle.is_pending(id)));

    link.shutdown().unwrap();
}

#[derive(Default)]
struct CountingIndicator {
    transmits: AtomicUsize,
    receives: AtomicUsize,
}

impl ActivityIndicator for CountingIndicator {
    fn on_transmit(&self) {
        self.transmits.fetch_add(1, Ordering::SeqCst);
    }

    fn on_receive(&self) {
        self.receives.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn indicator_sees_traffic() {
    let indicator = Arc::new(CountingIndicator::default());
    let config = config().with_indicator(Arc::clone(&indicator) as Arc<dyn ActivityIndicator>);
    let (link, handle, remote) = start_with(Arc::new(EventDispatcher::new()), config);

    let id = handle.send(Command::MeasureDistance).unwrap();
    remote.recv_timeout(WAIT).unwrap();
    remote.send(id.to_ascii().to_vec()).unwrap();
    assert!(wait_until(|| !handle.is_pending(id)));

    assert_eq!(indicator.transmits.load(Ordering::SeqCst), 1);
    assert!(indicator.receives.load(Ordering::SeqCst) >= 1);

    link.shutdown().unwrap();
}

#[test]
fn handle_is_shareable_across_threads() {
    let (link, handle, remote) = start(Arc::new(EventDispatcher::new()));
    let ids = Arc::new(Mutex::new(Vec::new()));

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let handle = handle.clone();
            let ids = Arc::clone(&ids);
            thread::spawn(move || {
                for _ in 0..5 {
                    let id = handle.send(Command::MeasureNineAxis).unwrap();
                    ids.lock().unwrap().push(id);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let mut sent: Vec<CorrelationId> = (0..20)
        .map(|_| received_id(&remote.recv_timeout(WAIT).unwrap()))
        .collect();
    let mut expected = ids.lock().unwrap().clone();
    sent.sort_unstable();
    expected.sort_unstable();
    expected.dedup();
    assert_eq!(expected.len(), 20, "ids are unique while pending");
    assert_eq!(sent, expected);

    link.shutdown().unwrap();
}
