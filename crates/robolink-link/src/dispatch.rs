use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use robolink_packet::{
    CorrelationId, DistanceReading, EventKind, EventPacket, LineTracerReading, MotorAlert,
    MotorFeedback, NineAxisReading, ServoFeedback,
};
use tracing::trace;

type Handler = Arc<dyn Fn(&EventPacket) + Send + Sync>;
type OneShot = Box<dyn FnOnce(EventPacket) + Send>;
type StartHandler = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Registry {
    handlers: HashMap<EventKind, Handler>,
    one_shots: HashMap<CorrelationId, OneShot>,
    connection_start: Vec<StartHandler>,
}

/// Routes decoded events to subscribers.
///
/// Holds exactly one handler per [`EventKind`], plus one-shot callbacks keyed by the
/// correlation id of the command whose response they wait for. Callbacks run on the
/// receiving loop's thread, outside the registry lock, so they may register further
/// callbacks.
#[derive(Default)]
pub struct EventDispatcher {
    registry: Mutex<Registry>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the handler for `kind`. Returns `true` if it replaced an earlier one.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> bool
    where
        F: Fn(&EventPacket) + Send + Sync + 'static,
    {
        self.registry()
            .handlers
            .insert(kind, Arc::new(handler))
            .is_some()
    }

    /// Remove the handler for `kind`.
    pub fn off(&self, kind: EventKind) -> bool {
        self.registry().handlers.remove(&kind).is_some()
    }

    /// Whether a handler is set for `kind`.
    pub fn has_handler(&self, kind: EventKind) -> bool {
        self.registry().handlers.contains_key(&kind)
    }

    /// Deliver the next response carrying `id` to `callback`, once.
    ///
    /// A later registration for the same id replaces the earlier one.
    pub fn once<F>(&self, id: CorrelationId, callback: F)
    where
        F: FnOnce(EventPacket) + Send + 'static,
    {
        self.registry().one_shots.insert(id, Box::new(callback));
    }

    /// Drop a one-shot registration that is no longer wanted.
    pub fn cancel_once(&self, id: CorrelationId) -> bool {
        self.registry().one_shots.remove(&id).is_some()
    }

    /// Whether a one-shot callback waits on `id`.
    pub fn has_one_shot(&self, id: CorrelationId) -> bool {
        self.registry().one_shots.contains_key(&id)
    }

    /// One-shot callbacks still waiting for their response.
    pub fn pending_one_shots(&self) -> usize {
        self.registry().one_shots.len()
    }

    /// Run `callback` whenever the controller handshake arrives.
    pub fn on_connection_start<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.registry().connection_start.push(Arc::new(callback));
    }

    /// Wire every event kind, and the connection start, to `listener`.
    pub fn listen<L>(&self, listener: Arc<L>)
    where
        L: EventListener + 'static,
    {
        for kind in EventKind::ALL {
            let listener = Arc::clone(&listener);
            self.on(kind, move |event| deliver(listener.as_ref(), event));
        }
        self.on_connection_start(move || listener.on_connection_start());
    }

    /// Deliver `event`, answering command `id` if given.
    ///
    /// A matching one-shot callback runs first, then the kind handler. Returns `false`
    /// when nobody was interested.
    pub fn dispatch(&self, event: &EventPacket, id: Option<CorrelationId>) -> bool {
        let (one_shot, handler) = {
            let mut registry = self.registry();
            let one_shot = id.and_then(|id| registry.one_shots.remove(&id));
            let handler = registry.handlers.get(&event.kind()).cloned();
            (one_shot, handler)
        };

        let mut delivered = false;
        if let Some(callback) = one_shot {
            callback(*event);
            delivered = true;
        }
        if let Some(handler) = handler {
            handler(event);
            delivered = true;
        }
        if !delivered {
            trace!(kind = event.kind().name(), "no handler registered; event dropped");
        }
        delivered
    }

    /// Notify connection-start subscribers.
    pub fn connection_started(&self) {
        let callbacks = self.registry().connection_start.clone();
        for callback in callbacks {
            callback();
        }
    }
}

/// Per-kind event callbacks, all defaulting to no-ops.
///
/// Convenient for subsystems interested in several kinds; attach with
/// [`EventDispatcher::listen`].
pub trait EventListener: Send + Sync {
    fn on_connection_start(&self) {}
    fn on_right_stepping_motor_alerted(&self, _alert: &MotorAlert) {}
    fn on_right_stepping_motor_feedback(&self, _feedback: &MotorFeedback) {}
    fn on_left_stepping_motor_alerted(&self, _alert: &MotorAlert) {}
    fn on_left_stepping_motor_feedback(&self, _feedback: &MotorFeedback) {}
    fn on_distance_sensor_resulted(&self, _reading: &DistanceReading) {}
    fn on_line_tracer_resulted(&self, _reading: &LineTracerReading) {}
    fn on_nine_axis_sensor_resulted(&self, _reading: &NineAxisReading) {}
    fn on_upper_servo_motor_feedback(&self, _feedback: &ServoFeedback) {}
    fn on_bottom_servo_motor_feedback(&self, _feedback: &ServoFeedback) {}
}

fn deliver<L: EventListener + ?Sized>(listener: &L, event: &EventPacket) {
    match event {
        EventPacket::RightSteppingMotorAlert(a) => listener.on_right_stepping_motor_alerted(a),
        EventPacket::RightSteppingMotorFeedback(f) => listener.on_right_stepping_motor_feedback(f),
        EventPacket::LeftSteppingMotorAlert(a) => listener.on_left_stepping_motor_alerted(a),
        EventPacket::LeftSteppingMotorFeedback(f) => listener.on_left_stepping_motor_feedback(f),
        EventPacket::DistanceSensorResult(r) => listener.on_distance_sensor_resulted(r),
        EventPacket::LineTracerResult(r) => listener.on_line_tracer_resulted(r),
        EventPacket::NineAxisSensorResult(r) => listener.on_nine_axis_sensor_resulted(r),
        EventPacket::UpperServoMotorFeedback(f) => listener.on_upper_servo_motor_feedback(f),
        EventPacket::BottomServoMotorFeedback(f) => listener.on_bottom_servo_motor_feedback(f),
    }
}
