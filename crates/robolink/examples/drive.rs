//! Drive forward until an obstacle is close, using an `EventListener`.
//!
//! Run the controller first:
//!   cargo run --example simulated-controller -- 127.0.0.1:5000
//!
//! Then:
//!   cargo run --example drive -- 127.0.0.1:5000

use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::time::Duration;

use robolink::link::{EventDispatcher, EventListener, Link};
use robolink::packet::{Command, DistanceReading, MotorCommand, RotationDirection};
use robolink::transport::TcpTransport;

const STOP_DISTANCE_MM: f32 = 150.0;

struct Obstacles {
    readings: Sender<f32>,
}

impl EventListener for Obstacles {
    fn on_connection_start(&self) {
        eprintln!("Controller ready");
    }

    fn on_distance_sensor_resulted(&self, reading: &DistanceReading) {
        let _ = self.readings.send(reading.distance_mm);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:5000".to_string());

    let (tx, readings) = mpsc::channel();
    let dispatcher = Arc::new(EventDispatcher::new());
    dispatcher.listen(Arc::new(Obstacles { readings: tx }));

    let link = Link::start(TcpTransport::connect(addr), dispatcher)?;
    let robot = link.handle();

    robot.send(Command::BothSteppingMotor(MotorCommand::run(
        RotationDirection::RightForward,
        90.0,
    )))?;

    loop {
        robot.send(Command::MeasureDistance)?;
        let distance = readings.recv_timeout(Duration::from_secs(2))?;
        eprintln!("Distance {distance:.0} mm");
        if distance <= STOP_DISTANCE_MM {
            break;
        }
        std::thread::sleep(Duration::from_millis(200));
    }

    robot.send(Command::BothSteppingMotor(MotorCommand::stop()))?;
    while robot.queued_len() > 0 {
        std::thread::sleep(Duration::from_millis(10));
    }
    link.shutdown()?;
    Ok(())
}
