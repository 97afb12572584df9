//! Simulated robot controller on a TCP port.
//!
//! Announces itself with the handshake marker, answers measurement commands with an
//! event carrying the command's correlation id, and acknowledges everything else.
//!
//! Run with:
//!   cargo run --example simulated-controller -- 127.0.0.1:5000
//!
//! In another terminal:
//!   cargo run --features cli -- send --tcp 127.0.0.1:5000 \
//!     --command measure-distance --wait

use std::io::{Read, Write};
use std::net::TcpListener;

use bytes::{BufMut, BytesMut};
use robolink::packet::{
    decode_command, encode_event, AxisGroup, Command, DistanceReading, EventPacket,
    LineTracerReading, MotorFeedback, NineAxisReading, ServoFeedback, DELIMITER,
    HANDSHAKE_MARKER, OUTPUT_PACKET_LENGTH,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:5000".to_string());
    let listener = TcpListener::bind(&addr)?;
    eprintln!("Controller listening on {addr}");

    let (mut stream, peer) = listener.accept()?;
    eprintln!("Host connected: {peer}");

    stream.write_all(HANDSHAKE_MARKER.as_bytes())?;
    stream.write_all(DELIMITER)?;

    let mut distance = 500.0f32;
    let mut frame = [0u8; OUTPUT_PACKET_LENGTH];
    loop {
        if let Err(e) = stream.read_exact(&mut frame) {
            eprintln!("Host disconnected: {e}");
            break;
        }
        let packet = match decode_command(&frame) {
            Ok(packet) => packet,
            Err(e) => {
                eprintln!("Rejecting frame: {e}");
                stream.write_all(b"Invalid data size\r\n")?;
                continue;
            }
        };
        eprintln!(
            "Command {} id={}",
            packet.command.kind().name(),
            packet.correlation_id
        );

        let mut reply = BytesMut::new();
        match answer(&packet.command, &mut distance) {
            Some(event) => {
                encode_event(&event, &mut reply);
                reply.put_slice(&packet.correlation_id.to_digit_bytes());
            }
            None => reply.put_slice(&packet.correlation_id.to_ascii()),
        }
        reply.put_slice(DELIMITER);
        stream.write_all(&reply)?;
    }

    Ok(())
}

fn answer(command: &Command, distance: &mut f32) -> Option<EventPacket> {
    match command {
        Command::MeasureDistance => {
            *distance = (*distance - 25.0).max(50.0);
            Some(EventPacket::DistanceSensorResult(DistanceReading {
                distance_mm: *distance,
            }))
        }
        Command::MeasureLineTracer => Some(EventPacket::LineTracerResult(LineTracerReading {
            detected: 0b01,
            left: 0.8,
            right: 0.1,
        })),
        Command::MeasureNineAxis => Some(EventPacket::NineAxisSensorResult(NineAxisReading {
            group: AxisGroup::Acceleration,
            x: 0.0,
            y: 0.0,
            z: 9.8,
        })),
        Command::RightSteppingMotor(motor) => {
            Some(EventPacket::RightSteppingMotorFeedback(MotorFeedback {
                locked: motor.locked,
                direction: motor.direction,
                angular_speed: motor.values[0],
                total_angle: motor.values[1],
            }))
        }
        Command::LeftSteppingMotor(motor) => {
            Some(EventPacket::LeftSteppingMotorFeedback(MotorFeedback {
                locked: motor.locked,
                direction: motor.direction,
                angular_speed: motor.values[0],
                total_angle: motor.values[1],
            }))
        }
        Command::UpperServoMotor(servo) => {
            Some(EventPacket::UpperServoMotorFeedback(ServoFeedback {
                angle: servo.angle,
                speed: servo.speed,
            }))
        }
        Command::BottomServoMotor(servo) => {
            Some(EventPacket::BottomServoMotorFeedback(ServoFeedback {
                angle: servo.angle,
                speed: servo.speed,
            }))
        }
        Command::BothSteppingMotor(_) => None,
    }
}
