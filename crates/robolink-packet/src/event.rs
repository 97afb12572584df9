use bytes::{Buf, BufMut, BytesMut};
use serde::Serialize;

use crate::command::RotationDirection;
use crate::error::{CodecError, Result};
use crate::wire::PACKET_LENGTH;

/// Bytes following the kind id in an event packet: flags (1) + three `f32` slots (12).
const EVENT_PAYLOAD_LENGTH: usize = PACKET_LENGTH - 1;

const LOCKED_BIT: u8 = 0b0000_0001;
const DIRECTION_SHIFT: u8 = 1;
const DIRECTION_MASK: u8 = 0b11;

/// Inbound event kinds. The set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum EventKind {
    RightSteppingMotorAlert = 0x11,
    RightSteppingMotorFeedback = 0x12,
    LeftSteppingMotorAlert = 0x13,
    LeftSteppingMotorFeedback = 0x14,
    DistanceSensorResult = 0x15,
    LineTracerResult = 0x16,
    NineAxisSensorResult = 0x17,
    UpperServoMotorFeedback = 0x18,
    BottomServoMotorFeedback = 0x19,
}

type Decoder = fn(EventKind, &mut &[u8]) -> Result<EventPacket>;

impl EventKind {
    /// Every event kind, in id order.
    pub const ALL: [EventKind; 9] = [
        Self::RightSteppingMotorAlert,
        Self::RightSteppingMotorFeedback,
        Self::LeftSteppingMotorAlert,
        Self::LeftSteppingMotorFeedback,
        Self::DistanceSensorResult,
        Self::LineTracerResult,
        Self::NineAxisSensorResult,
        Self::UpperServoMotorFeedback,
        Self::BottomServoMotorFeedback,
    ];

    /// Look up a kind by its wire id.
    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.id() == id)
    }

    /// Wire id.
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Human-readable name for logs and output.
    pub fn name(self) -> &'static str {
        match self {
            Self::RightSteppingMotorAlert => "right-motor-alert",
            Self::RightSteppingMotorFeedback => "right-motor-feedback",
            Self::LeftSteppingMotorAlert => "left-motor-alert",
            Self::LeftSteppingMotorFeedback => "left-motor-feedback",
            Self::DistanceSensorResult => "distance",
            Self::LineTracerResult => "line-tracer",
            Self::NineAxisSensorResult => "nine-axis",
            Self::UpperServoMotorFeedback => "upper-servo-feedback",
            Self::BottomServoMotorFeedback => "bottom-servo-feedback",
        }
    }

    /// Payload bytes this kind expects after the kind id.
    pub fn payload_len(self) -> usize {
        EVENT_PAYLOAD_LENGTH
    }

    fn decoder(self) -> Decoder {
        match self {
            Self::RightSteppingMotorAlert | Self::LeftSteppingMotorAlert => decode_motor_alert,
            Self::RightSteppingMotorFeedback | Self::LeftSteppingMotorFeedback => {
                decode_motor_feedback
            }
            Self::DistanceSensorResult => decode_distance,
            Self::LineTracerResult => decode_line_tracer,
            Self::NineAxisSensorResult => decode_nine_axis,
            Self::UpperServoMotorFeedback | Self::BottomServoMotorFeedback => {
                decode_servo_feedback
            }
        }
    }
}

/// Stepping-motor alert raised by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MotorAlert {
    /// Controller-defined alert code.
    pub code: u8,
    /// Motor position [deg] when the alert fired.
    pub position: f32,
}

/// Stepping-motor state report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MotorFeedback {
    pub locked: bool,
    pub direction: RotationDirection,
    /// [deg/s]
    pub angular_speed: f32,
    /// [deg]
    pub total_angle: f32,
}

/// Distance-sensor measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DistanceReading {
    pub distance_mm: f32,
}

/// Line-tracer measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LineTracerReading {
    /// Bit per sensor, set when the line is detected under it.
    pub detected: u8,
    pub left: f32,
    pub right: f32,
}

/// Which triple a nine-axis report carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AxisGroup {
    Acceleration,
    AngularVelocity,
    MagneticField,
}

impl AxisGroup {
    fn bits(self) -> u8 {
        match self {
            Self::Acceleration => 0,
            Self::AngularVelocity => 1,
            Self::MagneticField => 2,
        }
    }

    fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::Acceleration),
            1 => Some(Self::AngularVelocity),
            2 => Some(Self::MagneticField),
            _ => None,
        }
    }
}

/// Nine-axis sensor measurement (one axis group per packet).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NineAxisReading {
    pub group: AxisGroup,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Servo-motor state report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ServoFeedback {
    /// [deg]
    pub angle: f32,
    /// [deg/s]
    pub speed: f32,
}

/// A decoded inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "kebab-case")]
pub enum EventPacket {
    RightSteppingMotorAlert(MotorAlert),
    RightSteppingMotorFeedback(MotorFeedback),
    LeftSteppingMotorAlert(MotorAlert),
    LeftSteppingMotorFeedback(MotorFeedback),
    DistanceSensorResult(DistanceReading),
    LineTracerResult(LineTracerReading),
    NineAxisSensorResult(NineAxisReading),
    UpperServoMotorFeedback(ServoFeedback),
    BottomServoMotorFeedback(ServoFeedback),
}

impl EventPacket {
    /// The event's kind.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::RightSteppingMotorAlert(_) => EventKind::RightSteppingMotorAlert,
            Self::RightSteppingMotorFeedback(_) => EventKind::RightSteppingMotorFeedback,
            Self::LeftSteppingMotorAlert(_) => EventKind::LeftSteppingMotorAlert,
            Self::LeftSteppingMotorFeedback(_) => EventKind::LeftSteppingMotorFeedback,
            Self::DistanceSensorResult(_) => EventKind::DistanceSensorResult,
            Self::LineTracerResult(_) => EventKind::LineTracerResult,
            Self::NineAxisSensorResult(_) => EventKind::NineAxisSensorResult,
            Self::UpperServoMotorFeedback(_) => EventKind::UpperServoMotorFeedback,
            Self::BottomServoMotorFeedback(_) => EventKind::BottomServoMotorFeedback,
        }
    }

    fn body(&self) -> (u8, [f32; 3]) {
        match self {
            Self::RightSteppingMotorAlert(a) | Self::LeftSteppingMotorAlert(a) => {
                (a.code, [a.position, 0.0, 0.0])
            }
            Self::RightSteppingMotorFeedback(f) | Self::LeftSteppingMotorFeedback(f) => {
                let mut flags = f.direction.bits() << DIRECTION_SHIFT;
                if f.locked {
                    flags |= LOCKED_BIT;
                }
                (flags, [f.angular_speed, f.total_angle, 0.0])
            }
            Self::DistanceSensorResult(d) => (0, [d.distance_mm, 0.0, 0.0]),
            Self::LineTracerResult(l) => (l.detected, [l.left, l.right, 0.0]),
            Self::NineAxisSensorResult(n) => (n.group.bits(), [n.x, n.y, n.z]),
            Self::UpperServoMotorFeedback(s) | Self::BottomServoMotorFeedback(s) => {
                (0, [s.angle, s.speed, 0.0])
            }
        }
    }
}

/// Decode an event packet.
///
/// Reads the kind id, then hands the remaining bytes to that kind's decoder, which
/// checks the payload length before extracting fields.
pub fn decode_event(src: &[u8]) -> Result<EventPacket> {
    let (&kind_id, mut payload) = src.split_first().ok_or(CodecError::LengthMismatch {
        kind: "event",
        expected: PACKET_LENGTH,
        actual: 0,
    })?;
    let kind = EventKind::from_id(kind_id).ok_or(CodecError::UnknownEventKind(kind_id))?;

    if payload.len() != kind.payload_len() {
        return Err(CodecError::LengthMismatch {
            kind: kind.name(),
            expected: kind.payload_len(),
            actual: payload.len(),
        });
    }

    (kind.decoder())(kind, &mut payload)
}

/// Encode an event packet, as a controller would.
///
/// Wire format:
/// ```text
/// ┌──────────┬──────────┬───────────┬───────────┬───────────┐
/// │ Kind     │ Flags    │ Slot 0    │ Slot 1    │ Slot 2    │
/// │ (1B)     │ (1B)     │ (f32 LE)  │ (f32 LE)  │ (f32 LE)  │
/// └──────────┴──────────┴───────────┴───────────┴───────────┘
/// ```
pub fn encode_event(event: &EventPacket, dst: &mut BytesMut) {
    let (flags, slots) = event.body();
    dst.reserve(PACKET_LENGTH);
    dst.put_u8(event.kind().id());
    dst.put_u8(flags);
    for slot in slots {
        dst.put_f32_le(slot);
    }
}

fn read_slots(buf: &mut &[u8]) -> [f32; 3] {
    [buf.get_f32_le(), buf.get_f32_le(), buf.get_f32_le()]
}

fn decode_motor_alert(kind: EventKind, buf: &mut &[u8]) -> Result<EventPacket> {
    let code = buf.get_u8();
    let [position, _, _] = read_slots(buf);
    let alert = MotorAlert { code, position };
    Ok(match kind {
        EventKind::RightSteppingMotorAlert => EventPacket::RightSteppingMotorAlert(alert),
        _ => EventPacket::LeftSteppingMotorAlert(alert),
    })
}

fn decode_motor_feedback(kind: EventKind, buf: &mut &[u8]) -> Result<EventPacket> {
    let flags = buf.get_u8();
    let direction = RotationDirection::from_bits((flags >> DIRECTION_SHIFT) & DIRECTION_MASK)
        .ok_or(CodecError::InvalidFlags {
            kind: kind.name(),
            flags,
        })?;
    let [angular_speed, total_angle, _] = read_slots(buf);
    let feedback = MotorFeedback {
        locked: flags & LOCKED_BIT != 0,
        direction,
        angular_speed,
        total_angle,
    };
    Ok(match kind {
        EventKind::RightSteppingMotorFeedback => EventPacket::RightSteppingMotorFeedback(feedback),
        _ => EventPacket::LeftSteppingMotorFeedback(feedback),
    })
}

fn decode_distance(_kind: EventKind, buf: &mut &[u8]) -> Result<EventPacket> {
    buf.advance(1);
    let [distance_mm, _, _] = read_slots(buf);
    Ok(EventPacket::DistanceSensorResult(DistanceReading {
        distance_mm,
    }))
}

fn decode_line_tracer(_kind: EventKind, buf: &mut &[u8]) -> Result<EventPacket> {
    let detected = buf.get_u8();
    let [left, right, _] = read_slots(buf);
    Ok(EventPacket::LineTracerResult(LineTracerReading {
        detected,
        left,
        right,
    }))
}

fn decode_nine_axis(kind: EventKind, buf: &mut &[u8]) -> Result<EventPacket> {
    let flags = buf.get_u8();
    let group = AxisGroup::from_bits(flags).ok_or(CodecError::InvalidFlags {
        kind: kind.name(),
        flags,
    })?;
    let [x, y, z] = read_slots(buf);
    Ok(EventPacket::NineAxisSensorResult(NineAxisReading {
        group,
        x,
        y,
        z,
    }))
}

fn decode_servo_feedback(kind: EventKind, buf: &mut &[u8]) -> Result<EventPacket> {
    buf.advance(1);
    let [angle, speed, _] = read_slots(buf);
    let feedback = ServoFeedback { angle, speed };
    Ok(match kind {
        EventKind::UpperServoMotorFeedback => EventPacket::UpperServoMotorFeedback(feedback),
        _ => EventPacket::BottomServoMotorFeedback(feedback),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(event: &EventPacket) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_event(event, &mut buf);
        buf
    }

    #[test]
    fn every_event_kind_roundtrips() {
        let events = [
            EventPacket::RightSteppingMotorAlert(MotorAlert {
                code: 3,
                position: 12.5,
            }),
            EventPacket::RightSteppingMotorFeedback(MotorFeedback {
                locked: false,
                direction: RotationDirection::RightForward,
                angular_speed: 180.0,
                total_angle: 720.0,
            }),
            EventPacket::LeftSteppingMotorAlert(MotorAlert {
                code: 1,
                position: -4.0,
            }),
            EventPacket::LeftSteppingMotorFeedback(MotorFeedback {
                locked: true,
                direction: RotationDirection::Locked,
                angular_speed: 0.0,
                total_angle: 90.0,
            }),
            EventPacket::DistanceSensorResult(DistanceReading { distance_mm: 312.0 }),
            EventPacket::LineTracerResult(LineTracerReading {
                detected: 0b101,
                left: 0.25,
                right: 0.75,
            }),
            EventPacket::NineAxisSensorResult(NineAxisReading {
                group: AxisGroup::AngularVelocity,
                x: 0.5,
                y: -0.5,
                z: 9.81,
            }),
            EventPacket::UpperServoMotorFeedback(ServoFeedback {
                angle: 30.0,
                speed: 15.0,
            }),
            EventPacket::BottomServoMotorFeedback(ServoFeedback {
                angle: -30.0,
                speed: 5.0,
            }),
        ];

        for event in events {
            let wire = encoded(&event);
            assert_eq!(wire.len(), PACKET_LENGTH);
            assert_eq!(decode_event(&wire).unwrap(), event);
        }
    }

    #[test]
    fn distance_wire_layout() {
        let wire = encoded(&EventPacket::DistanceSensorResult(DistanceReading {
            distance_mm: 250.0,
        }));
        assert_eq!(wire[0], 0x15);
        assert_eq!(&wire[2..6], &250.0f32.to_le_bytes());
        assert!(wire[6..].iter().all(|&b| b == 0));
    }

    #[test]
    fn kind_lookup_covers_closed_set() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::from_id(kind.id()), Some(kind));
        }
        assert_eq!(EventKind::from_id(0x10), None);
        assert_eq!(EventKind::from_id(0x1a), None);
    }

    #[test]
    fn unknown_kind_rejected() {
        let mut wire = [0u8; PACKET_LENGTH];
        wire[0] = 0x42;
        assert_eq!(
            decode_event(&wire).unwrap_err(),
            CodecError::UnknownEventKind(0x42)
        );
    }

    #[test]
    fn short_payload_rejected_for_kind() {
        let wire = encoded(&EventPacket::LineTracerResult(LineTracerReading {
            detected: 1,
            left: 1.0,
            right: 2.0,
        }));
        let err = decode_event(&wire[..PACKET_LENGTH - 1]).unwrap_err();
        assert_eq!(
            err,
            CodecError::LengthMismatch {
                kind: "line-tracer",
                expected: PACKET_LENGTH - 1,
                actual: PACKET_LENGTH - 2,
            }
        );
    }

    #[test]
    fn empty_input_rejected() {
        assert!(matches!(
            decode_event(&[]).unwrap_err(),
            CodecError::LengthMismatch { actual: 0, .. }
        ));
    }

    #[test]
    fn invalid_axis_group_rejected() {
        let mut wire = encoded(&EventPacket::NineAxisSensorResult(NineAxisReading {
            group: AxisGroup::Acceleration,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }));
        wire[1] = 7;
        assert!(matches!(
            decode_event(&wire).unwrap_err(),
            CodecError::InvalidFlags { flags: 7, .. }
        ));
    }

    #[test]
    fn serializes_with_kind_tag() {
        let event = EventPacket::DistanceSensorResult(DistanceReading { distance_mm: 1.0 });
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(json["kind"], "distance-sensor-result");
        assert_eq!(json["data"]["distance_mm"], 1.0);
    }
}
