use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Serialize;

use crate::error::{CodecError, Result};
use crate::id::CorrelationId;
use crate::wire::{CORRELATION_ID_LENGTH, OUTPUT_PACKET_LENGTH};

const LOCKED_BIT: u8 = 0b0000_0001;
const DIRECTION_SHIFT: u8 = 1;
const DIRECTION_MASK: u8 = 0b11;
const DATA_TYPE_SHIFT: u8 = 3;
const DATA_TYPE_MASK: u8 = 0b11;

/// Outbound command kind ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandKind {
    RightSteppingMotor = 0x01,
    LeftSteppingMotor = 0x02,
    BothSteppingMotor = 0x03,
    MeasureDistance = 0x04,
    MeasureLineTracer = 0x05,
    MeasureNineAxis = 0x06,
    UpperServoMotor = 0x07,
    BottomServoMotor = 0x08,
}

impl CommandKind {
    /// Look up a kind by its wire id.
    pub fn from_id(id: u8) -> Option<Self> {
        Some(match id {
            0x01 => Self::RightSteppingMotor,
            0x02 => Self::LeftSteppingMotor,
            0x03 => Self::BothSteppingMotor,
            0x04 => Self::MeasureDistance,
            0x05 => Self::MeasureLineTracer,
            0x06 => Self::MeasureNineAxis,
            0x07 => Self::UpperServoMotor,
            0x08 => Self::BottomServoMotor,
            _ => return None,
        })
    }

    /// Wire id.
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Human-readable name for logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::RightSteppingMotor => "right-motor",
            Self::LeftSteppingMotor => "left-motor",
            Self::BothSteppingMotor => "both-motor",
            Self::MeasureDistance => "measure-distance",
            Self::MeasureLineTracer => "measure-line-tracer",
            Self::MeasureNineAxis => "measure-nine-axis",
            Self::UpperServoMotor => "upper-servo",
            Self::BottomServoMotor => "bottom-servo",
        }
    }
}

/// Rotation direction of a stepping motor, relative to the motor shaft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RotationDirection {
    /// Clockwise; forward for the right wheel.
    RightForward,
    /// Counter-clockwise; backward for the right wheel.
    LeftReturn,
    /// Hold position.
    Locked,
}

impl RotationDirection {
    pub(crate) fn bits(self) -> u8 {
        match self {
            Self::RightForward => 0,
            Self::LeftReturn => 1,
            Self::Locked => 2,
        }
    }

    pub(crate) fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::RightForward),
            1 => Some(Self::LeftReturn),
            2 => Some(Self::Locked),
            _ => None,
        }
    }
}

/// How the controller interprets a motor command's two values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataType {
    /// Angular speed [deg/s] and total angle [deg].
    Type1,
    /// Angular speed [deg/s] and duration [s].
    Type2,
    /// Keep rotating at the given angular speed.
    Type3,
    /// Stop; values are ignored.
    Type4,
}

impl DataType {
    fn bits(self) -> u8 {
        match self {
            Self::Type1 => 0,
            Self::Type2 => 1,
            Self::Type3 => 2,
            Self::Type4 => 3,
        }
    }

    fn from_bits(bits: u8) -> Self {
        match bits & DATA_TYPE_MASK {
            0 => Self::Type1,
            1 => Self::Type2,
            2 => Self::Type3,
            _ => Self::Type4,
        }
    }
}

/// Stepping-motor command body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorCommand {
    pub locked: bool,
    pub direction: RotationDirection,
    pub data_type: DataType,
    pub values: [f32; 2],
}

impl MotorCommand {
    /// Stop command: unlocked, values zeroed.
    pub fn stop() -> Self {
        Self {
            locked: false,
            direction: RotationDirection::LeftReturn,
            data_type: DataType::Type4,
            values: [0.0, 0.0],
        }
    }

    /// Hold the motor in place.
    pub fn lock() -> Self {
        Self {
            locked: true,
            direction: RotationDirection::Locked,
            data_type: DataType::Type4,
            values: [0.0, 0.0],
        }
    }

    /// Rotate `angle` degrees at `speed` deg/s.
    pub fn rotate(direction: RotationDirection, speed: f32, angle: f32) -> Self {
        Self {
            locked: false,
            direction,
            data_type: DataType::Type1,
            values: [speed, angle],
        }
    }

    /// Rotate continuously at `speed` deg/s.
    pub fn run(direction: RotationDirection, speed: f32) -> Self {
        Self {
            locked: false,
            direction,
            data_type: DataType::Type3,
            values: [speed, 0.0],
        }
    }

    fn flags(&self) -> u8 {
        let mut flags = 0u8;
        if self.locked {
            flags |= LOCKED_BIT;
        }
        flags |= self.direction.bits() << DIRECTION_SHIFT;
        flags |= self.data_type.bits() << DATA_TYPE_SHIFT;
        flags
    }

    fn from_parts(kind: CommandKind, flags: u8, values: [f32; 2]) -> Result<Self> {
        let direction = RotationDirection::from_bits((flags >> DIRECTION_SHIFT) & DIRECTION_MASK)
            .ok_or(CodecError::InvalidFlags {
                kind: kind.name(),
                flags,
            })?;
        Ok(Self {
            locked: flags & LOCKED_BIT != 0,
            direction,
            data_type: DataType::from_bits(flags >> DATA_TYPE_SHIFT),
            values,
        })
    }
}

/// Servo-motor command body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServoCommand {
    /// Target angle [deg].
    pub angle: f32,
    /// Angular speed [deg/s].
    pub speed: f32,
}

/// A typed outbound command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    RightSteppingMotor(MotorCommand),
    LeftSteppingMotor(MotorCommand),
    BothSteppingMotor(MotorCommand),
    MeasureDistance,
    MeasureLineTracer,
    MeasureNineAxis,
    UpperServoMotor(ServoCommand),
    BottomServoMotor(ServoCommand),
}

impl Command {
    /// The command's kind.
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::RightSteppingMotor(_) => CommandKind::RightSteppingMotor,
            Self::LeftSteppingMotor(_) => CommandKind::LeftSteppingMotor,
            Self::BothSteppingMotor(_) => CommandKind::BothSteppingMotor,
            Self::MeasureDistance => CommandKind::MeasureDistance,
            Self::MeasureLineTracer => CommandKind::MeasureLineTracer,
            Self::MeasureNineAxis => CommandKind::MeasureNineAxis,
            Self::UpperServoMotor(_) => CommandKind::UpperServoMotor,
            Self::BottomServoMotor(_) => CommandKind::BottomServoMotor,
        }
    }

    fn body(&self) -> (u8, [f32; 2]) {
        match self {
            Self::RightSteppingMotor(m) | Self::LeftSteppingMotor(m) | Self::BothSteppingMotor(m) => {
                (m.flags(), m.values)
            }
            Self::MeasureDistance | Self::MeasureLineTracer | Self::MeasureNineAxis => {
                (0, [0.0, 0.0])
            }
            Self::UpperServoMotor(s) | Self::BottomServoMotor(s) => (0, [s.angle, s.speed]),
        }
    }
}

/// An outbound command tagged with its correlation id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputPacket {
    pub correlation_id: CorrelationId,
    pub command: Command,
}

impl OutputPacket {
    /// Tag a command with an explicit correlation id.
    pub fn new(correlation_id: CorrelationId, command: Command) -> Self {
        Self {
            correlation_id,
            command,
        }
    }

    /// Tag a command with a freshly drawn random id.
    pub fn with_random_id(command: Command) -> Self {
        Self::new(CorrelationId::random(&mut rand::thread_rng()), command)
    }

    /// Encode into a standalone buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(OUTPUT_PACKET_LENGTH);
        encode_command(self, &mut buf);
        buf.freeze()
    }
}

/// Encode a command packet into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────┬──────────┬─────────────┬─────────────┬──────────────────┐
/// │ Kind     │ Flags    │ Value 0     │ Value 1     │ Correlation id   │
/// │ (1B)     │ (1B)     │ (f32 LE)    │ (f32 LE)    │ (4B, digit/byte) │
/// └──────────┴──────────┴─────────────┴─────────────┴──────────────────┘
/// ```
/// Flags: bit 0 locked, bits 1-2 direction, bits 3-4 data type.
pub fn encode_command(packet: &OutputPacket, dst: &mut BytesMut) {
    let (flags, values) = packet.command.body();
    dst.reserve(OUTPUT_PACKET_LENGTH);
    dst.put_u8(packet.command.kind().id());
    dst.put_u8(flags);
    dst.put_f32_le(values[0]);
    dst.put_f32_le(values[1]);
    dst.put_slice(&packet.correlation_id.to_digit_bytes());
}

/// Decode a command packet, as a controller would.
pub fn decode_command(src: &[u8]) -> Result<OutputPacket> {
    if src.len() != OUTPUT_PACKET_LENGTH {
        return Err(CodecError::LengthMismatch {
            kind: "command",
            expected: OUTPUT_PACKET_LENGTH,
            actual: src.len(),
        });
    }

    let mut buf = src;
    let kind_id = buf.get_u8();
    let kind = CommandKind::from_id(kind_id).ok_or(CodecError::UnknownCommandKind(kind_id))?;
    let flags = buf.get_u8();
    let values = [buf.get_f32_le(), buf.get_f32_le()];
    let correlation_id = CorrelationId::from_digit_bytes(&buf[..CORRELATION_ID_LENGTH])?;

    let command = match kind {
        CommandKind::RightSteppingMotor => {
            Command::RightSteppingMotor(MotorCommand::from_parts(kind, flags, values)?)
        }
        CommandKind::LeftSteppingMotor => {
            Command::LeftSteppingMotor(MotorCommand::from_parts(kind, flags, values)?)
        }
        CommandKind::BothSteppingMotor => {
            Command::BothSteppingMotor(MotorCommand::from_parts(kind, flags, values)?)
        }
        CommandKind::MeasureDistance => Command::MeasureDistance,
        CommandKind::MeasureLineTracer => Command::MeasureLineTracer,
        CommandKind::MeasureNineAxis => Command::MeasureNineAxis,
        CommandKind::UpperServoMotor => Command::UpperServoMotor(ServoCommand {
            angle: values[0],
            speed: values[1],
        }),
        CommandKind::BottomServoMotor => Command::BottomServoMotor(ServoCommand {
            angle: values[0],
            speed: values[1],
        }),
    };

    Ok(OutputPacket::new(correlation_id, command))
}
