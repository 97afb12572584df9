//! Packet codec for the robolink wire protocol.
//!
//! The robot controller exchanges fixed-length binary packets and a handful of short
//! text control lines over one byte stream:
//! - Outbound commands: kind id, bit-packed flags, two little-endian `f32` values and
//!   the 4-digit correlation id
//! - Inbound events: kind id, flags and three little-endian `f32` slots, optionally
//!   followed by the correlation id of the command they answer
//! - Text lines: handshake marker, size-error marker, `Stop`, 4-digit acknowledgments
//!
//! Physical reads carry `\r\n`-delimited sub-frames, which [`classify`] sorts into
//! exactly one [`SubFrame`] variant each.

pub mod classify;
pub mod command;
pub mod error;
pub mod event;
pub mod id;
pub mod wire;

pub use classify::{classify, split_subframes, SubFrame};
pub use command::{
    decode_command, encode_command, Command, CommandKind, DataType, MotorCommand,
    OutputPacket, RotationDirection, ServoCommand,
};
pub use error::{CodecError, Result};
pub use event::{
    decode_event, encode_event, AxisGroup, DistanceReading, EventKind, EventPacket,
    LineTracerReading, MotorAlert, MotorFeedback, NineAxisReading, ServoFeedback,
};
pub use id::CorrelationId;
pub use wire::{
    DELIMITER, HANDSHAKE_MARKER, OUTPUT_PACKET_LENGTH, PACKET_LENGTH, SIZE_ERROR_MARKER,
    STOP_COMMAND,
};
