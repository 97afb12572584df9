//! Wire-level constants shared by both directions.

/// Length of an inbound event packet: kind (1) + flags (1) + three `f32` slots (12).
pub const PACKET_LENGTH: usize = 14;

/// Length of an outbound command packet: kind (1) + flags (1) + two `f32` (8) + id (4).
pub const OUTPUT_PACKET_LENGTH: usize = 14;

/// Length of the correlation id, both as ASCII text and as a digit suffix.
pub const CORRELATION_ID_LENGTH: usize = 4;

/// Separates logical sub-frames within one physical read.
pub const DELIMITER: &[u8] = b"\r\n";

/// Sent once by the controller when it is ready to exchange packets.
pub const HANDSHAKE_MARKER: &str = "Transmission Start";

/// Sent by the controller when a command packet had the wrong size.
pub const SIZE_ERROR_MARKER: &str = "Invalid data size";

/// Asks the host to stop transmitting until the next acknowledgment.
pub const STOP_COMMAND: &str = "Stop";
