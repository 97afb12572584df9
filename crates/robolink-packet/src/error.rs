/// Errors that can occur while encoding or decoding packets.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The command kind id is not part of the protocol.
    #[error("unknown command kind 0x{0:02x}")]
    UnknownCommandKind(u8),

    /// The event kind id is not part of the protocol.
    #[error("unknown event kind 0x{0:02x}")]
    UnknownEventKind(u8),

    /// The packet does not have the length its kind requires.
    #[error("{kind}: expected {expected} bytes, got {actual}")]
    LengthMismatch {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The flags byte holds a value the kind does not define.
    #[error("{kind}: invalid flags 0x{flags:02x}")]
    InvalidFlags { kind: &'static str, flags: u8 },

    /// A correlation id is out of range or not made of decimal digits.
    #[error("invalid correlation id: {0}")]
    InvalidCorrelationId(String),
}

pub type Result<T> = std::result::Result<T, CodecError>;
