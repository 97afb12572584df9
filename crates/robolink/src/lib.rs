//! Host-side link layer for microcontroller-driven robots.
//!
//! robolink moves fixed-length command packets to a robot controller over a byte
//! stream, tracks which commands are still unacknowledged, honours the controller's
//! stop/resume flow control and dispatches decoded sensor events.
//!
//! # Crate Structure
//!
//! - [`transport`]: Byte-stream transports (TCP, serial device, in-memory pair)
//! - [`packet`]: Command/event codec and sub-frame classification
//! - [`link`]: Pending command table, send/receive loops and event dispatch

/// Re-export transport types.
pub mod transport {
    pub use robolink_transport::*;
}

/// Re-export packet codec types.
pub mod packet {
    pub use robolink_packet::*;
}

/// Re-export link layer types.
pub mod link {
    pub use robolink_link::*;
}
