//! Byte-stream transports for the robolink link layer.
//!
//! The microcontroller side of a robot is reached over either a network socket or a
//! serial line. Neither offers framing, acknowledgment or backpressure; this crate only
//! moves raw reads and writes. Everything else builds on the [`Transport`] contract:
//! - TCP sockets, dialing out or accepting a single peer
//! - Serial lines, opened raw through `serialport`
//! - An in-memory pair for tests and simulators

pub mod device;
pub mod error;
pub mod memory;
pub mod tcp;
pub mod traits;

pub use device::{DeviceTransport, DEFAULT_BAUD_RATE};
pub use error::{Result, TransportError};
pub use memory::{MemoryTransport, RemoteEnd};
pub use tcp::{TcpConfig, TcpTransport};
pub use traits::{FrameSink, FrameSource, Transport};
