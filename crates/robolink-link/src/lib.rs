//! Link layer between a control host and a robot controller.
//!
//! Owns everything between "a caller wants this command sent" and "a subsystem gets
//! the decoded sensor event": the pending command table, the flow-control gate, the
//! sending and receiving loops, and the event dispatch registry.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use robolink_link::{EventDispatcher, Link};
//! use robolink_packet::{Command, EventKind};
//! use robolink_transport::TcpTransport;
//!
//! # fn main() -> robolink_link::Result<()> {
//! let dispatcher = Arc::new(EventDispatcher::new());
//! dispatcher.on(EventKind::DistanceSensorResult, |event| println!("{event:?}"));
//!
//! let link = Link::start(TcpTransport::connect("192.168.4.1:5000"), dispatcher)?;
//! link.handle().send(Command::MeasureDistance)?;
//! link.join()
//! # }
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod indicator;
pub mod link;
pub mod pending;
pub mod state;

mod receiver;
mod sender;

pub use config::LinkConfig;
pub use dispatch::{EventDispatcher, EventListener};
pub use error::{LinkError, Result};
pub use indicator::{ActivityIndicator, NoIndicator};
pub use link::{Link, LinkHandle};
pub use pending::{Outgoing, PendingTable};
pub use state::ConnectionState;
