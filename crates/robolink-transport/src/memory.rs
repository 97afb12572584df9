use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

use bytes::Bytes;

use crate::error::{Result, TransportError};
use crate::traits::{FrameSink, FrameSource, Transport};

/// In-process transport backed by channels.
///
/// Each chunk pushed by the [`RemoteEnd`] is delivered as exactly one physical read,
/// which makes it suitable for driving the link layer deterministically in tests or
/// from a simulated controller.
pub struct MemoryTransport {
    inbound: Receiver<Bytes>,
    outbound: Sender<Bytes>,
    initialized: bool,
}

/// The controller side of a [`MemoryTransport`].
pub struct RemoteEnd {
    to_host: Option<Sender<Bytes>>,
    from_host: Receiver<Bytes>,
}

impl MemoryTransport {
    /// Create a connected transport and its controller end.
    pub fn pair() -> (MemoryTransport, RemoteEnd) {
        let (to_host, inbound) = mpsc::channel();
        let (outbound, from_host) = mpsc::channel();
        (
            MemoryTransport {
                inbound,
                outbound,
                initialized: false,
            },
            RemoteEnd {
                to_host: Some(to_host),
                from_host,
            },
        )
    }
}

impl Transport for MemoryTransport {
    type Source = MemorySource;
    type Sink = MemorySink;

    fn init(&mut self) -> Result<()> {
        self.initialized = true;
        Ok(())
    }

    fn split(self) -> Result<(MemorySource, MemorySink)> {
        if !self.initialized {
            return Err(TransportError::NotInitialized);
        }
        Ok((
            MemorySource {
                inbound: self.inbound,
                peeked: None,
            },
            MemorySink {
                outbound: self.outbound,
            },
        ))
    }

    fn transport_name(&self) -> &'static str {
        "memory"
    }
}

/// Read half of a [`MemoryTransport`].
pub struct MemorySource {
    inbound: Receiver<Bytes>,
    peeked: Option<Bytes>,
}

impl FrameSource for MemorySource {
    fn is_read_ready(&mut self, timeout: Duration) -> Result<bool> {
        if self.peeked.is_some() {
            return Ok(true);
        }
        match self.inbound.recv_timeout(timeout) {
            Ok(chunk) => {
                self.peeked = Some(chunk);
                Ok(true)
            }
            Err(RecvTimeoutError::Timeout) => Ok(false),
            Err(RecvTimeoutError::Disconnected) => Ok(true),
        }
    }

    fn read_frame(&mut self) -> Result<Bytes> {
        if let Some(chunk) = self.peeked.take() {
            return Ok(chunk);
        }
        self.inbound.recv().map_err(|_| TransportError::Closed)
    }
}

/// Write half of a [`MemoryTransport`].
pub struct MemorySink {
    outbound: Sender<Bytes>,
}

impl FrameSink for MemorySink {
    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.outbound
            .send(Bytes::copy_from_slice(frame))
            .map_err(|_| TransportError::Closed)
    }
}

impl RemoteEnd {
    /// Deliver one physical read to the host.
    pub fn send(&self, chunk: impl Into<Bytes>) -> Result<()> {
        let to_host = self.to_host.as_ref().ok_or(TransportError::Closed)?;
        to_host
            .send(chunk.into())
            .map_err(|_| TransportError::Closed)
    }

    /// Wait up to `timeout` for the next frame written by the host.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Bytes> {
        self.from_host.recv_timeout(timeout).ok()
    }

    /// Take the next frame written by the host without waiting.
    pub fn try_recv(&self) -> Option<Bytes> {
        match self.from_host.try_recv() {
            Ok(frame) => Some(frame),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Close the controller-to-host direction; the host sees end-of-stream.
    pub fn close(&mut self) {
        self.to_host = None;
    }
}
