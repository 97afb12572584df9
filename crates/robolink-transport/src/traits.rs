use std::time::Duration;

use bytes::Bytes;

use crate::error::Result;

/// A byte-stream connection to the robot controller.
///
/// The host process constructs the transport; the link layer only calls
/// [`init`](Transport::init) and then [`split`](Transport::split)s it so the
/// receiving and sending loops can each own one half.
pub trait Transport {
    /// Read half handed to the receiving loop.
    type Source: FrameSource + 'static;
    /// Write half handed to the sending loop.
    type Sink: FrameSink + 'static;

    /// Establish the underlying connection (dial, accept, open).
    fn init(&mut self) -> Result<()>;

    /// Split an initialized transport into independently owned halves.
    fn split(self) -> Result<(Self::Source, Self::Sink)>;

    /// Transport name for diagnostics.
    fn transport_name(&self) -> &'static str;
}

/// Read half of a transport.
pub trait FrameSource: Send {
    /// Wait up to `timeout` for inbound bytes.
    ///
    /// Returns `Ok(true)` as soon as a read would not block and `Ok(false)` when the
    /// timeout elapses first. End-of-stream counts as ready so the following
    /// [`read_frame`](FrameSource::read_frame) can report it.
    fn is_read_ready(&mut self, timeout: Duration) -> Result<bool>;

    /// Read whatever the transport delivered as one physical frame.
    ///
    /// A single read may carry several delimited logical frames, or part of one.
    /// Returns `Err(TransportError::Closed)` on end-of-stream.
    fn read_frame(&mut self) -> Result<Bytes>;
}

/// Write half of a transport.
pub trait FrameSink: Send {
    /// Write one encoded frame in full.
    fn write_frame(&mut self, frame: &[u8]) -> Result<()>;
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn is_read_ready(&mut self, timeout: Duration) -> Result<bool> {
        (**self).is_read_ready(timeout)
    }

    fn read_frame(&mut self) -> Result<Bytes> {
        (**self).read_frame()
    }
}

impl<T: FrameSink + ?Sized> FrameSink for Box<T> {
    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        (**self).write_frame(frame)
    }
}
