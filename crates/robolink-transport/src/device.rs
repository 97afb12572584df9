use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::tcp::DEFAULT_READ_CHUNK_SIZE;
use crate::traits::{FrameSink, FrameSource, Transport};

/// Line speed used when none is configured.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Bound on a single blocking write to the line.
const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Serial-line transport, e.g. `/dev/ttyACM0` or `COM3`.
///
/// The port is opened raw at 8N1 without flow control, so `\r` and `\n` reach the
/// reader untranslated.
pub struct DeviceTransport {
    path: PathBuf,
    baud_rate: u32,
    read_chunk_size: usize,
    port: Option<Box<dyn SerialPort>>,
}

impl DeviceTransport {
    /// Prepare a transport that opens `path` on `init()`.
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            port: None,
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Override the maximum bytes returned by one `read_frame` call.
    pub fn with_read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size.max(1);
        self
    }

    /// The device path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

impl Transport for DeviceTransport {
    type Source = DeviceSource;
    type Sink = DeviceSink;

    fn init(&mut self) -> Result<()> {
        let port = serialport::new(self.path.to_string_lossy(), self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(WRITE_TIMEOUT)
            .open()
            .map_err(|err| TransportError::Open {
                path: self.path.clone(),
                source: err.into(),
            })?;
        debug!(path = ?self.path, baud_rate = self.baud_rate, "opened serial device");
        self.port = Some(port);
        Ok(())
    }

    fn split(self) -> Result<(DeviceSource, DeviceSink)> {
        let port = self.port.ok_or(TransportError::NotInitialized)?;
        split_port(port, self.read_chunk_size)
    }

    fn transport_name(&self) -> &'static str {
        "device"
    }
}

fn split_port(port: Box<dyn SerialPort>, chunk_size: usize) -> Result<(DeviceSource, DeviceSink)> {
    let reader = port.try_clone().map_err(std::io::Error::from)?;
    Ok((
        DeviceSource {
            port: reader,
            chunk: vec![0u8; chunk_size.max(1)],
            ready: None,
        },
        DeviceSink { port },
    ))
}

/// Read half of a [`DeviceTransport`].
///
/// The readiness wait is a read bounded by the port timeout; bytes it picks up are
/// held for the next `read_frame`.
pub struct DeviceSource {
    port: Box<dyn SerialPort>,
    chunk: Vec<u8>,
    ready: Option<Bytes>,
}

impl DeviceSource {
    /// One read; `None` when the port timeout passed with no data.
    fn read_chunk(&mut self) -> Result<Option<Bytes>> {
        loop {
            match self.port.read(&mut self.chunk) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => return Ok(Some(Bytes::copy_from_slice(&self.chunk[..n]))),
                Err(err) if err.kind() == ErrorKind::TimedOut => return Ok(None),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }
}

impl FrameSource for DeviceSource {
    fn is_read_ready(&mut self, timeout: Duration) -> Result<bool> {
        if self.ready.is_some() {
            return Ok(true);
        }
        self.port
            .set_timeout(timeout)
            .map_err(std::io::Error::from)?;
        self.ready = self.read_chunk()?;
        Ok(self.ready.is_some())
    }

    fn read_frame(&mut self) -> Result<Bytes> {
        if let Some(bytes) = self.ready.take() {
            return Ok(bytes);
        }
        loop {
            if let Some(bytes) = self.read_chunk()? {
                return Ok(bytes);
            }
        }
    }
}

/// Write half of a [`DeviceTransport`].
pub struct DeviceSink {
    port: Box<dyn SerialPort>,
}

impl FrameSink for DeviceSink {
    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.port.write_all(frame)?;
        self.port.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_device_fails_to_open() {
        let path = std::env::temp_dir()
            .join(format!("robolink-missing-{}", std::process::id()))
            .join("ttyNONE");
        let mut transport = DeviceTransport::open(&path).with_baud_rate(9600);
        let err = transport.init().unwrap_err();
        assert!(matches!(err, TransportError::Open { .. }));
        assert_eq!(transport.path(), path.as_path());
        assert_eq!(transport.baud_rate(), 9600);
    }

    #[test]
    fn split_before_init_is_rejected() {
        let transport = DeviceTransport::open("/dev/ttyNONE");
        assert!(matches!(
            transport.split().err(),
            Some(TransportError::NotInitialized)
        ));
    }

    #[cfg(unix)]
    mod pty {
        use std::time::Instant;

        use serialport::TTYPort;

        use super::*;

        fn host_and_controller(chunk_size: usize) -> (DeviceSource, DeviceSink, TTYPort) {
            let (controller, host) = TTYPort::pair().expect("pty pair should open");
            let (source, sink) = split_port(Box::new(host), chunk_size).unwrap();
            (source, sink, controller)
        }

        fn read_at_least(source: &mut DeviceSource, len: usize) -> Vec<u8> {
            let deadline = Instant::now() + Duration::from_secs(2);
            let mut got = Vec::new();
            while got.len() < len && Instant::now() < deadline {
                if source.is_read_ready(Duration::from_millis(50)).unwrap() {
                    got.extend_from_slice(&source.read_frame().unwrap());
                }
            }
            got
        }

        #[test]
        fn crlf_and_binary_bytes_arrive_untranslated() {
            let (mut source, _sink, mut controller) = host_and_controller(64);
            let sent = b"Stop\r\n\x0d\x01\x0a\x7f4821\r\n";
            controller.write_all(sent).unwrap();

            assert_eq!(read_at_least(&mut source, sent.len()), sent.to_vec());
        }

        #[test]
        fn idle_line_is_not_ready() {
            let (mut source, _sink, _controller) = host_and_controller(64);
            assert!(!source.is_read_ready(Duration::from_millis(20)).unwrap());
        }

        #[test]
        fn chunk_size_limits_single_read() {
            let (mut source, _sink, mut controller) = host_and_controller(4);
            controller.write_all(b"0123456789").unwrap();

            assert!(source.is_read_ready(Duration::from_secs(1)).unwrap());
            assert!(source.read_frame().unwrap().len() <= 4);
        }

        #[test]
        fn frames_reach_the_controller_verbatim() {
            let (_source, mut sink, mut controller) = host_and_controller(64);
            let frame = [0x01, 0x0d, 0x0a, 0x00, 0xff];
            sink.write_frame(&frame).unwrap();

            controller.set_timeout(Duration::from_secs(2)).unwrap();
            let mut got = [0u8; 5];
            controller.read_exact(&mut got).unwrap();
            assert_eq!(got, frame);
        }
    }
}
