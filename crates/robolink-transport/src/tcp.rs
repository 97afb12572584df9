use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::{FrameSink, FrameSource, Transport};

/// Default size of a single socket read.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 1024;

/// Shortest readiness wait accepted by the socket layer (a zero timeout is rejected).
const MIN_POLL_TIMEOUT: Duration = Duration::from_millis(1);

/// Configuration for TCP transports.
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// Maximum bytes returned by one `read_frame` call.
    pub read_chunk_size: usize,
    /// Disable Nagle's algorithm so short command frames go out immediately.
    pub nodelay: bool,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<Duration>,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            nodelay: true,
            write_timeout: None,
        }
    }
}

enum Endpoint {
    Connect(String),
    Listen(TcpListener),
}

/// TCP transport to a robot controller.
///
/// Either dials the controller ([`connect`](TcpTransport::connect)) or waits for the
/// controller to dial in ([`listen`](TcpTransport::listen)). Only one peer is served.
pub struct TcpTransport {
    endpoint: Endpoint,
    stream: Option<TcpStream>,
    config: TcpConfig,
}

impl TcpTransport {
    /// Prepare a transport that connects to `addr` on `init()`.
    pub fn connect(addr: impl Into<String>) -> Self {
        Self::connect_with_config(addr, TcpConfig::default())
    }

    /// Prepare a connecting transport with explicit configuration.
    pub fn connect_with_config(addr: impl Into<String>, config: TcpConfig) -> Self {
        Self {
            endpoint: Endpoint::Connect(addr.into()),
            stream: None,
            config,
        }
    }

    /// Bind `addr` now and accept the controller's connection on `init()`.
    pub fn listen(addr: &str) -> Result<Self> {
        Self::listen_with_config(addr, TcpConfig::default())
    }

    /// Bind with explicit configuration.
    pub fn listen_with_config(addr: &str, config: TcpConfig) -> Result<Self> {
        let listener = TcpListener::bind(addr).map_err(|e| TransportError::Bind {
            addr: addr.to_string(),
            source: e,
        })?;
        info!(addr, "listening for robot controller");
        Ok(Self {
            endpoint: Endpoint::Listen(listener),
            stream: None,
            config,
        })
    }

    /// Local address of the bound listener, if this transport listens.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.endpoint {
            Endpoint::Listen(listener) => listener.local_addr().ok(),
            Endpoint::Connect(_) => None,
        }
    }

    /// Address of the connected peer once initialized.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.as_ref().and_then(|s| s.peer_addr().ok())
    }
}

impl Transport for TcpTransport {
    type Source = TcpSource;
    type Sink = TcpSink;

    fn init(&mut self) -> Result<()> {
        let stream = match &self.endpoint {
            Endpoint::Connect(addr) => {
                let stream = TcpStream::connect(addr.as_str()).map_err(|e| {
                    TransportError::Connect {
                        addr: addr.clone(),
                        source: e,
                    }
                })?;
                debug!(addr = addr.as_str(), "connected to robot controller");
                stream
            }
            Endpoint::Listen(listener) => {
                let (stream, peer) = listener.accept().map_err(TransportError::Accept)?;
                debug!(%peer, "accepted robot controller connection");
                stream
            }
        };

        stream.set_nodelay(self.config.nodelay)?;
        stream.set_write_timeout(self.config.write_timeout)?;
        self.stream = Some(stream);
        Ok(())
    }

    fn split(self) -> Result<(TcpSource, TcpSink)> {
        let stream = self.stream.ok_or(TransportError::NotInitialized)?;
        let reader = stream.try_clone()?;
        Ok((
            TcpSource {
                stream: reader,
                chunk: vec![0u8; self.config.read_chunk_size.max(1)],
            },
            TcpSink { stream },
        ))
    }

    fn transport_name(&self) -> &'static str {
        "tcp"
    }
}

/// Read half of a [`TcpTransport`].
pub struct TcpSource {
    stream: TcpStream,
    chunk: Vec<u8>,
}

impl FrameSource for TcpSource {
    fn is_read_ready(&mut self, timeout: Duration) -> Result<bool> {
        self.stream
            .set_read_timeout(Some(timeout.max(MIN_POLL_TIMEOUT)))?;
        let mut probe = [0u8; 1];
        match self.stream.peek(&mut probe) {
            Ok(_) => Ok(true),
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) =>
            {
                Ok(false)
            }
            Err(err) => Err(TransportError::Io(err)),
        }
    }

    fn read_frame(&mut self) -> Result<Bytes> {
        loop {
            match self.stream.read(&mut self.chunk) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => return Ok(Bytes::copy_from_slice(&self.chunk[..n])),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }
}

/// Write half of a [`TcpTransport`].
pub struct TcpSink {
    stream: TcpStream,
}

impl FrameSink for TcpSink {
    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.stream.write_all(frame)?;
        self.stream.flush()?;
        Ok(())
    }
}
