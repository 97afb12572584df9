use robolink_packet::CorrelationId;
use robolink_transport::TransportError;

/// Errors that can occur in link operations.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Transport-level error; inside a running loop this means the connection is lost.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A command with this correlation id is already pending.
    #[error("correlation id {0} is already pending")]
    DuplicateCorrelationId(CorrelationId),

    /// Every four-digit correlation id is in use.
    #[error("no free correlation id ({0} commands pending)")]
    IdSpaceExhausted(usize),

    /// The link's loops are no longer running.
    #[error("link stopped")]
    Stopped,

    /// Failed to spawn a worker thread.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        source: std::io::Error,
    },

    /// A worker thread panicked.
    #[error("{0} thread panicked")]
    WorkerPanicked(&'static str),
}

impl LinkError {
    /// True when the error means the remote end went away.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, LinkError::Transport(TransportError::Closed))
            || matches!(
                self,
                LinkError::Transport(TransportError::Io(err))
                    if matches!(
                        err.kind(),
                        std::io::ErrorKind::ConnectionReset
                            | std::io::ErrorKind::ConnectionAborted
                            | std::io::ErrorKind::BrokenPipe
                            | std::io::ErrorKind::UnexpectedEof
                    )
            )
    }
}

pub type Result<T> = std::result::Result<T, LinkError>;
