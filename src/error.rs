use std::array::TryFromSliceError;
use std::io;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("ERR - Io: {0}")]
    Io(#[from] io::Error),

    #[error("ERR - Network: {0}")]
    Network(#[from] reqwest::Error),

    #[error("ERR - Remote: HTTP {0}")]
    RemoteStatus(u16),

    #[error("ERR - Remote: {0}")]
    RemoteMessage(String),

    #[error("ERR - Protocol: {0}")]
    Protocol(String),

    #[error("ERR - Format: {0}")]
    Format(String),

    #[error("ERR - No suitable reference found (tried HEAD, refs/heads/main, refs/heads/master)")]
    NoSuitableReference,

    #[error("ERR - Object not found: {0}")]
    ObjectNotFound(String),

    #[error("ERR - Other: {0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    /// True for both faces of a server-side failure: a bad HTTP status or a
    /// message on the side-band error channel.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::RemoteStatus(_) | Self::RemoteMessage(_))
    }
}

impl From<&str> for Error {
    fn from(value: &str) -> Self {
        Self::Other(anyhow::anyhow!("{value}"))
    }
}

impl From<TryFromSliceError> for Error {
    fn from(value: TryFromSliceError) -> Self {
        Self::Format(value.to_string())
    }
}
