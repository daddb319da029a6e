use std::io;

use crate::osc::OscCodecError;

/// Result alias that carries the custom [`CaptureError`] type.
pub type Result<T> = std::result::Result<T, CaptureError>;

/// Common error type for the capture crate.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// The transport listener could not bind its socket. Typical causes are a
    /// port that is already in use or a privileged port without permission.
    #[error("failed to bind OSC listener on {address}:{port}: {source}")]
    Bind {
        address: String,
        port: u16,
        #[source]
        source: io::Error,
    },
    /// An OSC packet could not be decoded or encoded.
    #[error(transparent)]
    Osc(#[from] OscCodecError),
    /// Configuration could not be parsed or is inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] io::Error),
    /// Free-form error message.
    #[error("{0}")]
    Message(String),
}

impl CaptureError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    /// Returns `true` when a bind failed because the address is taken.
    pub fn is_addr_in_use(&self) -> bool {
        matches!(self, Self::Bind { source, .. } if source.kind() == io::ErrorKind::AddrInUse)
    }
}

impl From<&str> for CaptureError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for CaptureError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

impl From<serde_json::Error> for CaptureError {
    fn from(value: serde_json::Error) -> Self {
        Self::Config(value.to_string())
    }
}
