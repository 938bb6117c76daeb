use std::fmt;
use thiserror::Error;

/// Why a call context stopped an operation before it finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interruption {
    /// The cancellation token fired
    Cancelled,
    /// The context deadline passed
    DeadlineExceeded { duration_ms: u64 },
}

impl fmt::Display for Interruption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => f.write_str("operation cancelled"),
            Self::DeadlineExceeded { duration_ms } => {
                write!(f, "deadline exceeded after {}ms", duration_ms)
            }
        }
    }
}

impl std::error::Error for Interruption {}

/// Reason a pipe dial did not produce a stream
#[derive(Error, Debug)]
pub enum DialFailure {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Interrupted(#[from] Interruption),
}

impl DialFailure {
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted(_))
    }
}

/// Error types for pipe-probe
#[derive(Error, Debug)]
pub enum PipeProbeError {
    #[error("Usage error: {message}")]
    Usage { message: String },

    #[error("Connection error: could not dial pipe {path}: {reason}")]
    Connection { path: String, reason: DialFailure },

    #[error("Request build error: {message}")]
    RequestBuild { message: String },

    #[error("Execution error: {message}")]
    Execution { message: String },

    #[error("Read error: {message}")]
    Read { message: String },

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("JSON serialization error: {message}")]
    JsonSerialize { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

/// Tag identifying the failure class of a [`PipeProbeError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Usage,
    Connection,
    RequestBuild,
    Execution,
    Read,
    Decode,
    JsonSerialize,
    Configuration,
}

impl PipeProbeError {
    pub fn usage<S: Into<String>>(message: S) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }

    pub fn connection<P: Into<String>, R: Into<DialFailure>>(path: P, reason: R) -> Self {
        Self::Connection {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn request_build<S: Into<String>>(message: S) -> Self {
        Self::RequestBuild {
            message: message.into(),
        }
    }

    pub fn execution<S: Into<String>>(message: S) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }

    pub fn read<S: Into<String>>(message: S) -> Self {
        Self::Read {
            message: message.into(),
        }
    }

    pub fn json_serialize<S: Into<String>>(message: S) -> Self {
        Self::JsonSerialize {
            message: message.into(),
        }
    }

    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Failure class of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Usage { .. } => ErrorKind::Usage,
            Self::Connection { .. } => ErrorKind::Connection,
            Self::RequestBuild { .. } => ErrorKind::RequestBuild,
            Self::Execution { .. } => ErrorKind::Execution,
            Self::Read { .. } => ErrorKind::Read,
            Self::Decode(_) => ErrorKind::Decode,
            Self::JsonSerialize { .. } => ErrorKind::JsonSerialize,
            Self::Configuration { .. } => ErrorKind::Configuration,
        }
    }

    /// Check if the error came from a cancelled or expired dial
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Connection { reason, .. } if reason.is_interrupted())
    }

    /// Pipe path the error refers to, if any
    pub fn pipe_path(&self) -> Option<&str> {
        match self {
            Self::Connection { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Result type for pipe-probe operations
pub type Result<T> = std::result::Result<T, PipeProbeError>;
