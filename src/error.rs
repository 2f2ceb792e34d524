//! Error types for the event-socket client

use thiserror::Error;

/// Result alias used throughout the crate.
pub type EslResult<T> = Result<T, EslError>;

/// Coarse classification of an [`EslError`].
///
/// Callers that only need to decide between "retry later", "fix the
/// request" and "the switch said no" should match on this instead of the
/// individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Dial, read or write failure. Triggers reconnection.
    Transport,
    /// The switch rejected the password.
    Authentication,
    /// Malformed frame or an unexpected frame kind.
    Protocol,
    /// No reply within the command timeout. The outcome on the switch is unknown.
    Timeout,
    /// Well-formed rejection from the switch (`-ERR ...` or a non-`+OK` reply).
    Domain,
    /// The session is down and the supervisor is reconnecting.
    NotConnected,
    /// Caller input rejected before anything was sent.
    InvalidArgument,
}

/// Errors returned by the client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EslError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("not connected to the switch, reconnecting")]
    NotConnected,

    #[error("authentication failed: {reason}")]
    AuthFailed { reason: String },

    #[error("protocol error: {message}")]
    ProtocolError { message: String },

    #[error("invalid header: {header}")]
    InvalidHeader { header: String },

    #[error("command timed out after {timeout_ms}ms, outcome unknown")]
    Timeout { timeout_ms: u64 },

    #[error("command failed: {reply_text}")]
    CommandFailed { reply_text: String },

    #[error("unexpected reply: {reply_text}")]
    UnexpectedReply { reply_text: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("JSON event decode error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("XML event decode error: {0}")]
    XmlError(#[from] quick_xml::Error),
}

impl EslError {
    pub(crate) fn protocol_error(message: impl Into<String>) -> Self {
        EslError::ProtocolError {
            message: message.into(),
        }
    }

    pub(crate) fn auth_failed(reason: impl Into<String>) -> Self {
        EslError::AuthFailed {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        EslError::InvalidArgument(message.into())
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EslError::Io(_) | EslError::ConnectionClosed => ErrorKind::Transport,
            EslError::NotConnected => ErrorKind::NotConnected,
            EslError::AuthFailed { .. } => ErrorKind::Authentication,
            EslError::ProtocolError { .. }
            | EslError::InvalidHeader { .. }
            | EslError::JsonError(_)
            | EslError::XmlError(_) => ErrorKind::Protocol,
            EslError::Timeout { .. } => ErrorKind::Timeout,
            EslError::CommandFailed { .. } | EslError::UnexpectedReply { .. } => ErrorKind::Domain,
            EslError::InvalidArgument(_) => ErrorKind::InvalidArgument,
        }
    }

    /// Raw reply text for domain errors, kept for diagnostics.
    pub fn reply_text(&self) -> Option<&str> {
        match self {
            EslError::CommandFailed { reply_text } | EslError::UnexpectedReply { reply_text } => {
                Some(reply_text)
            }
            _ => None,
        }
    }

    /// `true` for errors caused by the connection rather than the request.
    pub fn is_transport(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transport | ErrorKind::NotConnected)
    }
}
