//! Outbound commands and reply interpretation

use crate::{
    constants::{REPLY_ERR, REPLY_OK},
    error::{EslError, EslResult},
    protocol::{encode_command, Frame, FrameKind},
};
use std::fmt;

/// Reject user-supplied text containing CR or LF.
///
/// Commands are line-delimited; an embedded newline would let the text
/// smuggle a second command onto the socket.
pub(crate) fn validate_no_newlines(s: &str, context: &str) -> EslResult<()> {
    if s.contains('\n') || s.contains('\r') {
        return Err(EslError::invalid_argument(format!(
            "{} must not contain newlines",
            context
        )));
    }
    Ok(())
}

/// Reject empty text or text with whitespace, for single-word command arguments
/// such as conference names, member ids and call UUIDs.
pub(crate) fn validate_token(s: &str, context: &str) -> EslResult<()> {
    if s.is_empty() {
        return Err(EslError::invalid_argument(format!(
            "{} must not be empty",
            context
        )));
    }
    if s.chars()
        .any(char::is_whitespace)
    {
        return Err(EslError::invalid_argument(format!(
            "{} must not contain whitespace: {:?}",
            context, s
        )));
    }
    Ok(())
}

/// `+OK`/`-ERR` classification of a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ReplyStatus {
    /// Starts with `+OK`. For `command/reply`, an absent `Reply-Text` also counts.
    Ok,
    /// Starts with `-ERR`.
    Err,
    /// Neither marker.
    Other,
}

impl ReplyStatus {
    fn classify(text: &str) -> Self {
        if text.starts_with(REPLY_OK) {
            ReplyStatus::Ok
        } else if text.starts_with(REPLY_ERR) {
            ReplyStatus::Err
        } else {
            ReplyStatus::Other
        }
    }
}

/// Reply to one command: a `command/reply` or `api/response` frame.
#[derive(Debug, Clone, PartialEq)]
pub struct EslResponse {
    frame: Frame,
    status: ReplyStatus,
}

impl EslResponse {
    /// `command/reply` is judged by `Reply-Text`, `api/response` by its body.
    pub fn new(frame: Frame) -> Self {
        let status = match frame.kind() {
            FrameKind::ApiReply => ReplyStatus::classify(
                frame
                    .body_text()
                    .as_deref()
                    .unwrap_or("")
                    .trim_start(),
            ),
            _ => match frame.reply_text() {
                None | Some("") => ReplyStatus::Ok,
                Some(t) => ReplyStatus::classify(t),
            },
        };
        Self { frame, status }
    }

    pub fn is_success(&self) -> bool {
        self.status == ReplyStatus::Ok
    }

    pub fn reply_status(&self) -> ReplyStatus {
        self.status
    }

    /// Raw `Reply-Text` header value (e.g. `+OK accepted`).
    pub fn reply_text(&self) -> Option<&str> {
        self.frame
            .reply_text()
    }

    /// Body as owned text, empty if the reply has none.
    pub fn body_string(&self) -> String {
        self.frame
            .body_text()
            .map(|b| b.into_owned())
            .unwrap_or_default()
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Require a `+OK` `Reply-Text`.
    pub fn into_result(self) -> EslResult<Self> {
        match self.status {
            ReplyStatus::Ok => Ok(self),
            ReplyStatus::Err => Err(EslError::CommandFailed {
                reply_text: self
                    .reply_text()
                    .unwrap_or(REPLY_ERR)
                    .to_string(),
            }),
            ReplyStatus::Other => Err(EslError::UnexpectedReply {
                reply_text: self
                    .reply_text()
                    .unwrap_or("")
                    .to_string(),
            }),
        }
    }

    /// Check and strip the body's `+OK` marker, returning the payload.
    ///
    /// `-ERR` and unmarked bodies become domain errors carrying the whole
    /// trimmed body.
    ///
    /// ```
    /// # use conference_esl::{EslResponse, Frame};
    /// let frame = Frame::new(
    ///     vec![("Content-Type".into(), "api/response".into())],
    ///     Some(b"+OK 6f9c-uuid\n".to_vec()),
    /// );
    /// assert_eq!(EslResponse::new(frame).into_api_result().unwrap(), "6f9c-uuid");
    /// ```
    pub fn into_api_result(self) -> EslResult<String> {
        let body = self.body_string();
        let text = body.trim();
        match self.status {
            ReplyStatus::Ok => Ok(text[REPLY_OK.len()..]
                .trim()
                .to_string()),
            ReplyStatus::Err => Err(EslError::CommandFailed {
                reply_text: text.to_string(),
            }),
            ReplyStatus::Other => Err(EslError::UnexpectedReply {
                reply_text: text.to_string(),
            }),
        }
    }
}

/// Commands this client sends.
#[derive(Clone)]
pub(crate) enum EslCommand {
    /// Answer the auth challenge
    Auth { password: String },
    /// Run an API command synchronously
    Api { command: String },
    /// Subscribe to events
    Events { format: String, events: String },
    /// Unsubscribe from events
    NixEvent { events: String },
}

impl fmt::Debug for EslCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EslCommand::Auth { .. } => f
                .debug_struct("Auth")
                .field("password", &"[REDACTED]")
                .finish(),
            EslCommand::Api { command } => f
                .debug_struct("Api")
                .field("command", command)
                .finish(),
            EslCommand::Events { format, events } => f
                .debug_struct("Events")
                .field("format", format)
                .field("events", events)
                .finish(),
            EslCommand::NixEvent { events } => f
                .debug_struct("NixEvent")
                .field("events", events)
                .finish(),
        }
    }
}

impl EslCommand {
    /// Validate all user-supplied fields, then convert to wire format.
    pub(crate) fn to_wire_format(&self) -> EslResult<String> {
        match self {
            EslCommand::Auth { password } => {
                validate_no_newlines(password, "password")?;
                Ok(encode_command(&format!("auth {}", password)))
            }
            EslCommand::Api { command } => {
                validate_no_newlines(command, "api command")?;
                Ok(encode_command(&format!("api {}", command)))
            }
            EslCommand::Events { format, events } => {
                validate_no_newlines(format, "event format")?;
                validate_no_newlines(events, "event list")?;
                Ok(encode_command(&format!("event {} {}", format, events)))
            }
            EslCommand::NixEvent { events } => {
                validate_no_newlines(events, "nixevent list")?;
                Ok(encode_command(&format!("nixevent {}", events)))
            }
        }
    }

    /// Log line for this command with secrets removed.
    pub(crate) fn log_line(&self) -> String {
        match self {
            EslCommand::Auth { .. } => "auth [REDACTED]".to_string(),
            EslCommand::Api { command } => format!("api {}", command),
            EslCommand::Events { format, events } => format!("event {} {}", format, events),
            EslCommand::NixEvent { events } => format!("nixevent {}", events),
        }
    }
}
