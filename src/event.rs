//! Decoded switch events

use crate::headers::EventHeader;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Event encodings the switch can deliver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum EventFormat {
    /// Plain text format (default)
    #[default]
    Plain,
    /// JSON format
    Json,
    /// XML format
    Xml,
}

impl EventFormat {
    /// Determine event format from a Content-Type header value.
    pub fn from_content_type(ct: &str) -> Self {
        match ct {
            "text/event-json" => Self::Json,
            "text/event-xml" => Self::Xml,
            _ => Self::Plain,
        }
    }
}

impl fmt::Display for EventFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventFormat::Plain => write!(f, "plain"),
            EventFormat::Json => write!(f, "json"),
            EventFormat::Xml => write!(f, "xml"),
        }
    }
}

impl FromStr for EventFormat {
    type Err = ParseEventFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(Self::Plain),
            "json" => Ok(Self::Json),
            "xml" => Ok(Self::Xml),
            _ => Err(ParseEventFormatError(s.to_string())),
        }
    }
}

/// Error returned when parsing an invalid event format string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEventFormatError(pub String);

impl fmt::Display for ParseEventFormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event format: {}", self.0)
    }
}

impl std::error::Error for ParseEventFormatError {}

/// One asynchronous notification from the switch.
///
/// Header values are already percent-decoded. Conference events arrive as
/// `CUSTOM` with subclass `conference::maintenance`; the `Action` header says
/// what happened (`add-member`, `del-member`, `mute-member`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EslEvent {
    headers: HashMap<String, String>,
    body: Option<String>,
}

impl EslEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a header by name. Accepts `&str` or [`EventHeader`].
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(name.as_ref())
            .map(|s| s.as_str())
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers
            .insert(name.into(), value.into());
    }

    pub fn body(&self) -> Option<&str> {
        self.body
            .as_deref()
    }

    pub fn set_body(&mut self, body: String) {
        self.body = Some(body);
    }

    /// `Event-Name`, e.g. `CHANNEL_ANSWER` or `CUSTOM`.
    pub fn event_name(&self) -> Option<&str> {
        self.header(EventHeader::EventName)
    }

    pub fn event_subclass(&self) -> Option<&str> {
        self.header(EventHeader::EventSubclass)
    }

    /// Call UUID, falling back to `Caller-Unique-ID`.
    pub fn unique_id(&self) -> Option<&str> {
        self.header(EventHeader::UniqueId)
            .or_else(|| self.header(EventHeader::CallerUniqueId))
    }

    pub fn conference_name(&self) -> Option<&str> {
        self.header(EventHeader::ConferenceName)
    }

    pub fn member_id(&self) -> Option<&str> {
        self.header(EventHeader::MemberId)
    }

    /// Conference `Action` header (`add-member`, `del-member`, `start-talking`, ...).
    pub fn action(&self) -> Option<&str> {
        self.header(EventHeader::Action)
    }

    pub fn hangup_cause(&self) -> Option<&str> {
        self.header(EventHeader::HangupCause)
    }

    /// Channel variable, looked up as `variable_<name>`.
    pub fn variable(&self, name: &str) -> Option<&str> {
        self.header(format!("variable_{}", name))
    }

    /// `true` when this is a `conference::maintenance` event.
    pub fn is_conference_event(&self) -> bool {
        self.event_subclass() == Some("conference::maintenance")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_format_from_str() {
        assert_eq!("plain".parse::<EventFormat>(), Ok(EventFormat::Plain));
        assert_eq!("json".parse::<EventFormat>(), Ok(EventFormat::Json));
        assert_eq!("xml".parse::<EventFormat>(), Ok(EventFormat::Xml));
        assert!("yaml"
            .parse::<EventFormat>()
            .is_err());
    }

    #[test]
    fn test_event_format_from_content_type() {
        assert_eq!(
            EventFormat::from_content_type("text/event-json"),
            EventFormat::Json
        );
        assert_eq!(
            EventFormat::from_content_type("text/event-plain"),
            EventFormat::Plain
        );
    }

    #[test]
    fn test_event_format_deserialize_lowercase() {
        let fmt: EventFormat = serde_json::from_str("\"json\"").unwrap();
        assert_eq!(fmt, EventFormat::Json);
    }

    #[test]
    fn test_conference_accessors() {
        let mut event = EslEvent::new();
        event.set_header("Event-Name", "CUSTOM");
        event.set_header("Event-Subclass", "conference::maintenance");
        event.set_header("Conference-Name", "room1");
        event.set_header("Member-ID", "42");
        event.set_header("Action", "mute-member");
        event.set_header("Caller-Unique-ID", "call-1");
        event.set_header("variable_sip_from_user", "1000");

        assert!(event.is_conference_event());
        assert_eq!(event.conference_name(), Some("room1"));
        assert_eq!(event.member_id(), Some("42"));
        assert_eq!(event.action(), Some("mute-member"));
        assert_eq!(event.unique_id(), Some("call-1"));
        assert_eq!(event.variable("sip_from_user"), Some("1000"));
        assert_eq!(event.header(EventHeader::EventName), Some("CUSTOM"));
    }
}
