//! Typed event header names for conference and call events.

/// Error returned when parsing an unrecognized event header name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEventHeaderError(pub String);

impl std::fmt::Display for ParseEventHeaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown event header: {}", self.0)
    }
}

impl std::error::Error for ParseEventHeaderError {}

define_wire_enum! {
    error_type: ParseEventHeaderError,
    /// Header names carried by the events a conference service cares about.
    ///
    /// These are headers of the decoded event (not framing headers like
    /// `Content-Type`). Use with [`EslEvent::header()`](crate::EslEvent::header).
    pub enum EventHeader {
        EventName => "Event-Name",
        EventSubclass => "Event-Subclass",
        UniqueId => "Unique-ID",
        CallerUniqueId => "Caller-Unique-ID",
        JobUuid => "Job-UUID",
        ChannelCallState => "Channel-Call-State",
        AnswerState => "Answer-State",
        HangupCause => "Hangup-Cause",
        CallerCallerIdName => "Caller-Caller-ID-Name",
        CallerCallerIdNumber => "Caller-Caller-ID-Number",
        CallerDestinationNumber => "Caller-Destination-Number",
        ConferenceName => "Conference-Name",
        ConferenceSize => "Conference-Size",
        ConferenceProfileName => "Conference-Profile-Name",
        ConferenceUniqueId => "Conference-Unique-ID",
        MemberId => "Member-ID",
        MemberType => "Member-Type",
        Action => "Action",
        Speak => "Speak",
        Hear => "Hear",
        Talking => "Talking",
        Path => "Path",
        CoreUuid => "Core-UUID",
    }
}
