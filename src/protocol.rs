//! Frame codec: header-block parsing, body extraction and event decoding

use crate::{
    buffer::FrameBuffer,
    constants::{
        CONTENT_TYPE_API_RESPONSE, CONTENT_TYPE_AUTH_REQUEST, CONTENT_TYPE_COMMAND_REPLY,
        CONTENT_TYPE_DISCONNECT_NOTICE, CONTENT_TYPE_TEXT_EVENT_JSON,
        CONTENT_TYPE_TEXT_EVENT_PLAIN, CONTENT_TYPE_TEXT_EVENT_XML, HEADER_CONTENT_LENGTH,
        HEADER_CONTENT_TYPE, HEADER_REPLY_TEXT, HEADER_TERMINATOR, LINE_TERMINATOR,
        MAX_MESSAGE_SIZE,
    },
    error::{EslError, EslResult},
    event::{EslEvent, EventFormat},
};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use std::borrow::Cow;
use tracing::trace;

/// Characters escaped when a header value is written back to the wire.
const HEADER_VALUE: &AsciiSet = &CONTROLS.add(b'%');

/// Frame classification, derived from the `Content-Type` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum FrameKind {
    /// `auth/request` sent by the switch right after accept
    AuthChallenge,
    /// `command/reply` to `auth`, `event`, `nixevent`, ...
    CommandReply,
    /// `api/response` carrying an `api` command's output in the body
    ApiReply,
    /// Asynchronous event in plain, JSON or XML encoding
    Event,
    /// `text/disconnect-notice`, the switch is about to close the socket
    Disconnect,
    /// Anything else, including a missing `Content-Type`
    Unknown,
}

impl FrameKind {
    /// Classify a `Content-Type` value.
    pub fn from_content_type(content_type: &str) -> Self {
        match content_type {
            CONTENT_TYPE_AUTH_REQUEST => FrameKind::AuthChallenge,
            CONTENT_TYPE_COMMAND_REPLY => FrameKind::CommandReply,
            CONTENT_TYPE_API_RESPONSE => FrameKind::ApiReply,
            CONTENT_TYPE_TEXT_EVENT_PLAIN
            | CONTENT_TYPE_TEXT_EVENT_JSON
            | CONTENT_TYPE_TEXT_EVENT_XML => FrameKind::Event,
            CONTENT_TYPE_DISCONNECT_NOTICE => FrameKind::Disconnect,
            _ => FrameKind::Unknown,
        }
    }

    /// `true` for the two kinds that answer a command.
    pub fn is_reply(&self) -> bool {
        matches!(self, FrameKind::CommandReply | FrameKind::ApiReply)
    }
}

/// One header block plus its optional length-delimited body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    kind: FrameKind,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
}

impl Frame {
    /// Build a frame; the kind is derived from the `Content-Type` header.
    pub fn new(headers: Vec<(String, String)>, body: Option<Vec<u8>>) -> Self {
        let kind = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(HEADER_CONTENT_TYPE))
            .map(|(_, v)| FrameKind::from_content_type(v))
            .unwrap_or(FrameKind::Unknown);
        Self {
            kind,
            headers,
            body: body.filter(|b| !b.is_empty()),
        }
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    /// Header lookup, case-insensitive on the name. First occurrence wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Headers in wire order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(HEADER_CONTENT_TYPE)
    }

    pub fn reply_text(&self) -> Option<&str> {
        self.header(HEADER_REPLY_TEXT)
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body
            .as_deref()
    }

    /// Body as text, with invalid UTF-8 replaced.
    pub fn body_text(&self) -> Option<Cow<'_, str>> {
        self.body
            .as_deref()
            .map(String::from_utf8_lossy)
    }

    pub(crate) fn into_body(self) -> Option<Vec<u8>> {
        self.body
    }

    /// Serialize to wire format. `Content-Length` is recomputed from the body.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = String::new();
        for (key, value) in &self.headers {
            if key.eq_ignore_ascii_case(HEADER_CONTENT_LENGTH) {
                continue;
            }
            out.push_str(key);
            out.push_str(": ");
            out.extend(utf8_percent_encode(value, HEADER_VALUE));
            out.push_str(LINE_TERMINATOR);
        }
        if let Some(body) = &self.body {
            out.push_str(HEADER_CONTENT_LENGTH);
            out.push_str(": ");
            out.push_str(&body.len().to_string());
            out.push_str(LINE_TERMINATOR);
        }
        out.push_str(LINE_TERMINATOR);

        let mut bytes = out.into_bytes();
        if let Some(body) = &self.body {
            bytes.extend_from_slice(body);
        }
        bytes
    }
}

/// Terminate a command line for the wire. The text is sent as-is.
pub fn encode_command(text: &str) -> String {
    let mut wire = String::with_capacity(text.len() + HEADER_TERMINATOR.len());
    wire.push_str(text);
    wire.push_str(HEADER_TERMINATOR);
    wire
}

/// Parser state for handling incomplete frames
#[derive(Debug)]
enum ParseState {
    WaitingForHeaders,
    WaitingForBody {
        headers: Vec<(String, String)>,
        body_length: usize,
    },
}

/// Incremental frame parser fed from the socket
pub struct FrameParser {
    buffer: FrameBuffer,
    state: ParseState,
}

impl FrameParser {
    pub fn new() -> Self {
        Self {
            buffer: FrameBuffer::new(),
            state: ParseState::WaitingForHeaders,
        }
    }

    /// Append bytes read from the socket.
    pub fn add_data(&mut self, data: &[u8]) -> EslResult<()> {
        self.buffer
            .extend_from_slice(data);
        self.buffer
            .check_size_limits()
    }

    /// Try to take one complete frame from the buffer.
    pub fn parse_frame(&mut self) -> EslResult<Option<Frame>> {
        loop {
            match &mut self.state {
                ParseState::WaitingForHeaders => {
                    let Some(header_bytes) = self
                        .buffer
                        .extract_until_pattern(HEADER_TERMINATOR.as_bytes())
                    else {
                        return Ok(None);
                    };
                    self.buffer
                        .compact();

                    let header_text = String::from_utf8(header_bytes)
                        .map_err(|_| EslError::protocol_error("Invalid UTF-8 in headers"))?;
                    let headers = parse_headers(&header_text);

                    let body_length = match headers
                        .iter()
                        .find(|(k, _)| k.eq_ignore_ascii_case(HEADER_CONTENT_LENGTH))
                    {
                        Some((_, raw)) => parse_content_length(raw)?,
                        None => 0,
                    };

                    if body_length == 0 {
                        return Ok(Some(Frame::new(headers, None)));
                    }
                    self.state = ParseState::WaitingForBody {
                        headers,
                        body_length,
                    };
                }
                ParseState::WaitingForBody {
                    headers,
                    body_length,
                } => {
                    let Some(body) = self
                        .buffer
                        .extract_bytes(*body_length)
                    else {
                        return Ok(None);
                    };
                    self.buffer
                        .compact();
                    let headers = std::mem::take(headers);
                    self.state = ParseState::WaitingForHeaders;
                    return Ok(Some(Frame::new(headers, Some(body))));
                }
            }
        }
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_content_length(raw: &str) -> EslResult<usize> {
    let length: usize = raw
        .trim()
        .parse()
        .map_err(|_| EslError::InvalidHeader {
            header: format!("{}: {}", HEADER_CONTENT_LENGTH, raw),
        })?;
    if length > MAX_MESSAGE_SIZE {
        return Err(EslError::protocol_error(format!(
            "Frame too large: Content-Length {} exceeds limit {}",
            length, MAX_MESSAGE_SIZE
        )));
    }
    Ok(length)
}

/// Percent-decode a header value, keeping the raw text if it is not valid UTF-8 once decoded.
fn decode_value(raw: &str) -> String {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

/// Parse `Name: value` lines. Lines without a colon or with an empty name are skipped.
fn parse_headers(text: &str) -> Vec<(String, String)> {
    let mut headers = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.split_once(':') {
            Some((key, raw_value)) if !key.trim().is_empty() => {
                headers.push((
                    key.trim()
                        .to_string(),
                    decode_value(raw_value.trim()),
                ));
            }
            _ => trace!("[RECV] Skipping malformed header line: {:?}", line),
        }
    }
    headers
}

/// Decode an event frame into an [`EslEvent`] according to its `Content-Type`.
pub(crate) fn decode_event(frame: Frame) -> EslResult<EslEvent> {
    if frame.kind() != FrameKind::Event {
        return Err(EslError::protocol_error("Not an event frame"));
    }
    let format = frame
        .content_type()
        .map(EventFormat::from_content_type)
        .unwrap_or(EventFormat::Plain);
    let body = frame
        .into_body()
        .ok_or_else(|| EslError::protocol_error("Event frame missing body"))?;
    let body = String::from_utf8(body)
        .map_err(|_| EslError::protocol_error("Invalid UTF-8 in event body"))?;

    match format {
        EventFormat::Plain => Ok(decode_plain_event(&body)),
        EventFormat::Json => decode_json_event(&body),
        EventFormat::Xml => decode_xml_event(&body),
    }
}

/// Plain events carry their own header block inside the body; anything after
/// that block's blank line is the event's inner body.
fn decode_plain_event(body: &str) -> EslEvent {
    let (header_section, inner_body) = match body.split_once(HEADER_TERMINATOR) {
        Some((headers, rest)) => (headers, Some(rest)),
        None => (body, None),
    };

    let mut event = EslEvent::new();
    for (key, value) in parse_headers(header_section) {
        event.set_header(key, value);
    }
    if let Some(ib) = inner_body.filter(|ib| !ib.is_empty()) {
        event.set_body(ib.to_string());
    }
    event
}

fn decode_json_event(body: &str) -> EslResult<EslEvent> {
    let json_value: serde_json::Value = serde_json::from_str(body)?;
    let obj = json_value
        .as_object()
        .ok_or_else(|| EslError::protocol_error("JSON event is not an object"))?;

    let mut event = EslEvent::new();
    for (key, value) in obj {
        if key == "_body" {
            if let Some(text) = value.as_str() {
                event.set_body(text.to_string());
            }
            continue;
        }
        let value_str = match value {
            serde_json::Value::String(s) => s.clone(),
            _ => value.to_string(),
        };
        event.set_header(key.clone(), value_str);
    }
    Ok(event)
}

/// XML events look like `<event><headers><Name>value</Name>...</headers><body>...</body></event>`.
fn decode_xml_event(body: &str) -> EslResult<EslEvent> {
    use quick_xml::events::Event as XmlEvent;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(body);
    let mut event = EslEvent::new();
    let mut in_headers = false;
    let mut in_body = false;
    let mut current_tag: Option<String> = None;

    loop {
        match reader.read_event()? {
            XmlEvent::Start(ref e) => {
                let tag = String::from_utf8_lossy(
                    e.name()
                        .as_ref(),
                )
                .to_string();
                match tag.as_str() {
                    "headers" => in_headers = true,
                    "body" => in_body = true,
                    _ if in_headers => current_tag = Some(tag),
                    _ => {}
                }
            }
            XmlEvent::End(ref e) => {
                match e
                    .name()
                    .as_ref()
                {
                    b"headers" => in_headers = false,
                    b"body" => in_body = false,
                    _ if in_headers => current_tag = None,
                    _ => {}
                }
            }
            XmlEvent::Text(ref e) => {
                let text = e
                    .unescape()?
                    .to_string();
                if in_body {
                    event.set_body(text);
                } else if let Some(tag) = &current_tag {
                    event.set_header(tag.clone(), text);
                }
            }
            XmlEvent::Eof => break,
            _ => {}
        }
    }
    Ok(event)
}
