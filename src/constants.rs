//! Protocol constants and configuration defaults

/// Default FreeSWITCH event-socket port for inbound connections
pub const DEFAULT_ESL_PORT: u16 = 8021;

/// Default event-socket password shipped with FreeSWITCH
pub const DEFAULT_ESL_PASSWORD: &str = "ClueCon";

/// Socket buffer size for reading from TCP stream (64KB) - standard TCP receive window
pub const SOCKET_BUF_SIZE: usize = 65536;

/// Buffer allocation size (64KB) - used for both initial allocation and growth increments
pub const BUF_CHUNK: usize = 64 * 1024;

/// Maximum single frame body size (8MB) - validates Content-Length header
pub const MAX_MESSAGE_SIZE: usize = 8 * 1024 * 1024;

/// Maximum total buffer size (16MB) - should hold 2 max frames plus overhead.
/// Exceeding it means the peer is not speaking the protocol.
pub const MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Protocol frame terminators
pub const HEADER_TERMINATOR: &str = "\n\n";
pub const LINE_TERMINATOR: &str = "\n";

/// Content-Type header values
pub const CONTENT_TYPE_AUTH_REQUEST: &str = "auth/request";
pub const CONTENT_TYPE_COMMAND_REPLY: &str = "command/reply";
pub const CONTENT_TYPE_API_RESPONSE: &str = "api/response";
pub const CONTENT_TYPE_TEXT_EVENT_PLAIN: &str = "text/event-plain";
pub const CONTENT_TYPE_TEXT_EVENT_JSON: &str = "text/event-json";
pub const CONTENT_TYPE_TEXT_EVENT_XML: &str = "text/event-xml";
pub const CONTENT_TYPE_DISCONNECT_NOTICE: &str = "text/disconnect-notice";

/// Protocol framing header: frame classification.
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
/// Protocol framing header: body length.
pub const HEADER_CONTENT_LENGTH: &str = "Content-Length";
/// Protocol framing header: command reply status.
pub const HEADER_REPLY_TEXT: &str = "Reply-Text";
/// Protocol framing header: disconnect notice disposition.
pub const HEADER_CONTENT_DISPOSITION: &str = "Content-Disposition";

/// Reply markers
pub const REPLY_OK: &str = "+OK";
pub const REPLY_ERR: &str = "-ERR";

/// TCP connect and handshake timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Command reply timeout in milliseconds
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 5000;

/// First reconnect delay in milliseconds
pub const DEFAULT_RECONNECT_FLOOR_MS: u64 = 500;

/// Reconnect delay cap in milliseconds
pub const DEFAULT_RECONNECT_CEILING_MS: u64 = 30_000;

/// Per-handler event queue capacity before events are dropped
pub const MAX_EVENT_QUEUE_SIZE: usize = 1000;

/// Hangup cause used when the caller does not supply one
pub const DEFAULT_HANGUP_CAUSE: &str = "NORMAL_CLEARING";
