//! Conference and call control over the FreeSWITCH event socket
//!
//! This crate drives a FreeSWITCH switch through its event-socket protocol:
//! conference listing and member control, call origination, hangup and
//! transfer, plus delivery of asynchronous switch events.
//!
//! # Architecture
//!
//! One TCP connection carries both command replies and events. A single
//! background reader classifies every inbound frame by `Content-Type` and
//! either completes the one in-flight command or hands the event to the
//! dispatcher. Around it:
//!
//! - [`EslClient`] (Clone + Send) sends commands from any task; at most one
//!   command is on the wire at a time.
//! - A supervisor task reconnects with exponential backoff after any
//!   transport failure, re-authenticates and replays event subscriptions.
//!   While it works, commands fail fast with [`EslError::NotConnected`].
//! - Event handlers each run on their own task with their own queue, so a
//!   slow or panicking handler never stalls the connection.
//!
//! # Example
//!
//! ```rust,no_run
//! use conference_esl::{EslClient, EslConfig, EslError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), EslError> {
//!     let client = EslClient::connect(EslConfig::new("10.0.0.5", 8021, "ClueCon")).await?;
//!
//!     client.register_event_handler(|event| async move {
//!         if event.is_conference_event() {
//!             println!("{:?} {:?}", event.conference_name(), event.action());
//!         }
//!     });
//!     client.subscribe_events(&["CUSTOM", "conference::maintenance"]).await?;
//!
//!     for conference in client.list_conferences().await? {
//!         for member in client.list_conference_members(&conference.name).await? {
//!             if !member.muted {
//!                 client.mute_member(&conference.name, &member.id.to_string()).await?;
//!             }
//!         }
//!     }
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration from the environment
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), conference_esl::EslError> {
//! // ESL_HOST, ESL_PORT, ESL_PASSWORD, ESL_COMMAND_TIMEOUT_MS, ...
//! let config = conference_esl::EslConfig::from_env()?;
//! let client = conference_esl::EslClient::connect(config).await?;
//! # Ok(())
//! # }
//! ```

#[macro_use]
mod macros;

pub mod call;
pub mod conference;
pub mod config;
pub mod connection;
pub mod constants;
pub mod error;
pub mod event;
pub mod headers;

pub(crate) mod buffer;
pub(crate) mod command;
pub(crate) mod dispatcher;
pub(crate) mod protocol;
pub(crate) mod supervisor;

pub use command::{EslResponse, ReplyStatus};
pub use conference::{ConferenceInfo, ConferenceMember, MemberAction, ParseMemberActionError};
pub use config::EslConfig;
pub use connection::{ConnectionStatus, DisconnectReason, EslClient};
pub use constants::DEFAULT_ESL_PORT;
pub use dispatcher::{EslEventStream, HandlerId};
pub use error::{ErrorKind, EslError, EslResult};
pub use event::{EslEvent, EventFormat, ParseEventFormatError};
pub use headers::{EventHeader, ParseEventHeaderError};
pub use protocol::{encode_command, Frame, FrameKind, FrameParser};
