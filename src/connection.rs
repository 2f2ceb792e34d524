//! Session management: handshake, reader loop and command executor

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::{
    command::{EslCommand, EslResponse},
    config::EslConfig,
    constants::{HEADER_CONTENT_DISPOSITION, SOCKET_BUF_SIZE},
    dispatcher::{EslEventStream, EventDispatcher, HandlerId},
    error::{EslError, EslResult},
    event::{EslEvent, EventFormat},
    protocol::{decode_event, Frame, FrameKind, FrameParser},
    supervisor::{self, ReconnectBackoff, TransportFailure},
};

/// Upper bound on one socket read while the reader checks liveness.
const LIVENESS_POLL_MS: u64 = 2000;

/// Connection status for the client
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionStatus {
    /// Authenticated, subscriptions restored, commands accepted.
    Connected,
    /// The supervisor is dialing again. Commands fail with `NotConnected`.
    Reconnecting,
    /// Session ended. Followed by `Reconnecting` unless the client was closed.
    Disconnected(DisconnectReason),
}

/// Reason for disconnection
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DisconnectReason {
    /// Server sent a text/disconnect-notice with Content-Disposition: disconnect
    ServerNotice,
    /// Liveness timeout exceeded without any inbound traffic
    HeartbeatExpired,
    /// TCP I/O error (io::Error is not Clone, so we store the message)
    IoError(String),
    /// Unparseable input; framing cannot be recovered
    ProtocolError(String),
    /// A command went unanswered; later replies could no longer be matched
    CommandTimeout,
    /// Clean EOF on the TCP connection
    ConnectionClosed,
    /// Client called close() or dropped the last handle
    ClientRequested,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisconnectReason::ServerNotice => write!(f, "server sent disconnect notice"),
            DisconnectReason::HeartbeatExpired => write!(f, "liveness timeout expired"),
            DisconnectReason::IoError(msg) => write!(f, "I/O error: {}", msg),
            DisconnectReason::ProtocolError(msg) => write!(f, "protocol error: {}", msg),
            DisconnectReason::CommandTimeout => write!(f, "command reply timed out"),
            DisconnectReason::ConnectionClosed => write!(f, "connection closed"),
            DisconnectReason::ClientRequested => write!(f, "client requested disconnect"),
        }
    }
}

/// Establish a TCP connection with a timeout.
async fn tcp_connect_with_timeout(host: &str, port: u16, timeout_ms: u64) -> EslResult<TcpStream> {
    let tcp_result = timeout(
        Duration::from_millis(timeout_ms),
        TcpStream::connect((host, port)),
    )
    .await;

    match tcp_result {
        Ok(Ok(s)) => {
            debug!("[CONNECT] TCP connection established");
            Ok(s)
        }
        Ok(Err(e)) => {
            warn!("[CONNECT] TCP connect failed: {}", e);
            Err(EslError::Io(e))
        }
        Err(_) => {
            warn!("[CONNECT] TCP connect timed out after {}ms", timeout_ms);
            Err(EslError::Timeout { timeout_ms })
        }
    }
}

/// Read a single frame during the handshake, before the reader task owns the socket.
async fn recv_frame(
    stream: &mut TcpStream,
    parser: &mut FrameParser,
    read_buffer: &mut [u8],
    timeout_ms: u64,
) -> EslResult<Frame> {
    loop {
        if let Some(frame) = parser.parse_frame()? {
            trace!("[RECV] Parsed frame from buffer: {:?}", frame.kind());
            return Ok(frame);
        }

        let read_result = timeout(
            Duration::from_millis(timeout_ms),
            stream.read(read_buffer),
        )
        .await;

        let bytes_read = match read_result {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(EslError::Io(e)),
            Err(_) => return Err(EslError::Timeout { timeout_ms }),
        };

        trace!("[RECV] Read {} bytes from socket", bytes_read);
        if bytes_read == 0 {
            return Err(EslError::ConnectionClosed);
        }

        parser.add_data(&read_buffer[..bytes_read])?;
    }
}

async fn send_raw(stream: &mut TcpStream, command: &EslCommand) -> EslResult<()> {
    let wire = command.to_wire_format()?;
    debug!("[SEND] {}", command.log_line());
    stream
        .write_all(wire.as_bytes())
        .await
        .map_err(EslError::Io)
}

/// Answer the switch's auth challenge.
async fn authenticate(
    stream: &mut TcpStream,
    parser: &mut FrameParser,
    read_buffer: &mut [u8],
    password: &str,
    timeout_ms: u64,
) -> EslResult<()> {
    debug!("[AUTH] Waiting for auth request from switch");
    let challenge = recv_frame(stream, parser, read_buffer, timeout_ms).await?;

    if challenge.kind() != FrameKind::AuthChallenge {
        return Err(EslError::protocol_error(format!(
            "Expected auth request, got {:?}",
            challenge.kind()
        )));
    }

    let auth_cmd = EslCommand::Auth {
        password: password.to_string(),
    };
    send_raw(stream, &auth_cmd).await?;

    let reply = recv_frame(stream, parser, read_buffer, timeout_ms).await?;
    if reply.kind() != FrameKind::CommandReply {
        return Err(EslError::protocol_error(format!(
            "Expected auth reply, got {:?}",
            reply.kind()
        )));
    }

    let response = EslResponse::new(reply);
    if !response.is_success() {
        return Err(EslError::auth_failed(
            response
                .reply_text()
                .unwrap_or("Authentication failed")
                .to_string(),
        ));
    }

    debug!("[AUTH] Authentication successful");
    Ok(())
}

/// Dial and authenticate. The stream is returned unsplit so that subscription
/// replay can still run on it before the reader starts.
pub(crate) async fn open_session(config: &EslConfig) -> EslResult<(TcpStream, FrameParser)> {
    let mut stream =
        tcp_connect_with_timeout(&config.host, config.port, config.connect_timeout_ms).await?;
    let mut parser = FrameParser::new();
    let mut read_buffer = [0u8; SOCKET_BUF_SIZE];

    authenticate(
        &mut stream,
        &mut parser,
        &mut read_buffer,
        &config.password,
        config.connect_timeout_ms,
    )
    .await?;
    Ok((stream, parser))
}

/// Restore subscriptions on a freshly authenticated socket with one `event` command.
///
/// Events that arrive before the reply are dispatched, not lost.
pub(crate) async fn replay_subscriptions(
    stream: &mut TcpStream,
    parser: &mut FrameParser,
    format: EventFormat,
    names: &[String],
    timeout_ms: u64,
    dispatcher: &EventDispatcher,
) -> EslResult<()> {
    if names.is_empty() {
        return Ok(());
    }
    let cmd = EslCommand::Events {
        format: format.to_string(),
        events: names.join(" "),
    };
    send_raw(stream, &cmd).await?;

    let mut read_buffer = [0u8; SOCKET_BUF_SIZE];
    loop {
        let frame = recv_frame(stream, parser, &mut read_buffer, timeout_ms).await?;
        match frame.kind() {
            kind if kind.is_reply() => {
                EslResponse::new(frame).into_result()?;
                return Ok(());
            }
            FrameKind::Event => match decode_event(frame) {
                Ok(event) => dispatcher.dispatch(event),
                Err(e) => warn!("[RECV] Dropping undecodable event: {}", e),
            },
            FrameKind::Disconnect => return Err(EslError::ConnectionClosed),
            other => debug!("[RECV] Ignoring {:?} during replay", other),
        }
    }
}

/// Resolve once `rx` reads `true` or its sender is gone.
pub(crate) async fn shutdown_signalled(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx
            .changed()
            .await
            .is_err()
        {
            return;
        }
    }
}

/// The command currently waiting for a reply, tagged with the connection it was written to.
struct PendingCommand {
    generation: u64,
    tx: oneshot::Sender<EslResult<Frame>>,
}

/// State only the supervisor and subscribe/unsubscribe mutate.
pub(crate) struct ConnState {
    /// Event names in subscription order, without duplicates.
    pub(crate) subscriptions: Vec<String>,
    pub(crate) backoff: ReconnectBackoff,
    pub(crate) reader: Option<JoinHandle<()>>,
}

/// Shared state between EslClient, the reader task and the supervisor
pub(crate) struct SharedState {
    pub(crate) config: EslConfig,
    /// Exclusive write turn; held from write until the reply arrives.
    writer: Mutex<Option<OwnedWriteHalf>>,
    pending: Mutex<Option<PendingCommand>>,
    status_tx: watch::Sender<ConnectionStatus>,
    shutdown_tx: watch::Sender<bool>,
    /// Bumped each time a new socket is installed.
    generation: AtomicU64,
    closing: AtomicBool,
    command_timeout_ms: AtomicU64,
    /// Liveness timeout in milliseconds (0 = disabled)
    liveness_timeout_ms: AtomicU64,
    desync_count: AtomicU64,
    pub(crate) reconnect_attempts: AtomicU64,
    failure_tx: mpsc::UnboundedSender<TransportFailure>,
    pub(crate) conn_state: Mutex<ConnState>,
    pub(crate) dispatcher: EventDispatcher,
}

impl SharedState {
    fn new(config: EslConfig, failure_tx: mpsc::UnboundedSender<TransportFailure>) -> Self {
        let backoff = ReconnectBackoff::new(
            Duration::from_millis(config.reconnect_floor_ms),
            Duration::from_millis(config.reconnect_ceiling_ms),
        );
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected(
            DisconnectReason::ConnectionClosed,
        ));
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            writer: Mutex::new(None),
            pending: Mutex::new(None),
            status_tx,
            shutdown_tx,
            generation: AtomicU64::new(0),
            closing: AtomicBool::new(false),
            command_timeout_ms: AtomicU64::new(config.command_timeout_ms),
            liveness_timeout_ms: AtomicU64::new(config.liveness_timeout_ms),
            desync_count: AtomicU64::new(0),
            reconnect_attempts: AtomicU64::new(0),
            failure_tx,
            conn_state: Mutex::new(ConnState {
                subscriptions: Vec::new(),
                backoff,
                reader: None,
            }),
            dispatcher: EventDispatcher::new(config.event_queue_size),
            config,
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
            .load(Ordering::SeqCst)
    }

    /// Reply timeout currently in force, including runtime overrides.
    pub(crate) fn command_timeout_ms(&self) -> u64 {
        self.command_timeout_ms
            .load(Ordering::Relaxed)
    }

    pub(crate) fn is_closing(&self) -> bool {
        self.closing
            .load(Ordering::SeqCst)
    }

    pub(crate) fn is_connected(&self) -> bool {
        matches!(*self.status_tx.borrow(), ConnectionStatus::Connected)
    }

    /// Publish `status` unless the client is closing. Returns whether it was published.
    fn publish_status(&self, status: ConnectionStatus) -> bool {
        self.status_tx
            .send_if_modified(|current| {
                if self.is_closing() {
                    return false;
                }
                *current = status;
                true
            })
    }

    pub(crate) fn mark_reconnecting(&self) {
        self.publish_status(ConnectionStatus::Reconnecting);
    }

    pub(crate) fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_tx
            .subscribe()
    }

    /// Send a command and wait for the reply.
    ///
    /// The writer lock is held through the entire send-and-receive cycle so
    /// that at most one command is in flight and replies arrive in issue order.
    pub(crate) async fn send_command(&self, command: EslCommand) -> EslResult<EslResponse> {
        let wire = command.to_wire_format()?;
        if !self.is_connected() {
            return Err(EslError::NotConnected);
        }

        let mut writer_guard = self
            .writer
            .lock()
            .await;
        let Some(writer) = writer_guard.as_mut() else {
            return Err(EslError::NotConnected);
        };
        let generation = self.generation();

        let (tx, rx) = oneshot::channel();
        *self
            .pending
            .lock()
            .await = Some(PendingCommand { generation, tx });

        // The reader may have failed the session while we waited for the turn.
        if !self.is_connected() {
            self.pending
                .lock()
                .await
                .take();
            return Err(EslError::NotConnected);
        }

        debug!("[SEND] {}", command.log_line());
        if let Err(e) = writer
            .write_all(wire.as_bytes())
            .await
        {
            self.pending
                .lock()
                .await
                .take();
            warn!("[SEND] Write failed: {}", e);
            // Still holding the write turn: nobody may write before the status flips.
            self.fail_connection(generation, DisconnectReason::IoError(e.to_string()))
                .await;
            drop(writer_guard);
            return Err(EslError::Io(e));
        }

        let timeout_ms = self.command_timeout_ms();
        let reply = match timeout(Duration::from_millis(timeout_ms), rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(EslError::ConnectionClosed),
            Err(_) => {
                self.pending
                    .lock()
                    .await
                    .take();
                warn!(
                    "[SEND] No reply to '{}' within {}ms, abandoning connection",
                    command.log_line(),
                    timeout_ms
                );
                self.fail_connection(generation, DisconnectReason::CommandTimeout)
                    .await;
                drop(writer_guard);
                return Err(EslError::Timeout { timeout_ms });
            }
        };
        drop(writer_guard);

        let response = EslResponse::new(reply?);
        debug!("[RECV] Reply: success={}", response.is_success());
        Ok(response)
    }

    /// Fail the in-flight command with a transport error.
    ///
    /// With `Some(generation)`, only a command written to that connection is failed.
    async fn fail_pending(&self, generation: Option<u64>) {
        let mut pending = self
            .pending
            .lock()
            .await;
        match pending.take() {
            Some(p) if generation.map_or(true, |g| g == p.generation) => {
                let _ = p
                    .tx
                    .send(Err(EslError::ConnectionClosed));
            }
            other => *pending = other,
        }
    }

    /// Mark connection `generation` dead and hand it to the supervisor.
    ///
    /// Only the first report for a live connection has any effect.
    pub(crate) async fn fail_connection(&self, generation: u64, reason: DisconnectReason) {
        if self.is_closing() || self.generation() != generation {
            debug!(generation, "Ignoring failure report for replaced connection");
            return;
        }
        let changed = self
            .status_tx
            .send_if_modified(|status| {
                if *status == ConnectionStatus::Connected {
                    *status = ConnectionStatus::Disconnected(reason.clone());
                    true
                } else {
                    false
                }
            });
        if !changed {
            return;
        }
        warn!(generation, "Connection lost: {}", reason);
        self.fail_pending(Some(generation))
            .await;
        let _ = self
            .failure_tx
            .send(TransportFailure { generation, reason });
    }

    /// Route one frame from the reader. Returns a reason when the session must end.
    async fn route_frame(&self, frame: Frame, generation: u64) -> Option<DisconnectReason> {
        match frame.kind() {
            kind if kind.is_reply() => {
                let mut pending = self
                    .pending
                    .lock()
                    .await;
                match pending.take() {
                    Some(p) if p.generation == generation => {
                        let _ = p
                            .tx
                            .send(Ok(frame));
                    }
                    other => {
                        *pending = other;
                        self.desync_count
                            .fetch_add(1, Ordering::Relaxed);
                        warn!(
                            "[RECV] Received {:?} but no pending command, dropping",
                            frame.kind()
                        );
                    }
                }
            }
            FrameKind::Event => match decode_event(frame) {
                Ok(event) => {
                    trace!("[RECV] Event {:?}", event.event_name());
                    self.dispatcher
                        .dispatch(event);
                }
                Err(e) => warn!("[RECV] Dropping undecodable event: {}", e),
            },
            FrameKind::Disconnect => {
                if frame.header(HEADER_CONTENT_DISPOSITION) == Some("linger") {
                    debug!("[RECV] Disconnect notice with linger disposition, ignoring");
                    return None;
                }
                info!("[RECV] Received disconnect notice from server");
                return Some(DisconnectReason::ServerNotice);
            }
            other => debug!("[RECV] Ignoring unexpected frame: {:?}", other),
        }
        None
    }

    /// Install a handshaken socket as the live connection and start its reader.
    pub(crate) async fn install(
        self: &Arc<Self>,
        state: &mut ConnState,
        stream: TcpStream,
        parser: FrameParser,
    ) {
        if self.is_closing() {
            debug!("[CONNECT] Client closing, discarding new session");
            return;
        }
        let (read_half, write_half) = stream.into_split();
        let generation = {
            let mut writer = self
                .writer
                .lock()
                .await;
            *writer = Some(write_half);
            self.generation
                .fetch_add(1, Ordering::SeqCst)
                + 1
        };
        // Connected before the reader exists, so an immediate EOF still reaches the supervisor.
        if !self.publish_status(ConnectionStatus::Connected) {
            debug!("[CONNECT] Client closing, not starting reader");
            return;
        }
        state
            .backoff
            .reset();
        state.reader = Some(tokio::spawn(reader_loop(
            read_half,
            parser,
            Arc::clone(self),
            generation,
        )));
        info!(generation, "[CONNECT] Session ready");
    }

    /// Stop the reader, fail the in-flight command and close the socket.
    pub(crate) async fn teardown(&self, state: &mut ConnState) {
        if let Some(reader) = state
            .reader
            .take()
        {
            reader.abort();
        }
        self.fail_pending(None)
            .await;
        let writer = self
            .writer
            .lock()
            .await
            .take();
        if let Some(mut writer) = writer {
            if let Err(e) = writer
                .shutdown()
                .await
            {
                debug!("Socket shutdown: {}", e);
            }
        }
    }

    /// Synchronous part of closing: stop background tasks from doing more work.
    fn begin_shutdown(&self) {
        if self
            .closing
            .swap(true, Ordering::SeqCst)
        {
            return;
        }
        self.shutdown_tx
            .send_replace(true);
        self.status_tx
            .send_replace(ConnectionStatus::Disconnected(
                DisconnectReason::ClientRequested,
            ));
        if let Ok(mut pending) = self
            .pending
            .try_lock()
        {
            pending.take();
        }
        self.dispatcher
            .close();
    }
}

/// Background reader loop
async fn reader_loop(
    reader: OwnedReadHalf,
    parser: FrameParser,
    shared: Arc<SharedState>,
    generation: u64,
) {
    let inner = AssertUnwindSafe(reader_loop_inner(reader, parser, &shared, generation));
    let reason = match inner
        .catch_unwind()
        .await
    {
        Ok(Some(reason)) => reason,
        Ok(None) => return,
        Err(_) => {
            error!("[RECV] reader task panicked");
            DisconnectReason::IoError("reader task panicked".to_string())
        }
    };
    shared
        .fail_connection(generation, reason)
        .await;
}

/// Returns `None` when the client is shutting down.
async fn reader_loop_inner(
    mut reader: OwnedReadHalf,
    mut parser: FrameParser,
    shared: &SharedState,
    generation: u64,
) -> Option<DisconnectReason> {
    let mut read_buffer = [0u8; SOCKET_BUF_SIZE];
    let mut last_recv = Instant::now();
    let mut shutdown = shared.shutdown_receiver();

    loop {
        // Drain complete frames already buffered before touching the socket.
        match parser.parse_frame() {
            Ok(Some(frame)) => {
                if let Some(reason) = shared
                    .route_frame(frame, generation)
                    .await
                {
                    return Some(reason);
                }
                continue;
            }
            Ok(None) => {}
            Err(e) => {
                warn!("[RECV] Parser error: {}", e);
                return Some(DisconnectReason::ProtocolError(e.to_string()));
            }
        }

        let threshold_ms = shared
            .liveness_timeout_ms
            .load(Ordering::Relaxed);
        let poll_ms = if threshold_ms > 0 {
            threshold_ms.min(LIVENESS_POLL_MS)
        } else {
            LIVENESS_POLL_MS
        };

        let read_result = tokio::select! {
            r = timeout(Duration::from_millis(poll_ms), reader.read(&mut read_buffer)) => r,
            _ = shutdown_signalled(&mut shutdown) => {
                debug!("[RECV] Shutdown requested, reader exiting");
                return None;
            }
        };

        match read_result {
            Ok(Ok(0)) => {
                info!("[RECV] Connection closed (EOF)");
                return Some(DisconnectReason::ConnectionClosed);
            }
            Ok(Ok(n)) => {
                last_recv = Instant::now();
                if let Err(e) = parser.add_data(&read_buffer[..n]) {
                    warn!("[RECV] Buffer error: {}", e);
                    return Some(DisconnectReason::ProtocolError(e.to_string()));
                }
            }
            Ok(Err(e)) => {
                warn!("[RECV] Read error: {}", e);
                return Some(DisconnectReason::IoError(e.to_string()));
            }
            Err(_) => {
                if threshold_ms > 0 {
                    let elapsed = last_recv.elapsed();
                    if elapsed > Duration::from_millis(threshold_ms) {
                        warn!(
                            "[RECV] Liveness timeout: {}ms without traffic (threshold {}ms)",
                            elapsed.as_millis(),
                            threshold_ms
                        );
                        return Some(DisconnectReason::HeartbeatExpired);
                    }
                }
            }
        }
    }
}

struct ClientInner {
    shared: Arc<SharedState>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.shared
            .begin_shutdown();
    }
}

/// Client handle (Clone + Send)
///
/// Commands from all clones are serialized through one write turn. A
/// background supervisor replaces the socket after any transport failure;
/// while it works, commands fail fast with [`EslError::NotConnected`].
/// Dropping the last clone shuts the background tasks down. An event handler
/// that captures a clone keeps the client alive; call [`close`](Self::close)
/// to shut down in that case.
#[derive(Clone)]
pub struct EslClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for EslClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EslClient")
            .field("host", &self.shared().config.host)
            .field("port", &self.shared().config.port)
            .field("status", &self.status())
            .finish()
    }
}

impl EslClient {
    /// Dial, authenticate and start the reader and reconnection supervisor.
    ///
    /// A failure here is returned as-is; the supervisor only takes over once
    /// a first session has been established.
    ///
    /// ```rust,no_run
    /// # async fn example() -> Result<(), conference_esl::EslError> {
    /// use conference_esl::{EslClient, EslConfig};
    /// let client = EslClient::connect(EslConfig::new("10.0.0.5", 8021, "ClueCon")).await?;
    /// client.subscribe_events(&["CUSTOM", "conference::maintenance"]).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(config: EslConfig) -> EslResult<Self> {
        config.validate()?;
        info!(
            "[CONNECT] Connecting to switch at {}:{}",
            config.host, config.port
        );

        let (stream, parser) = open_session(&config).await?;

        let (failure_tx, failure_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(SharedState::new(config, failure_tx));
        {
            let mut state = shared
                .conn_state
                .lock()
                .await;
            shared
                .install(&mut state, stream, parser)
                .await;
        }
        tokio::spawn(supervisor::supervise(Arc::clone(&shared), failure_rx));

        info!("[CONNECT] Connected and authenticated");
        Ok(Self {
            inner: Arc::new(ClientInner { shared }),
        })
    }

    pub(crate) fn shared(&self) -> &SharedState {
        &self
            .inner
            .shared
    }

    async fn send_command_ok(&self, command: EslCommand) -> EslResult<()> {
        self.shared()
            .send_command(command)
            .await?
            .into_result()
            .map(|_| ())
    }

    /// Run `api <command>` and return the reply body verbatim.
    ///
    /// No `+OK`/`-ERR` check is made; use [`api_checked`](Self::api_checked)
    /// for commands that follow that convention.
    pub async fn api(&self, command: &str) -> EslResult<String> {
        let cmd = EslCommand::Api {
            command: command.to_string(),
        };
        let response = self
            .shared()
            .send_command(cmd)
            .await?;
        Ok(response.body_string())
    }

    /// Run `api <command>`, require a leading `+OK` and return what follows it.
    pub async fn api_checked(&self, command: &str) -> EslResult<String> {
        let cmd = EslCommand::Api {
            command: command.to_string(),
        };
        self.shared()
            .send_command(cmd)
            .await?
            .into_api_result()
    }

    /// Subscribe to events by name, in the configured event format.
    ///
    /// Names already subscribed are skipped. The set survives reconnects: the
    /// supervisor replays it on every new session. For conference events
    /// pass `CUSTOM` followed by the subclass (`conference::maintenance`).
    pub async fn subscribe_events(&self, events: &[&str]) -> EslResult<()> {
        validate_event_names(events)?;
        let shared = self.shared();
        if !shared.is_connected() {
            return Err(EslError::NotConnected);
        }
        let mut state = shared
            .conn_state
            .lock()
            .await;

        let mut new_names: Vec<String> = Vec::new();
        for name in events {
            if !state
                .subscriptions
                .iter()
                .any(|s| s == name)
                && !new_names
                    .iter()
                    .any(|s| s == name)
            {
                new_names.push(name.to_string());
            }
        }
        if new_names.is_empty() {
            debug!("Already subscribed to {:?}", events);
            return Ok(());
        }

        let format = shared.config.event_format;
        self.send_command_ok(EslCommand::Events {
            format: format.to_string(),
            events: new_names.join(" "),
        })
        .await?;
        info!(
            "Subscribed to events '{}' with format {}",
            new_names.join(" "),
            format
        );
        state
            .subscriptions
            .extend(new_names);
        Ok(())
    }

    /// Unsubscribe with `nixevent` and drop the names from the replay set.
    pub async fn unsubscribe_events(&self, events: &[&str]) -> EslResult<()> {
        validate_event_names(events)?;
        if !self.is_connected() {
            return Err(EslError::NotConnected);
        }
        let mut state = self
            .shared()
            .conn_state
            .lock()
            .await;
        self.send_command_ok(EslCommand::NixEvent {
            events: events.join(" "),
        })
        .await?;
        state
            .subscriptions
            .retain(|s| !events.contains(&s.as_str()));
        info!("Unsubscribed from events '{}'", events.join(" "));
        Ok(())
    }

    /// Event names the supervisor replays after a reconnect, in order.
    pub async fn subscriptions(&self) -> Vec<String> {
        self.shared()
            .conn_state
            .lock()
            .await
            .subscriptions
            .clone()
    }

    /// Run `handler` on its own task for every event received from now on.
    ///
    /// A panic inside the handler is logged and the handler keeps receiving
    /// later events. Must be called from within a tokio runtime.
    ///
    /// A handler holding an `EslClient` clone is only released by
    /// [`close`](Self::close); dropping the other clones is not enough.
    ///
    /// ```rust,no_run
    /// # async fn example(client: &conference_esl::EslClient) {
    /// client.register_event_handler(|event| async move {
    ///     if event.is_conference_event() {
    ///         println!("{:?} in {:?}", event.action(), event.conference_name());
    ///     }
    /// });
    /// # }
    /// ```
    pub fn register_event_handler<F, Fut>(&self, handler: F) -> HandlerId
    where
        F: Fn(Arc<EslEvent>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.shared()
            .dispatcher
            .register(handler)
    }

    /// Returns `false` if no such handler was registered.
    pub fn unregister_event_handler(&self, id: HandlerId) -> bool {
        self.shared()
            .dispatcher
            .unregister(id)
    }

    /// Receive events through a [`Stream`](futures_util::Stream) instead of a callback.
    pub fn event_stream(&self) -> EslEventStream {
        self.shared()
            .dispatcher
            .stream()
    }

    /// Number of events dropped because a handler's queue was full.
    pub fn dropped_event_count(&self) -> u64 {
        self.shared()
            .dispatcher
            .dropped_count()
    }

    /// Number of replies received with no command waiting for them.
    pub fn desync_count(&self) -> u64 {
        self.shared()
            .desync_count
            .load(Ordering::Relaxed)
    }

    /// Total reconnect attempts made by the supervisor, successful or not.
    pub fn reconnect_attempts(&self) -> u64 {
        self.shared()
            .reconnect_attempts
            .load(Ordering::Relaxed)
    }

    /// Set liveness timeout. Any inbound TCP traffic resets the timer.
    /// Set to zero to disable (default).
    ///
    /// Subscribe to `HEARTBEAT` so that an idle but healthy switch still sends traffic.
    pub fn set_liveness_timeout(&self, duration: Duration) {
        self.shared()
            .liveness_timeout_ms
            .store(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Set command response timeout (default: 5 seconds).
    ///
    /// A timed-out command leaves the session unable to match later replies,
    /// so the connection is dropped and re-established.
    pub fn set_command_timeout(&self, duration: Duration) {
        self.shared()
            .command_timeout_ms
            .store(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Whether commands are currently accepted.
    pub fn is_connected(&self) -> bool {
        self.shared()
            .is_connected()
    }

    /// Current connection status snapshot.
    pub fn status(&self) -> ConnectionStatus {
        self.shared()
            .status_tx
            .borrow()
            .clone()
    }

    /// Watch connection status changes.
    pub fn status_watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared()
            .status_tx
            .subscribe()
    }

    /// Close the session and stop reconnecting. Affects every clone.
    pub async fn close(&self) {
        info!("Client requested close");
        let shared = self.shared();
        shared.begin_shutdown();
        let mut state = shared
            .conn_state
            .lock()
            .await;
        shared
            .teardown(&mut state)
            .await;
    }
}

fn validate_event_names(events: &[&str]) -> EslResult<()> {
    if events.is_empty() {
        return Err(EslError::invalid_argument("event list must not be empty"));
    }
    for name in events {
        if name.is_empty()
            || name
                .chars()
                .any(char::is_whitespace)
        {
            return Err(EslError::invalid_argument(format!(
                "invalid event name {:?}",
                name
            )));
        }
    }
    Ok(())
}
