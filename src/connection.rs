//! Connection management and the request/response engine

use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::{
    command::Action,
    config::{resolve_endpoint, AmiConfig},
    error::{AmiError, AmiResult},
    packet::{Packet, PacketKind},
    protocol::PacketReader,
    router::EventRouter,
};

/// Lifecycle state of a manager connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionState {
    /// No socket.
    Disconnected,
    /// Socket open, greeting received, not yet logged in.
    Connected,
    /// Login accepted.
    LoggedIn,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::LoggedIn => write!(f, "logged in"),
        }
    }
}

/// Establish a TCP connection with a timeout.
async fn tcp_connect_with_timeout(host: &str, port: u16, limit: Duration) -> AmiResult<TcpStream> {
    match timeout(limit, TcpStream::connect((host, port))).await {
        Ok(Ok(s)) => {
            debug!("[CONNECT] TCP connection established");
            Ok(s)
        }
        Ok(Err(e)) => {
            warn!(
                "[CONNECT] Unable to connect to manager {}:{}: {}",
                host, port, e
            );
            Err(AmiError::connect_failed(format!(
                "{}:{}: {}",
                host, port, e
            )))
        }
        Err(_) => {
            let timeout_ms = limit.as_millis() as u64;
            warn!(
                "[CONNECT] TCP connect to {}:{} timed out after {}ms",
                host, port, timeout_ms
            );
            Err(AmiError::Timeout { timeout_ms })
        }
    }
}

/// Socket halves and endpoint of a live connection.
struct Session {
    reader: PacketReader<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    server: String,
    port: u16,
    greeting: String,
}

impl Session {
    /// Optionally send an action, then read until a terminal packet.
    ///
    /// Events are dispatched inline as they arrive. Timeout packets end the
    /// wait only when `allow_timeout` is set; otherwise the loop keeps reading.
    async fn exchange(
        &mut self,
        router: &EventRouter,
        action: Option<&Action>,
        allow_timeout: bool,
    ) -> AmiResult<Packet> {
        if let Some(action) = action {
            debug!("[SEND] {:?}", action);
            self.writer
                .write_all(
                    action
                        .to_wire_format()
                        .as_bytes(),
                )
                .await?;
        }

        loop {
            let packet = self
                .reader
                .read_packet()
                .await?;

            match packet.kind() {
                PacketKind::Event => {
                    router.dispatch(&packet, &self.server, self.port);
                }
                PacketKind::Response => {
                    debug!(
                        "[RECV] Response: {}",
                        packet
                            .response()
                            .unwrap_or("")
                    );
                    return Ok(packet);
                }
                PacketKind::Timeout => {
                    if allow_timeout {
                        trace!("[RECV] Timed out waiting for response");
                        return Ok(packet);
                    }
                }
                PacketKind::Unknown => {
                    warn!("Unhandled response packet from manager: {:?}", packet);
                }
            }
        }
    }

    async fn close(mut self) {
        if let Err(e) = self
            .writer
            .shutdown()
            .await
        {
            debug!("Socket shutdown failed: {}", e);
        }
        info!("Disconnected from manager at {}:{}", self.server, self.port);
    }
}

/// Drops the session if a request future is cancelled mid-exchange.
///
/// Once an action is on the wire its response must be consumed by the same
/// caller. A dropped future leaves that response unread, so the connection
/// is closed rather than handed to the next caller out of step.
struct InFlight<'a> {
    client: &'a AmiClient,
    slot: &'a mut Option<Session>,
    done: bool,
}

impl<'a> InFlight<'a> {
    fn new(client: &'a AmiClient, slot: &'a mut Option<Session>) -> Self {
        Self {
            client,
            slot,
            done: false,
        }
    }

    fn complete(mut self) {
        self.done = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        warn!("Request cancelled before its response, dropping manager connection");
        // Dropping the write half shuts the socket down.
        drop(
            self.slot
                .take(),
        );
        self.client
            .set_state(ConnectionState::Disconnected);
    }
}

/// Asterisk Manager Interface client.
///
/// One action is in flight at a time: every request holds the session lock
/// from write until its response arrives, so concurrent callers queue up
/// behind each other instead of interleaving on the wire. Event handlers run
/// while that lock is held and must not issue requests on the same client.
///
/// Dropping a request future after its action was written closes the
/// connection; reconnect with [`connect`](Self::connect).
pub struct AmiClient {
    config: AmiConfig,
    router: Arc<EventRouter>,
    session: Mutex<Option<Session>>,
    state_tx: watch::Sender<ConnectionState>,
}

impl std::fmt::Debug for AmiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmiClient")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

impl AmiClient {
    /// Create a disconnected client dispatching events to `router`.
    pub fn new(config: AmiConfig, router: Arc<EventRouter>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            router,
            session: Mutex::new(None),
            state_tx,
        }
    }

    /// Default configuration with an empty event registry.
    pub fn with_defaults() -> Self {
        Self::new(AmiConfig::default(), Arc::new(EventRouter::new()))
    }

    /// Configuration this client was built with.
    pub fn config(&self) -> &AmiConfig {
        &self.config
    }

    /// Event registry used for dispatch.
    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    /// Current connection state snapshot.
    pub fn state(&self) -> ConnectionState {
        *self
            .state_tx
            .borrow()
    }

    /// Watch connection state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx
            .subscribe()
    }

    /// Whether the login handshake succeeded and the socket is still up.
    pub fn is_logged_in(&self) -> bool {
        self.state() == ConnectionState::LoggedIn
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx
            .send_replace(state);
    }

    /// Greeting line the manager sent on connect, e.g. `Asterisk Call Manager/5.0.1`.
    pub async fn greeting(&self) -> Option<String> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| s.greeting.clone())
    }

    /// Connect and log in.
    ///
    /// `None` arguments fall back to the configuration. A `host:port` server
    /// overrides the configured port. On any failure the socket is closed and
    /// the state is [`ConnectionState::Disconnected`]. An existing session is
    /// logged off and closed first.
    pub async fn connect(
        &self,
        server: Option<&str>,
        username: Option<&str>,
        secret: Option<&str>,
    ) -> AmiResult<()> {
        let server = server.unwrap_or(self.config.server.as_str());
        let username = username.unwrap_or(self.config.username.as_str());
        let secret = secret.unwrap_or(self.config.secret.as_str());

        let (host, port) = resolve_endpoint(server, self.config.port)?;
        let login = Action::new("Login")?
            .field("Username", username)?
            .field("Secret", secret)?;

        let mut guard = self
            .session
            .lock()
            .await;
        self.close_locked(&mut guard)
            .await;

        info!("[CONNECT] Connecting to manager at {}:{}", host, port);
        let limit = self
            .config
            .connect_timeout();
        let stream = tcp_connect_with_timeout(&host, port, limit).await?;
        let (read_half, write_half) = stream.into_split();
        let mut reader =
            PacketReader::with_timeout(BufReader::new(read_half), self.config.read_timeout());

        // The per-line read timeout may be shorter than the connect timeout.
        let greeting = timeout(limit, async {
            loop {
                if let Some(line) = reader
                    .read_line()
                    .await?
                {
                    return Ok::<_, AmiError>(line);
                }
            }
        })
        .await;

        let greeting = match greeting {
            Ok(Ok(line)) => line,
            Err(_) => {
                warn!("[CONNECT] Manager header not received");
                return Err(AmiError::connect_failed(format!(
                    "manager header not received within {}ms",
                    limit.as_millis()
                )));
            }
            Ok(Err(e)) => {
                warn!("[CONNECT] Manager header not received: {}", e);
                return Err(AmiError::connect_failed(format!(
                    "manager header not received: {}",
                    e
                )));
            }
        };
        debug!("[CONNECT] Greeting: {}", greeting);

        let mut session = Session {
            reader,
            writer: write_half,
            server: host,
            port,
            greeting,
        };
        self.set_state(ConnectionState::Connected);

        debug!("[LOGIN] Logging in as {}", username);
        let in_flight = InFlight::new(self, &mut guard);
        let response = session
            .exchange(&self.router, Some(&login), false)
            .await;
        in_flight.complete();
        let response = match response {
            Ok(response) => response,
            Err(e) => {
                warn!("[LOGIN] Connection lost during login: {}", e);
                session
                    .close()
                    .await;
                self.set_state(ConnectionState::Disconnected);
                return Err(e);
            }
        };

        if !response.is_success() {
            let message = response
                .message()
                .unwrap_or("login rejected")
                .to_string();
            warn!("[LOGIN] Failed to login: {}", message);
            session
                .close()
                .await;
            self.set_state(ConnectionState::Disconnected);
            return Err(AmiError::auth_failed(message));
        }

        info!("[LOGIN] Logged in to manager at {}:{}", session.server, session.port);
        *guard = Some(session);
        self.set_state(ConnectionState::LoggedIn);
        Ok(())
    }

    /// Log off (if logged in) and close the socket. Safe to call repeatedly.
    pub async fn disconnect(&self) {
        let mut guard = self
            .session
            .lock()
            .await;
        self.close_locked(&mut guard)
            .await;
    }

    async fn close_locked(&self, slot: &mut Option<Session>) {
        let Some(mut session) = slot.take() else {
            self.set_state(ConnectionState::Disconnected);
            return;
        };

        let in_flight = InFlight::new(self, slot);
        if self.is_logged_in() {
            let logoff = Action::fixed("Logoff");
            if let Err(e) = session
                .exchange(&self.router, Some(&logoff), true)
                .await
            {
                debug!("[LOGOFF] Ignoring logoff failure: {}", e);
            }
        }

        session
            .close()
            .await;
        in_flight.complete();
        self.set_state(ConnectionState::Disconnected);
    }

    /// Run one cycle under the session lock.
    ///
    /// The session is torn down on I/O failure, and also when this future is
    /// dropped before the cycle finishes.
    async fn run(&self, action: Option<&Action>, allow_timeout: bool) -> AmiResult<Packet> {
        let mut guard = self
            .session
            .lock()
            .await;
        if guard.is_none() {
            return Err(AmiError::NotConnected);
        }

        let mut in_flight = InFlight::new(self, &mut guard);
        let result = match in_flight
            .slot
            .as_mut()
        {
            Some(session) => {
                session
                    .exchange(&self.router, action, allow_timeout)
                    .await
            }
            None => Err(AmiError::NotConnected),
        };

        match result {
            Ok(packet) => {
                in_flight.complete();
                Ok(packet)
            }
            Err(e) => {
                warn!("Manager connection failed: {}", e);
                let stale = in_flight
                    .slot
                    .take();
                in_flight.complete();
                if let Some(session) = stale {
                    session
                        .close()
                        .await;
                }
                self.set_state(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Send an action and wait for its response.
    ///
    /// Events arriving before the response are dispatched first. Timeout
    /// packets do not end the wait; with a read timeout configured this keeps
    /// polling until a response or a connection failure. Use
    /// [`send_request_with`](Self::send_request_with) to stop on timeout.
    ///
    /// ```rust,no_run
    /// # async fn example(client: &asterisk_ami_tokio::AmiClient) -> Result<(), asterisk_ami_tokio::AmiError> {
    /// let resp = client.send_request("Command", [("Command", "core show version")]).await?;
    /// println!("{}", resp.data().unwrap_or(""));
    /// # Ok(())
    /// # }
    /// ```
    pub async fn send_request<I, K, V>(&self, action: &str, parameters: I) -> AmiResult<Packet>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.send_request_with(action, parameters, false)
            .await
    }

    /// Send an action; with `allow_timeout`, a read timeout returns an empty packet.
    pub async fn send_request_with<I, K, V>(
        &self,
        action: &str,
        parameters: I,
        allow_timeout: bool,
    ) -> AmiResult<Packet>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let action = Action::with_fields(action, parameters)?;
        self.send_action(&action, allow_timeout)
            .await
    }

    /// Send a prebuilt [`Action`].
    pub async fn send_action(&self, action: &Action, allow_timeout: bool) -> AmiResult<Packet> {
        self.run(Some(action), allow_timeout)
            .await
    }

    /// Wait for the next response without sending anything, dispatching events meanwhile.
    ///
    /// With `allow_timeout` and a configured read timeout, returns an empty
    /// packet once the socket goes quiet, which makes this usable as an idle
    /// event pump.
    pub async fn wait_response(&self, allow_timeout: bool) -> AmiResult<Packet> {
        self.run(None, allow_timeout)
            .await
    }
}
