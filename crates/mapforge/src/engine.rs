//! The engine: transport + session + tick loop wired together.
//!
//! One [`Engine`] per node, whatever its role. The engine owns the only
//! references to the transport and the session, and touches both solely
//! from its tick context — which is the concurrency model in its
//! entirety: connection tasks move bytes, the tick context mutates state.
//!
//! Each tick the engine drains the transport (new connections, packets,
//! drops) into the session, writes the session's directives back to the
//! wire, and runs the periodic duties (host keep-alive ping, autosave).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use mapforge_protocol::Recipient;
use mapforge_session::{
    Directive, Role, Session, SessionConfig, SessionEvent,
};
use mapforge_tick::{Cadence, TickScheduler};
use mapforge_transport::TcpTransport;

use crate::MapforgeError;

/// Default host port.
pub const DEFAULT_PORT: u16 = 6812;

/// Operator-facing engine parameters.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub session: SessionConfig,
    /// Port to listen on when hosting.
    pub port: u16,
    pub tick_rate_hz: u32,
    /// Keep-alive ping period while hosting.
    pub ping_interval: Duration,
    /// Best-effort autosave period while hosting. Zero disables it.
    pub autosave_interval: Duration,
    /// Outbound connect deadline when joining.
    pub connect_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            port: DEFAULT_PORT,
            tick_rate_hz: 10,
            ping_interval: Duration::from_secs(10),
            autosave_interval: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Builder for configuring an [`Engine`].
///
/// # Example
///
/// ```rust,no_run
/// use mapforge::Engine;
///
/// # async fn run() -> Result<(), mapforge::MapforgeError> {
/// let mut engine = Engine::builder()
///     .display_name("Aran")
///     .password("mellon")
///     .data_root("/var/lib/mapforge")
///     .build();
/// engine.host().await?;
/// engine.run().await
/// # }
/// ```
#[derive(Debug, Default)]
pub struct EngineBuilder {
    config: EngineConfig,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn display_name(mut self, name: &str) -> Self {
        self.config.session.display_name = name.to_string();
        self
    }

    pub fn character_name(mut self, name: &str) -> Self {
        self.config.session.character_name = name.to_string();
        self
    }

    pub fn password(mut self, password: &str) -> Self {
        self.config.session.password = password.to_string();
        self
    }

    pub fn data_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.session.data_root = root.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn tick_rate(mut self, tick_rate_hz: u32) -> Self {
        self.config.tick_rate_hz = tick_rate_hz;
        self
    }

    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.config.ping_interval = interval;
        self
    }

    pub fn autosave_interval(mut self, interval: Duration) -> Self {
        self.config.autosave_interval = interval;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn build(self) -> Engine {
        Engine::new(self.config)
    }
}

/// A running tabletop node: offline, hosting, or joined.
pub struct Engine {
    config: EngineConfig,
    session: Session,
    transport: TcpTransport,
    scheduler: TickScheduler,
    ping: Cadence,
    autosave: Cadence,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn new(config: EngineConfig) -> Self {
        let session = Session::new(config.session.clone());
        let scheduler = TickScheduler::with_rate(config.tick_rate_hz);
        let ping =
            Cadence::every_period(config.ping_interval, config.tick_rate_hz);
        let autosave =
            Cadence::every_period(config.autosave_interval, config.tick_rate_hz);
        Self {
            config,
            session,
            transport: TcpTransport::new(),
            scheduler,
            ping,
            autosave,
        }
    }

    /// Read access to the session state.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Runs a local session operation and writes its directives out.
    ///
    /// This is how every user action reaches the session: drawing, pog
    /// edits, chat, deck operations.
    pub fn perform<R>(
        &mut self,
        op: impl FnOnce(&mut Session) -> R,
    ) -> R
    where
        R: IntoDirectives,
    {
        let result = op(&mut self.session);
        let directives = result.directives();
        self.flush(directives);
        result
    }

    /// Drains the session's queued UI events.
    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        self.session.take_events()
    }

    /// Starts hosting on the configured port.
    pub async fn host(&mut self) -> Result<SocketAddr, MapforgeError> {
        let addr = format!("0.0.0.0:{}", self.config.port);
        self.host_on(&addr).await
    }

    /// Starts hosting on an explicit address (tests use `127.0.0.1:0`).
    pub async fn host_on(&mut self, addr: &str) -> Result<SocketAddr, MapforgeError> {
        self.transport.shutdown();
        self.transport = TcpTransport::listen(addr).await?;
        self.session.begin_hosting();
        let local = self.transport.local_addr().expect("listening transport");
        Ok(local)
    }

    /// Joins a host with a bounded, cancellable connect.
    pub async fn join(&mut self, addr: &str) -> Result<(), MapforgeError> {
        self.transport.shutdown();
        let (transport, host_link) =
            TcpTransport::connect(addr, self.config.connect_timeout).await?;
        self.transport = transport;
        let directives = self.session.begin_join(host_link);
        self.flush(directives);
        Ok(())
    }

    /// Pumps until the join handshake completes.
    ///
    /// Returns `true` once live (login complete), `false` if the host
    /// rejected us or the connection died.
    pub async fn wait_for_login(
        &mut self,
        timeout: Duration,
    ) -> Result<bool, MapforgeError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.session.role() {
                Role::Joined { login_complete: true, .. } => return Ok(true),
                Role::Disconnected => return Ok(false),
                _ => {}
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(MapforgeError::JoinTimedOut);
            }
            self.pump().await;
        }
    }

    /// Tears everything down and returns to offline play.
    pub fn disconnect(&mut self) {
        self.transport.shutdown();
        self.session.end_session();
    }

    /// Waits for the next tick and services it once.
    pub async fn pump(&mut self) {
        let tick = self.scheduler.wait_for_tick().await;
        self.service(tick.tick);
    }

    /// Runs the engine loop until the task is cancelled.
    pub async fn run(&mut self) -> Result<(), MapforgeError> {
        loop {
            self.pump().await;
        }
    }

    /// One tick's worth of work: drain the wire, run periodic duties.
    fn service(&mut self, tick: u64) {
        let poll = self.transport.poll();
        for connection in poll.connected {
            // Nothing to do until the join request arrives; the session
            // learns about the connection from its first packet.
            tracing::debug!(%connection, "connection established");
        }
        for (origin, bytes) in poll.packets {
            let directives = self.session.handle_packet(origin, &bytes);
            self.flush(directives);
        }
        for connection in poll.dropped {
            let directives = self.session.handle_connection_dropped(connection);
            self.flush(directives);
        }

        // A joiner whose session ended (rejection or host loss) has no
        // use for its transport anymore.
        if matches!(self.session.role(), Role::Disconnected)
            && (self.transport.connection_count() > 0
                || self.transport.local_addr().is_some())
        {
            self.transport.shutdown();
        }

        if self.ping.due(tick) {
            let directives = self.session.keepalive();
            self.flush(directives);
        }
        if self.autosave.due(tick) && self.session.is_hosting() {
            let path = self.config.session.data_root.join("autosave.mfm");
            if let Err(error) = self.session.save_map(&path) {
                tracing::warn!(%error, "autosave failed");
            }
        }
    }

    /// Writes directives to the transport. Fire-and-forget: send failures
    /// surface later as dropped connections.
    fn flush(&mut self, directives: Vec<Directive>) {
        for directive in directives {
            match directive {
                Directive::Send(recipient, message) => {
                    let bytes = message.encode();
                    match recipient {
                        Recipient::All => self.transport.send_all(&bytes),
                        Recipient::AllExcept(connection) => {
                            self.transport.send_all_except(connection, &bytes)
                        }
                        Recipient::Peer(connection) => {
                            self.transport.send_to(connection, bytes)
                        }
                    }
                }
                Directive::Close(connection) => self.transport.close(connection),
            }
        }
    }
}

/// Session operations return either plain directives or a
/// `Result<directives, e>`; [`Engine::perform`] flushes both shapes.
pub trait IntoDirectives {
    fn directives(&self) -> Vec<Directive>;
}

impl IntoDirectives for Vec<Directive> {
    fn directives(&self) -> Vec<Directive> {
        self.clone()
    }
}

impl<E> IntoDirectives for Result<Vec<Directive>, E> {
    fn directives(&self) -> Vec<Directive> {
        match self {
            Ok(directives) => directives.clone(),
            Err(_) => Vec::new(),
        }
    }
}
