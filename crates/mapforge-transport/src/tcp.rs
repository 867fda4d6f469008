//! TCP transport: accepted/outgoing connections behind one event queue.
//!
//! Architecture: task-per-direction with a central mpsc channel.
//!
//! - **Accept task** (hosting only): accepts new TCP connections and enqueues
//!   a `Connected` event carrying the peer's handles.
//! - **Reader tasks** (one per connection): call [`read_frame`] in a loop and
//!   enqueue `Packet` events. On error or EOF they enqueue `Dropped`.
//! - **Writer tasks** (one per connection): drain that peer's outbound
//!   channel and write frames. A failed write enqueues `Dropped`.
//!
//! The owner is the queue's only consumer: it drains everything with
//! [`TcpTransport::poll`] from its tick context and is the only place the
//! peer registry is touched, so no locks guard it. `Dropped` may be enqueued
//! by both halves of a dying connection; `poll` reports a connection dropped
//! at most once by removing it from the registry on first sight.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::framing::{read_frame, write_frame};
use crate::{ConnectionId, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Internal events flowing from connection tasks to the owner.
enum Event {
    Connected { id: ConnectionId, peer: Peer },
    Packet { id: ConnectionId, bytes: Vec<u8> },
    Dropped { id: ConnectionId },
}

/// Per-connection handles kept in the registry.
struct Peer {
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    reader: JoinHandle<()>,
}

/// Everything that happened on the wire since the last poll.
#[derive(Debug, Default)]
pub struct TransportPoll {
    /// Connections accepted since the last poll (hosting).
    pub connected: Vec<ConnectionId>,
    /// Received packets, tagged with their origin connection.
    pub packets: Vec<(ConnectionId, Vec<u8>)>,
    /// Connections that closed or failed, each reported exactly once.
    pub dropped: Vec<ConnectionId>,
}

/// Owns all socket connections for one session role.
///
/// Hosting uses [`listen`](Self::listen), joining uses
/// [`connect`](Self::connect), and offline play uses [`new`](Self::new)
/// (a transport that never produces events).
pub struct TcpTransport {
    peers: HashMap<ConnectionId, Peer>,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
    accept_task: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl TcpTransport {
    /// Creates an idle transport with no connections and no listener.
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            peers: HashMap::new(),
            events_tx,
            events_rx,
            accept_task: None,
            local_addr: None,
        }
    }

    /// Binds a listening socket and starts accepting connections.
    pub async fn listen(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        let local_addr =
            listener.local_addr().map_err(TransportError::AcceptFailed)?;

        let mut transport = Self::new();
        transport.local_addr = Some(local_addr);

        let events_tx = transport.events_tx.clone();
        transport.accept_task = Some(tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        let _ = stream.set_nodelay(true);
                        let (id, peer) = spawn_peer(stream, events_tx.clone());
                        tracing::debug!(%id, %addr, "accepted connection");
                        if events_tx.send(Event::Connected { id, peer }).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                }
            }
        }));

        tracing::info!(%local_addr, "transport listening");
        Ok(transport)
    }

    /// Opens one outbound connection with a bounded, cancellable deadline.
    ///
    /// Returns the transport and the id of the (single) connection, which is
    /// the host link for a joined session.
    pub async fn connect(
        addr: &str,
        timeout: Duration,
    ) -> Result<(Self, ConnectionId), TransportError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| TransportError::ConnectTimeout {
                addr: addr.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })?
            .map_err(TransportError::ConnectFailed)?;
        let _ = stream.set_nodelay(true);

        let mut transport = Self::new();
        let (id, peer) = spawn_peer(stream, transport.events_tx.clone());
        transport.peers.insert(id, peer);
        tracing::info!(%id, addr, "connected to host");
        Ok((transport, id))
    }

    /// The listening address, when hosting.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.peers.len()
    }

    /// Drains all queued transport events without blocking.
    pub fn poll(&mut self) -> TransportPoll {
        let mut out = TransportPoll::default();
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                Event::Connected { id, peer } => {
                    self.peers.insert(id, peer);
                    out.connected.push(id);
                }
                Event::Packet { id, bytes } => {
                    // Packets from a connection already removed (closed or
                    // reported dropped) are discarded.
                    if self.peers.contains_key(&id) {
                        out.packets.push((id, bytes));
                    }
                }
                Event::Dropped { id } => {
                    if let Some(peer) = self.peers.remove(&id) {
                        peer.reader.abort();
                        out.dropped.push(id);
                    }
                }
            }
        }
        out
    }

    /// Queues `bytes` to every connection. Fire-and-forget.
    pub fn send_all(&self, bytes: &[u8]) {
        for (id, peer) in &self.peers {
            if peer.outbound.send(bytes.to_vec()).is_err() {
                tracing::debug!(%id, "send to closing connection discarded");
            }
        }
    }

    /// Queues `bytes` to every connection except `except`.
    pub fn send_all_except(&self, except: ConnectionId, bytes: &[u8]) {
        for (id, peer) in &self.peers {
            if *id == except {
                continue;
            }
            if peer.outbound.send(bytes.to_vec()).is_err() {
                tracing::debug!(%id, "send to closing connection discarded");
            }
        }
    }

    /// Queues `bytes` to one connection. Unknown ids are ignored.
    pub fn send_to(&self, id: ConnectionId, bytes: Vec<u8>) {
        if let Some(peer) = self.peers.get(&id) {
            if peer.outbound.send(bytes).is_err() {
                tracing::debug!(%id, "send to closing connection discarded");
            }
        } else {
            tracing::debug!(%id, "send to unknown connection discarded");
        }
    }

    /// Closes one connection after flushing its queued frames.
    ///
    /// Locally initiated, so the connection is not reported as dropped.
    pub fn close(&mut self, id: ConnectionId) {
        if let Some(peer) = self.peers.remove(&id) {
            // Dropping the outbound sender lets the writer drain what is
            // queued (the rejection packet, typically) and then shut the
            // socket down.
            drop(peer.outbound);
            peer.reader.abort();
            tracing::debug!(%id, "connection closed");
        }
    }

    /// Tears down every connection and the listener.
    pub fn shutdown(&mut self) {
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
        for (id, peer) in self.peers.drain() {
            peer.reader.abort();
            drop(peer.outbound);
            tracing::debug!(%id, "connection torn down");
        }
        self.local_addr = None;
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Splits a stream and spawns its reader and writer tasks.
fn spawn_peer(
    stream: TcpStream,
    events_tx: mpsc::UnboundedSender<Event>,
) -> (ConnectionId, Peer) {
    let id = ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
    let (read_half, write_half) = stream.into_split();

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    tokio::spawn(writer_loop(outbound_rx, write_half, id, events_tx.clone()));
    let reader = tokio::spawn(reader_loop(read_half, id, events_tx));

    (id, Peer { outbound: outbound_tx, reader })
}

async fn reader_loop(
    mut half: OwnedReadHalf,
    id: ConnectionId,
    events_tx: mpsc::UnboundedSender<Event>,
) {
    loop {
        match read_frame(&mut half).await {
            Ok(bytes) => {
                if events_tx.send(Event::Packet { id, bytes }).is_err() {
                    return;
                }
            }
            Err(e) => {
                if e.kind() != std::io::ErrorKind::UnexpectedEof {
                    tracing::debug!(%id, error = %e, "read failed");
                }
                let _ = events_tx.send(Event::Dropped { id });
                return;
            }
        }
    }
}

async fn writer_loop(
    mut outbound_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    mut half: OwnedWriteHalf,
    id: ConnectionId,
    events_tx: mpsc::UnboundedSender<Event>,
) {
    while let Some(bytes) = outbound_rx.recv().await {
        if let Err(e) = write_frame(&mut half, &bytes).await {
            tracing::debug!(%id, error = %e, "write failed");
            let _ = events_tx.send(Event::Dropped { id });
            return;
        }
    }
    // Channel closed: locally initiated close. Queued frames are already
    // flushed, so shut the socket down cleanly.
    use tokio::io::AsyncWriteExt;
    let _ = half.shutdown().await;
}
