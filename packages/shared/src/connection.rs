//! One socket's read and write loops.
//!
//! A [`Connection`] owns a spawned task that drives a framed stream. The read loop parses
//! each line into a typed message and forwards it to the owner; the write loop drains a
//! FIFO queue one frame at a time. Whichever loop ends first (peer closed, I/O error, or
//! a local [`Connection::close`]) tears down the other, and the owner receives exactly one
//! [`ConnectionEvent::Closed`].

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
};

use bytes::BytesMut;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
    task::JoinHandle,
};
use tokio_util::{codec::Framed, sync::CancellationToken};

use crate::protocol::{Frame, LineCodec, ProtocolError};

/// Identifier of one accepted connection, unique for the lifetime of a server run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a connection. `Closed` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Connected = 1,
    Writing = 2,
    Idle = 3,
    Closed = 4,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Connected,
            2 => Self::Writing,
            3 => Self::Idle,
            _ => Self::Closed,
        }
    }
}

/// State cell shared between the handle and the connection task.
#[derive(Debug, Clone)]
struct SharedState(Arc<AtomicU8>);

impl SharedState {
    fn new(state: ConnectionState) -> Self {
        Self(Arc::new(AtomicU8::new(state as u8)))
    }

    fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Moves to `next` unless the connection is already closed.
    fn set(&self, next: ConnectionState) {
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != ConnectionState::Closed as u8).then_some(next as u8)
            });
    }

    fn close(&self) {
        self.0.store(ConnectionState::Closed as u8, Ordering::Release);
    }
}

/// Events a connection reports to its owner.
#[derive(Debug)]
pub enum ConnectionEvent<M> {
    /// A frame was received and parsed.
    Received { id: ConnectionId, message: M },
    /// The connection is gone. Sent exactly once, always last.
    Closed { id: ConnectionId },
}

#[derive(Debug)]
enum CloseReason {
    Local,
    PeerClosed,
    Read(std::io::Error),
    Write(std::io::Error),
    OwnerGone,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("closed locally"),
            Self::PeerClosed => f.write_str("peer closed the connection"),
            Self::Read(e) => write!(f, "read error: {e}"),
            Self::Write(e) => write!(f, "write error: {e}"),
            Self::OwnerGone => f.write_str("owner released the connection"),
        }
    }
}

/// Handle to a running connection task.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    /// Outbound FIFO queue drained by the write loop.
    outbound: mpsc::UnboundedSender<String>,
    state: SharedState,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Connection {
    /// Spawns the read and write loops for `stream` on the current runtime.
    ///
    /// Parsed frames of type `M` and the final close notification are sent to `events`.
    pub fn spawn<S, M>(
        stream: S,
        id: ConnectionId,
        events: mpsc::UnboundedSender<ConnectionEvent<M>>,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
        M: Frame + Send + 'static,
    {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let state = SharedState::new(ConnectionState::Connecting);
        let token = CancellationToken::new();

        let handle = tokio::spawn(run(
            stream,
            id,
            events,
            outbound_rx,
            state.clone(),
            token.clone(),
        ));

        Self {
            id,
            outbound,
            state,
            token,
            handle,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn is_open(&self) -> bool {
        self.state() != ConnectionState::Closed
    }

    /// Queues an already encoded frame. Returns `false` if the connection is closed.
    pub fn enqueue(&self, frame: String) -> bool {
        if !self.is_open() {
            return false;
        }
        self.outbound.send(frame).is_ok()
    }

    /// Signals the task to stop without waiting for it.
    pub fn close(&self) {
        self.token.cancel();
    }

    /// Stops the task and waits for it to finish.
    pub async fn shutdown(self) {
        self.token.cancel();
        let _ = self.handle.await;
    }
}

async fn run<S, M>(
    stream: S,
    id: ConnectionId,
    events: mpsc::UnboundedSender<ConnectionEvent<M>>,
    outbound: mpsc::UnboundedReceiver<String>,
    state: SharedState,
    token: CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    M: Frame + Send + 'static,
{
    let (sink, frames) = Framed::new(stream, LineCodec::new()).split::<String>();
    state.set(ConnectionState::Connected);

    let reason = tokio::select! {
        _ = token.cancelled() => CloseReason::Local,
        reason = read_loop(id, frames, &events) => reason,
        reason = write_loop(sink, outbound, &state) => reason,
    };

    state.close();
    tracing::debug!(connection = %id, "Connection closed: {}", reason);
    let _ = events.send(ConnectionEvent::Closed { id });
}

async fn read_loop<M: Frame>(
    id: ConnectionId,
    mut frames: impl Stream<Item = Result<BytesMut, std::io::Error>> + Unpin,
    events: &mpsc::UnboundedSender<ConnectionEvent<M>>,
) -> CloseReason {
    while let Some(frame) = frames.next().await {
        let line = match frame {
            Ok(line) => line,
            Err(e) => return CloseReason::Read(e),
        };

        let parsed = std::str::from_utf8(&line)
            .map_err(ProtocolError::from)
            .and_then(M::decode);
        match parsed {
            Ok(message) => {
                if events.send(ConnectionEvent::Received { id, message }).is_err() {
                    return CloseReason::OwnerGone;
                }
            }
            Err(e) => {
                tracing::warn!(connection = %id, "Dropping malformed frame: {}", e);
            }
        }
    }
    CloseReason::PeerClosed
}

async fn write_loop(
    mut sink: impl Sink<String, Error = std::io::Error> + Unpin,
    mut outbound: mpsc::UnboundedReceiver<String>,
    state: &SharedState,
) -> CloseReason {
    while let Some(frame) = outbound.recv().await {
        state.set(ConnectionState::Writing);
        if let Err(e) = sink.send(frame).await {
            return CloseReason::Write(e);
        }
        if outbound.is_empty() {
            state.set(ConnectionState::Idle);
        }
    }
    CloseReason::OwnerGone
}
