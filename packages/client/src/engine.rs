//! TCP client engine.
//!
//! [`ClientEngine`] keeps one connection to a relay server on a dedicated I/O thread
//! running a current-thread tokio runtime. Handlers run on that thread; the public API
//! may be called from any thread.

use std::{
    io,
    net::SocketAddr,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
};

use natter_shared::{
    Connection, ConnectionEvent, ConnectionId,
    protocol::{ClientMessage, Frame, ServerMessage},
};
use tokio::{
    net::{TcpStream, lookup_host},
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;

use crate::error::ClientError;

const IO_THREAD_NAME: &str = "natter-client-io";

/// The client only ever has one connection.
const CLIENT_CONNECTION_ID: ConnectionId = ConnectionId::new(0);

pub type ConnectHandler = Box<dyn FnMut(&mut ClientLink<'_>) + Send>;
pub type DisconnectHandler = Box<dyn FnMut() + Send>;
pub type MessageHandler = Box<dyn FnMut(&mut ClientLink<'_>, ServerMessage) + Send>;

/// Access to the live connection from inside a handler.
pub struct ClientLink<'a> {
    connection: &'a Connection,
}

impl<'a> ClientLink<'a> {
    fn new(connection: &'a Connection) -> Self {
        Self { connection }
    }

    /// Queues `message` on the connection. Returns `false` if it is already closed.
    pub fn write(&mut self, message: &ClientMessage) -> bool {
        match message.encode() {
            Ok(frame) => self.connection.enqueue(frame),
            Err(e) => {
                tracing::error!("Failed to encode message: {}", e);
                false
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.connection.is_open()
    }
}

#[derive(Default)]
struct Callbacks {
    connect: Option<ConnectHandler>,
    disconnect: Option<DisconnectHandler>,
    message: Option<MessageHandler>,
}

impl Callbacks {
    fn connected(&mut self, link: &mut ClientLink<'_>) {
        if let Some(handler) = self.connect.as_mut() {
            handler(link);
        }
    }

    fn disconnected(&mut self) {
        if let Some(handler) = self.disconnect.as_mut() {
            handler();
        }
    }

    fn received(&mut self, link: &mut ClientLink<'_>, message: ServerMessage) {
        if let Some(handler) = self.message.as_mut() {
            handler(link, message);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct IoThread {
    outbound: mpsc::UnboundedSender<String>,
    token: CancellationToken,
    /// Cleared by the session before it reports the disconnect.
    running: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Chat client connection manager.
pub struct ClientEngine {
    callbacks: Arc<Mutex<Callbacks>>,
    connected: Arc<AtomicBool>,
    io: Mutex<Option<IoThread>>,
}

impl ClientEngine {
    pub fn new() -> Self {
        Self {
            callbacks: Arc::new(Mutex::new(Callbacks::default())),
            connected: Arc::new(AtomicBool::new(false)),
            io: Mutex::new(None),
        }
    }

    /// Starts connecting to `host:port` in the background.
    ///
    /// Does nothing while a previous connection is still running. Resolve and connect
    /// failures are reported through `on_disconnect`; only a failure to spawn the I/O
    /// thread is returned.
    pub fn connect(&self, host: &str, port: u16) -> Result<(), ClientError> {
        let mut io = lock(&self.io);
        if let Some(previous) = io.take() {
            if previous.running.load(Ordering::Acquire) {
                *io = Some(previous);
                return Ok(());
            }
            // The previous session has ended; its thread may still be returning from
            // `on_disconnect`, possibly this very call.
            if std::thread::current().id() != previous.thread.thread().id()
                && previous.thread.join().is_err()
            {
                tracing::error!("I/O thread panicked");
            }
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let running = Arc::new(AtomicBool::new(true));
        let session = IoSession {
            host: host.to_string(),
            port,
            outbound: outbound_rx,
            callbacks: Arc::clone(&self.callbacks),
            connected: Arc::clone(&self.connected),
            running: Arc::clone(&running),
            token: token.clone(),
        };

        let thread = std::thread::Builder::new()
            .name(IO_THREAD_NAME.to_string())
            .spawn(move || session.run_blocking())
            .map_err(ClientError::ThreadSpawn)?;

        *io = Some(IoThread {
            outbound: outbound_tx,
            token,
            running,
            thread,
        });
        Ok(())
    }

    /// Closes the connection and joins the I/O thread. Idempotent.
    pub fn stop(&self) {
        let Some(io) = lock(&self.io).take() else {
            return;
        };

        io.token.cancel();
        if std::thread::current().id() == io.thread.thread().id() {
            // Called from a handler; the session ends once the handler returns.
            return;
        }
        if io.thread.join().is_err() {
            tracing::error!("I/O thread panicked");
        }
        self.connected.store(false, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Sends `message` to the server. Dropped when not connected.
    pub fn write(&self, message: &ClientMessage) {
        if !self.is_connected() {
            tracing::debug!("Not connected, dropping header {}", message.header());
            return;
        }

        let frame = match message.encode() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!("Failed to encode message: {}", e);
                return;
            }
        };
        if let Some(io) = lock(&self.io).as_ref() {
            let _ = io.outbound.send(frame);
        }
    }

    pub fn on_connect<F>(&self, handler: F)
    where
        F: FnMut(&mut ClientLink<'_>) + Send + 'static,
    {
        lock(&self.callbacks).connect = Some(Box::new(handler));
    }

    pub fn on_disconnect<F>(&self, handler: F)
    where
        F: FnMut() + Send + 'static,
    {
        lock(&self.callbacks).disconnect = Some(Box::new(handler));
    }

    pub fn on_message<F>(&self, handler: F)
    where
        F: FnMut(&mut ClientLink<'_>, ServerMessage) + Send + 'static,
    {
        lock(&self.callbacks).message = Some(Box::new(handler));
    }
}

impl Default for ClientEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ClientEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Resolves `host`, preferring an IPv4 address, and connects.
async fn open(host: &str, port: u16) -> io::Result<TcpStream> {
    let addrs: Vec<SocketAddr> = lookup_host((host, port)).await?.collect();
    let addr = addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no address found for {host}"))
        })?;
    tracing::debug!("Resolved {} to {}", host, addr);
    TcpStream::connect(addr).await
}

/// Everything the I/O thread owns for one connection attempt.
struct IoSession {
    host: String,
    port: u16,
    outbound: mpsc::UnboundedReceiver<String>,
    callbacks: Arc<Mutex<Callbacks>>,
    connected: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    token: CancellationToken,
}

impl IoSession {
    /// Marks the session as over, then reports it. A `connect` issued from
    /// `on_disconnect` therefore starts a new session.
    fn finish(&self) {
        self.connected.store(false, Ordering::Release);
        self.running.store(false, Ordering::Release);
        lock(&self.callbacks).disconnected();
    }

    fn run_blocking(self) {
        match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime.block_on(self.run()),
            Err(e) => {
                tracing::error!("Failed to build I/O runtime: {}", e);
                self.finish();
            }
        }
    }

    async fn run(mut self) {
        let opened = tokio::select! {
            _ = self.token.cancelled() => {
                self.running.store(false, Ordering::Release);
                return;
            }
            opened = open(&self.host, self.port) => opened,
        };
        let stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!("Failed to connect to {}:{}: {}", self.host, self.port, e);
                self.finish();
                return;
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Failed to set TCP_NODELAY: {}", e);
        }

        let (events_tx, mut events) = mpsc::unbounded_channel::<ConnectionEvent<ServerMessage>>();
        let connection = Connection::spawn(stream, CLIENT_CONNECTION_ID, events_tx);
        self.connected.store(true, Ordering::Release);
        tracing::info!("Connected to {}:{}", self.host, self.port);
        lock(&self.callbacks).connected(&mut ClientLink::new(&connection));

        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                Some(frame) = self.outbound.recv() => {
                    if !connection.enqueue(frame) {
                        tracing::debug!("Connection closed, dropping outgoing frame");
                    }
                }
                event = events.recv() => match event {
                    Some(ConnectionEvent::Received { message, .. }) => {
                        tracing::debug!("Received header {}", message.header());
                        lock(&self.callbacks).received(&mut ClientLink::new(&connection), message);
                    }
                    Some(ConnectionEvent::Closed { .. }) | None => {
                        tracing::info!("Disconnected from server");
                        self.finish();
                        return;
                    }
                },
            }
        }

        self.connected.store(false, Ordering::Release);
        connection.shutdown().await;
        tracing::info!("Connection closed");
        self.finish();
    }
}
