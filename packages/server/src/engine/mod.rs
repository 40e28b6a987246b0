//! TCP relay engine.
//!
//! [`ServerEngine`] accepts connections on a dedicated I/O thread running a current-thread
//! tokio runtime. The thread owns the connection registry and dispatches every connection
//! event to the registered handlers, so handlers never race each other. Public methods may
//! be called from any thread; they encode on the caller's thread and post a command to the
//! I/O thread.

mod handler;
mod registry;

pub use handler::{ConnectHandler, DisconnectHandler, MessageHandler, ServerHandler};
pub use registry::Relay;

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex, mpsc as std_mpsc},
    thread::JoinHandle,
    time::Duration,
};

use futures_util::future::join_all;
use natter_shared::{
    Connection, ConnectionEvent, ConnectionId,
    protocol::{ClientMessage, Frame, ServerMessage},
};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;

use crate::{config::ServerConfig, error::ServerError};
use handler::{Callbacks, lock};
use registry::Registry;

const IO_THREAD_NAME: &str = "natter-server-io";

/// Pause after a failed accept so a persistent error (e.g. EMFILE) does not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Requests posted to the I/O thread by the public API.
#[derive(Debug)]
enum Command {
    Write { id: ConnectionId, frame: String },
    Broadcast { frame: String },
    AddUsername { id: ConnectionId, username: String },
    GetUsername {
        id: ConnectionId,
        reply: std_mpsc::SyncSender<Option<String>>,
    },
}

struct IoThread {
    commands: mpsc::UnboundedSender<Command>,
    token: CancellationToken,
    thread: JoinHandle<()>,
    local_addr: SocketAddr,
}

impl IoThread {
    /// The loop has exited without `stop`, e.g. after a handler panicked.
    fn has_exited(&self) -> bool {
        self.thread.is_finished()
    }

    fn is_current(&self) -> bool {
        std::thread::current().id() == self.thread.thread().id()
    }
}

/// Chat relay server.
pub struct ServerEngine {
    config: ServerConfig,
    callbacks: Arc<Mutex<Callbacks>>,
    io: Mutex<Option<IoThread>>,
}

impl ServerEngine {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            callbacks: Arc::new(Mutex::new(Callbacks::default())),
            io: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Binds the listener and starts the I/O thread.
    ///
    /// Returns the bound address. Calling `start` on a running engine does nothing and
    /// returns the address it is already bound to.
    pub fn start(&self) -> Result<SocketAddr, ServerError> {
        let mut io = lock(&self.io);
        if let Some(previous) = io.take() {
            if !previous.has_exited() {
                let local_addr = previous.local_addr;
                *io = Some(previous);
                return Ok(local_addr);
            }
            tracing::warn!("I/O thread exited unexpectedly, restarting");
            if previous.thread.join().is_err() {
                tracing::error!("I/O thread panicked");
            }
        }

        let bind_addr = self.config.bind_address();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let (ready_tx, ready_rx) = std_mpsc::sync_channel(1);

        let callbacks = Arc::clone(&self.callbacks);
        let loop_token = token.clone();
        let thread = std::thread::Builder::new()
            .name(IO_THREAD_NAME.to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(ServerError::Runtime(e)));
                        return;
                    }
                };

                runtime.block_on(async move {
                    let listener = match bind(&bind_addr).await {
                        Ok(listener) => listener,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                    let local_addr = match listener.local_addr() {
                        Ok(addr) => addr,
                        Err(source) => {
                            let _ = ready_tx.send(Err(ServerError::Bind {
                                addr: bind_addr,
                                source,
                            }));
                            return;
                        }
                    };
                    let _ = ready_tx.send(Ok(local_addr));

                    IoLoop::new(listener, commands_rx, callbacks, loop_token)
                        .run()
                        .await;
                });
            })
            .map_err(ServerError::ThreadSpawn)?;

        let local_addr = match ready_rx.recv() {
            Ok(Ok(addr)) => addr,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(ServerError::IoThreadExited);
            }
        };

        tracing::info!("Server listening on {}", local_addr);
        *io = Some(IoThread {
            commands: commands_tx,
            token,
            thread,
            local_addr,
        });
        Ok(local_addr)
    }

    /// Stops accepting, fires `on_disconnect` for every live connection and joins the
    /// I/O thread. Idempotent.
    pub fn stop(&self) {
        let Some(io) = lock(&self.io).take() else {
            return;
        };

        io.token.cancel();
        if io.is_current() {
            // Called from a handler; the loop exits once the handler returns.
            return;
        }
        if io.thread.join().is_err() {
            tracing::error!("I/O thread panicked");
        }
        tracing::info!("Server stopped");
    }

    pub fn is_running(&self) -> bool {
        lock(&self.io).as_ref().is_some_and(|io| !io.has_exited())
    }

    /// Address the listener is bound to while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        lock(&self.io)
            .as_ref()
            .filter(|io| !io.has_exited())
            .map(|io| io.local_addr)
    }

    /// Sends `message` to one connection. Unknown ids are ignored.
    pub fn write(&self, id: ConnectionId, message: &ServerMessage) {
        match message.encode() {
            Ok(frame) => {
                self.post(Command::Write { id, frame });
            }
            Err(e) => tracing::error!(connection = %id, "Failed to encode message: {}", e),
        }
    }

    /// Sends `message` to every open connection.
    pub fn broadcast(&self, message: &ServerMessage) {
        match message.encode() {
            Ok(frame) => {
                self.post(Command::Broadcast { frame });
            }
            Err(e) => tracing::error!("Failed to encode broadcast: {}", e),
        }
    }

    pub fn add_username(&self, id: ConnectionId, username: impl Into<String>) {
        self.post(Command::AddUsername {
            id,
            username: username.into(),
        });
    }

    /// Looks up the username bound to `id`.
    ///
    /// Blocks until the I/O thread answers. Handlers run on that thread and would wait on
    /// themselves, so a call from a handler logs an error and returns `None`; handlers use
    /// [`Relay::username`] instead.
    pub fn get_username(&self, id: ConnectionId) -> Option<String> {
        let (reply, answer) = std_mpsc::sync_channel(1);
        {
            let io = lock(&self.io);
            let Some(io) = io.as_ref() else {
                tracing::debug!(connection = %id, "Server is not running, no username to look up");
                return None;
            };
            if io.is_current() {
                tracing::error!(
                    connection = %id,
                    "get_username called from a handler, use Relay::username instead"
                );
                return None;
            }
            if io.commands.send(Command::GetUsername { id, reply }).is_err() {
                return None;
            }
        }
        answer.recv().ok().flatten()
    }

    pub fn on_connect<F>(&self, handler: F)
    where
        F: FnMut(&mut dyn Relay, ConnectionId) + Send + 'static,
    {
        lock(&self.callbacks).connect = Some(Box::new(handler));
    }

    pub fn on_disconnect<F>(&self, handler: F)
    where
        F: FnMut(&mut dyn Relay, ConnectionId) + Send + 'static,
    {
        lock(&self.callbacks).disconnect = Some(Box::new(handler));
    }

    pub fn on_message<F>(&self, handler: F)
    where
        F: FnMut(&mut dyn Relay, ConnectionId, ClientMessage) + Send + 'static,
    {
        lock(&self.callbacks).message = Some(Box::new(handler));
    }

    /// Routes all three events to `handler`, replacing any registered callbacks.
    ///
    /// Returns a shared handle so the caller can inspect the handler's state.
    pub fn set_handler<H: ServerHandler>(&self, handler: H) -> Arc<Mutex<H>> {
        let shared = Arc::new(Mutex::new(handler));

        let on_connect = Arc::clone(&shared);
        let on_disconnect = Arc::clone(&shared);
        let on_message = Arc::clone(&shared);

        let mut callbacks = lock(&self.callbacks);
        callbacks.connect = Some(Box::new(
            move |relay: &mut dyn Relay, id: ConnectionId| {
                lock(&on_connect).on_connect(relay, id);
            },
        ));
        callbacks.disconnect = Some(Box::new(
            move |relay: &mut dyn Relay, id: ConnectionId| {
                lock(&on_disconnect).on_disconnect(relay, id);
            },
        ));
        callbacks.message = Some(Box::new(
            move |relay: &mut dyn Relay, id: ConnectionId, message: ClientMessage| {
                lock(&on_message).on_message(relay, id, message);
            },
        ));

        shared
    }

    /// Returns `false` when the engine is not running.
    fn post(&self, command: Command) -> bool {
        match lock(&self.io).as_ref() {
            Some(io) => io.commands.send(command).is_ok(),
            None => {
                tracing::debug!("Server is not running, dropping {:?}", command);
                false
            }
        }
    }
}

impl Drop for ServerEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn bind(addr: &str) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })
}

async fn back_off_after_accept_error(error: &std::io::Error) {
    tracing::warn!("Failed to accept connection: {}", error);
    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
}

/// The actor running on the I/O thread.
struct IoLoop {
    listener: TcpListener,
    commands: mpsc::UnboundedReceiver<Command>,
    callbacks: Arc<Mutex<Callbacks>>,
    token: CancellationToken,
    registry: Registry,
}

impl IoLoop {
    fn new(
        listener: TcpListener,
        commands: mpsc::UnboundedReceiver<Command>,
        callbacks: Arc<Mutex<Callbacks>>,
        token: CancellationToken,
    ) -> Self {
        Self {
            listener,
            commands,
            callbacks,
            token,
            registry: Registry::new(),
        }
    }

    async fn run(mut self) {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.accept(stream, peer, &events_tx),
                    Err(e) => back_off_after_accept_error(&e).await,
                },
                Some(command) = self.commands.recv() => self.apply(command),
                Some(event) = events_rx.recv() => self.dispatch(event),
            }
        }

        self.shutdown().await;
    }

    fn accept(
        &mut self,
        stream: TcpStream,
        peer: SocketAddr,
        events: &mpsc::UnboundedSender<ConnectionEvent<ClientMessage>>,
    ) {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Failed to set TCP_NODELAY for {}: {}", peer, e);
        }

        let id = self.registry.allocate_id();
        self.registry
            .insert(Connection::spawn(stream, id, events.clone()));
        tracing::info!(connection = %id, "Accepted connection from {}", peer);

        lock(&self.callbacks).connected(&mut self.registry, id);
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Write { id, frame } => self.registry.write_frame(id, frame),
            Command::Broadcast { frame } => self.registry.broadcast_frame(&frame),
            Command::AddUsername { id, username } => self.registry.add_username(id, username),
            Command::GetUsername { id, reply } => {
                let _ = reply.send(self.registry.username(id).map(str::to_owned));
            }
        }
    }

    fn dispatch(&mut self, event: ConnectionEvent<ClientMessage>) {
        match event {
            ConnectionEvent::Received { id, message } => {
                tracing::debug!(connection = %id, "Received header {}", message.header());
                lock(&self.callbacks).received(&mut self.registry, id, message);
            }
            ConnectionEvent::Closed { id } => {
                if !self.registry.contains(id) {
                    return;
                }
                lock(&self.callbacks).disconnected(&mut self.registry, id);
                self.registry.remove(id);
                tracing::info!(connection = %id, "Connection closed");
            }
        }
    }

    async fn shutdown(mut self) {
        tracing::debug!("Closing {} connection(s)", self.registry.len());
        self.registry.close_all();

        {
            let mut callbacks = lock(&self.callbacks);
            for id in self.registry.connection_ids() {
                callbacks.disconnected(&mut self.registry, id);
            }
        }

        join_all(self.registry.drain().into_iter().map(Connection::shutdown)).await;
    }
}
