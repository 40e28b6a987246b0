//! Handler registration for connection events.

use std::sync::{Mutex, MutexGuard, PoisonError};

use natter_shared::{ConnectionId, protocol::ClientMessage};

use super::registry::Relay;

pub type ConnectHandler = Box<dyn FnMut(&mut dyn Relay, ConnectionId) + Send>;
pub type DisconnectHandler = Box<dyn FnMut(&mut dyn Relay, ConnectionId) + Send>;
pub type MessageHandler = Box<dyn FnMut(&mut dyn Relay, ConnectionId, ClientMessage) + Send>;

/// Listener receiving every connection event of a server engine.
///
/// All methods run on the I/O thread, one at a time, in the order the events happened.
/// `on_disconnect` runs while the connection is still registered, so its username can
/// still be looked up through the relay.
pub trait ServerHandler: Send + 'static {
    fn on_connect(&mut self, relay: &mut dyn Relay, id: ConnectionId) {
        let _ = (relay, id);
    }

    fn on_disconnect(&mut self, relay: &mut dyn Relay, id: ConnectionId) {
        let _ = (relay, id);
    }

    fn on_message(&mut self, relay: &mut dyn Relay, id: ConnectionId, message: ClientMessage);
}

/// One slot per event kind. Registering again replaces the previous handler.
#[derive(Default)]
pub(crate) struct Callbacks {
    pub(crate) connect: Option<ConnectHandler>,
    pub(crate) disconnect: Option<DisconnectHandler>,
    pub(crate) message: Option<MessageHandler>,
}

impl Callbacks {
    pub(crate) fn connected(&mut self, relay: &mut dyn Relay, id: ConnectionId) {
        if let Some(handler) = self.connect.as_mut() {
            handler(relay, id);
        }
    }

    pub(crate) fn disconnected(&mut self, relay: &mut dyn Relay, id: ConnectionId) {
        if let Some(handler) = self.disconnect.as_mut() {
            handler(relay, id);
        }
    }

    pub(crate) fn received(&mut self, relay: &mut dyn Relay, id: ConnectionId, message: ClientMessage) {
        match self.message.as_mut() {
            Some(handler) => handler(relay, id, message),
            None => tracing::debug!(connection = %id, "No message handler registered"),
        }
    }
}

/// Locks `mutex`, recovering the data if a handler panicked while holding it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
