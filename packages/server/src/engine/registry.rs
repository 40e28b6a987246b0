//! Connection registry owned by the I/O thread.

use std::collections::HashMap;

use natter_shared::{
    Connection, ConnectionId,
    protocol::{Frame, ServerMessage},
};

/// Operations available to connection handlers while they run on the I/O thread.
///
/// Every call applies immediately; there is no round-trip through the command queue.
pub trait Relay {
    /// Queues `message` for one connection. Unknown or closed ids are ignored.
    fn write(&mut self, id: ConnectionId, message: &ServerMessage);

    /// Queues `message` for every open connection.
    fn broadcast(&mut self, message: &ServerMessage);

    /// Binds a username to a connection, replacing any previous binding.
    fn add_username(&mut self, id: ConnectionId, username: String);

    /// Username bound to `id`, if any.
    fn username(&self, id: ConnectionId) -> Option<&str>;

    /// Ids of every registered connection in ascending order.
    fn connection_ids(&self) -> Vec<ConnectionId>;
}

struct Entry {
    connection: Connection,
    username: Option<String>,
}

/// Live connections and their username bindings.
pub(crate) struct Registry {
    entries: HashMap<ConnectionId, Entry>,
    next_id: u64,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::new(),
            next_id: 1,
        }
    }

    /// Hands out the next connection id. Ids are never reused within a run.
    pub(crate) fn allocate_id(&mut self) -> ConnectionId {
        let id = ConnectionId::new(self.next_id);
        self.next_id += 1;
        id
    }

    pub(crate) fn insert(&mut self, connection: Connection) {
        self.entries.insert(
            connection.id(),
            Entry {
                connection,
                username: None,
            },
        );
    }

    pub(crate) fn contains(&self, id: ConnectionId) -> bool {
        self.entries.contains_key(&id)
    }

    pub(crate) fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        self.entries.remove(&id).map(|entry| entry.connection)
    }

    /// Signals every connection to stop. Entries stay registered.
    pub(crate) fn close_all(&self) {
        for entry in self.entries.values() {
            entry.connection.close();
        }
    }

    pub(crate) fn drain(&mut self) -> Vec<Connection> {
        self.entries
            .drain()
            .map(|(_, entry)| entry.connection)
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Queues an encoded frame for one connection.
    pub(crate) fn write_frame(&self, id: ConnectionId, frame: String) {
        match self.entries.get(&id) {
            Some(entry) if entry.connection.enqueue(frame) => {}
            Some(_) => {
                tracing::debug!(connection = %id, "Dropping frame for closed connection");
            }
            None => {
                tracing::debug!(connection = %id, "Dropping frame for unknown connection");
            }
        }
    }

    /// Queues an encoded frame for every open connection.
    pub(crate) fn broadcast_frame(&self, frame: &str) {
        for entry in self.entries.values() {
            if entry.connection.is_open() {
                entry.connection.enqueue(frame.to_owned());
            }
        }
    }
}

impl Relay for Registry {
    fn write(&mut self, id: ConnectionId, message: &ServerMessage) {
        match message.encode() {
            Ok(frame) => self.write_frame(id, frame),
            Err(e) => tracing::error!(connection = %id, "Failed to encode message: {}", e),
        }
    }

    fn broadcast(&mut self, message: &ServerMessage) {
        match message.encode() {
            Ok(frame) => self.broadcast_frame(&frame),
            Err(e) => tracing::error!("Failed to encode broadcast: {}", e),
        }
    }

    fn add_username(&mut self, id: ConnectionId, username: String) {
        match self.entries.get_mut(&id) {
            Some(entry) => entry.username = Some(username),
            None => {
                tracing::warn!(connection = %id, "Cannot bind username {} to unknown connection", username)
            }
        }
    }

    fn username(&self, id: ConnectionId) -> Option<&str> {
        self.entries
            .get(&id)
            .and_then(|entry| entry.username.as_deref())
    }

    fn connection_ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self.entries.keys().copied().collect();
        ids.sort();
        ids
    }
}
