//! セッション・プレゼンス管理
//!
//! 接続とユーザー名を結び付け、ユーザーごとの状態と表示色を保持します。
//! [`ServerHandler`] として [`crate::ServerEngine`] に登録して使います。
//!
//! ## 初回接続時の送信順序
//!
//! 1. 履歴を古い順に本人へ送信
//! 2. 既知の全ユーザーの状態をユーザー名順に本人へ送信
//! 3. 本人の ONLINE を全接続へブロードキャスト

mod palette;

pub use palette::PALETTE;

use std::collections::BTreeMap;

use natter_shared::{
    ConnectionId,
    protocol::{
        ClientMessage, NewMessageReceived, ServerMessage, StatusKind, UserColor, UserStatus,
    },
    time::{Clock, SystemClock},
};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    engine::{Relay, ServerHandler},
    history::HistoryStore,
};

/// ユーザーごとのプレゼンス情報
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserRecord {
    pub status: StatusKind,
    /// 初回接続時に決まり、以降は変わらない
    pub color: UserColor,
    /// 最後に状態が変わった時刻（Unix 秒）
    pub since: u64,
}

impl UserRecord {
    fn status_message(&self, username: &str) -> ServerMessage {
        UserStatus {
            username: username.to_string(),
            status: self.status,
            color: self.color,
            timestamp: self.since,
        }
        .into()
    }
}

/// プレゼンスと履歴を管理するハンドラ
pub struct SessionManager {
    /// ユーザー名順に並ぶ既知ユーザー
    users: BTreeMap<String, UserRecord>,
    history: Box<dyn HistoryStore>,
    clock: Box<dyn Clock>,
    rng: StdRng,
}

impl SessionManager {
    pub fn new(
        history: impl HistoryStore + 'static,
        clock: impl Clock + 'static,
        rng: StdRng,
    ) -> Self {
        Self {
            users: BTreeMap::new(),
            history: Box::new(history),
            clock: Box::new(clock),
            rng,
        }
    }

    /// システム時計と OS 由来のシードで作成
    pub fn with_history(history: impl HistoryStore + 'static) -> Self {
        Self::new(history, SystemClock, StdRng::from_os_rng())
    }

    pub fn user(&self, username: &str) -> Option<&UserRecord> {
        self.users.get(username)
    }

    /// 既知の全ユーザー（ユーザー名順）
    pub fn users(&self) -> impl Iterator<Item = (&str, &UserRecord)> {
        self.users.iter().map(|(name, record)| (name.as_str(), record))
    }

    fn pick_color(&mut self) -> UserColor {
        PALETTE[self.rng.random_range(0..PALETTE.len())]
    }

    fn handle_initial_connection(&mut self, relay: &mut dyn Relay, id: ConnectionId, username: String) {
        let now = self.clock.now_secs();
        let color = match self.users.get(&username) {
            Some(record) => record.color,
            None => self.pick_color(),
        };
        let record = UserRecord {
            status: StatusKind::Online,
            color,
            since: now,
        };
        self.users.insert(username.clone(), record);
        tracing::info!(connection = %id, "User {} is online", username);

        match self.history.list_all() {
            Ok(messages) => {
                for message in messages {
                    relay.write(id, &ServerMessage::from(message));
                }
            }
            Err(e) => tracing::error!(connection = %id, "Failed to load chat history: {}", e),
        }

        for (name, known) in &self.users {
            relay.write(id, &known.status_message(name));
        }

        relay.add_username(id, username.clone());
        relay.broadcast(&record.status_message(&username));
    }

    fn handle_new_message(&mut self, relay: &mut dyn Relay, id: ConnectionId, text: String) {
        let username = match relay.username(id) {
            Some(name) => name.to_string(),
            None => {
                tracing::error!(connection = %id, "Message from connection without a username");
                String::new()
            }
        };

        let message = NewMessageReceived {
            username,
            text,
            timestamp: self.clock.now_secs(),
        };
        if let Err(e) = self.history.append(&message) {
            tracing::error!(connection = %id, "Failed to store message: {}", e);
        }
        relay.broadcast(&ServerMessage::from(message));
    }

    fn handle_disconnect(&mut self, relay: &mut dyn Relay, id: ConnectionId) {
        let Some(username) = relay.username(id).map(str::to_string) else {
            tracing::error!(connection = %id, "Disconnected connection had no username");
            return;
        };

        let now = self.clock.now_secs();
        let color = match self.users.get(&username) {
            Some(record) => record.color,
            None => self.pick_color(),
        };
        let record = UserRecord {
            status: StatusKind::Offline,
            color,
            since: now,
        };
        self.users.insert(username.clone(), record);
        let status = record.status_message(&username);

        tracing::info!(connection = %id, "User {} is offline", username);
        relay.broadcast(&status);
    }
}

impl ServerHandler for SessionManager {
    fn on_connect(&mut self, _relay: &mut dyn Relay, id: ConnectionId) {
        tracing::debug!(connection = %id, "Waiting for initial connection message");
    }

    fn on_disconnect(&mut self, relay: &mut dyn Relay, id: ConnectionId) {
        self.handle_disconnect(relay, id);
    }

    fn on_message(&mut self, relay: &mut dyn Relay, id: ConnectionId, message: ClientMessage) {
        match message {
            ClientMessage::InitialConnection(content) => {
                self.handle_initial_connection(relay, id, content.username)
            }
            ClientMessage::NewMessage(content) => self.handle_new_message(relay, id, content.text),
            ClientMessage::Login(credentials) => {
                tracing::info!(connection = %id, "Ignoring login request for {}", credentials.username)
            }
            ClientMessage::Register(credentials) => {
                tracing::info!(connection = %id, "Ignoring registration request for {}", credentials.username)
            }
        }
    }
}
