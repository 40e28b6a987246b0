//! Client-side view of the chat.

use std::collections::BTreeMap;

use natter_shared::protocol::{
    NewMessageReceived, ResponseCode, ServerMessage, StatusKind, UserColor, UserStatus,
};

/// Last known presence of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Presence {
    pub status: StatusKind,
    pub color: UserColor,
    /// When the status last changed (Unix seconds)
    pub since: u64,
}

/// Messages and presence as received from the server.
#[derive(Debug, Default)]
pub struct ChatState {
    messages: Vec<NewMessageReceived>,
    users: BTreeMap<String, Presence>,
    last_response: Option<ResponseCode>,
}

impl ChatState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one server message.
    pub fn apply(&mut self, message: &ServerMessage) {
        match message {
            ServerMessage::NewMessageReceived(received) => {
                // History replay arrives before any status, so this is routine on connect.
                if !self.users.contains_key(&received.username) {
                    tracing::debug!(
                        "Message from unknown user '{}', rendering without color",
                        received.username
                    );
                }
                self.messages.push(received.clone());
            }
            ServerMessage::UserStatus(UserStatus {
                username,
                status,
                color,
                timestamp,
            }) => {
                self.users.insert(
                    username.clone(),
                    Presence {
                        status: *status,
                        color: *color,
                        since: *timestamp,
                    },
                );
            }
            ServerMessage::ServerResponse(response) => {
                self.last_response = Some(response.code);
            }
        }
    }

    /// Chat messages in arrival order.
    pub fn messages(&self) -> &[NewMessageReceived] {
        &self.messages
    }

    /// Known users ordered by name.
    pub fn users(&self) -> impl Iterator<Item = (&str, &Presence)> {
        self.users.iter().map(|(name, presence)| (name.as_str(), presence))
    }

    pub fn presence(&self, username: &str) -> Option<&Presence> {
        self.users.get(username)
    }

    pub fn color_of(&self, username: &str) -> Option<UserColor> {
        self.users.get(username).map(|presence| presence.color)
    }

    pub fn last_response(&self) -> Option<ResponseCode> {
        self.last_response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use natter_shared::protocol::ServerResponse;
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    /// ログ出力を蓄えるだけの writer
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// `f` の実行中に出た TRACE 以上のログを文字列で返す
    fn capture_logs(f: impl FnOnce()) -> String {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = logs.0.lock().unwrap();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    fn status(username: &str, status: StatusKind, color: UserColor) -> ServerMessage {
        UserStatus {
            username: username.to_string(),
            status,
            color,
            timestamp: 10,
        }
        .into()
    }

    fn chat(username: &str, text: &str) -> ServerMessage {
        NewMessageReceived {
            username: username.to_string(),
            text: text.to_string(),
            timestamp: 11,
        }
        .into()
    }

    #[test]
    fn test_status_updates_replace_presence() {
        // テスト項目: 状態通知でユーザーの状態と色が更新される
        // given (前提条件):
        let mut state = ChatState::new();
        let red = UserColor::new(200, 10, 10);

        // when (操作):
        state.apply(&status("alice", StatusKind::Online, red));
        state.apply(&status("alice", StatusKind::Offline, red));

        // then (期待する結果):
        assert_eq!(state.presence("alice").unwrap().status, StatusKind::Offline);
        assert_eq!(state.color_of("alice"), Some(red));
        assert_eq!(state.users().count(), 1);
    }

    #[test]
    fn test_messages_are_kept_in_order() {
        // テスト項目: 未知のユーザーからのメッセージも含め、受信順に保持される
        // given (前提条件):
        let mut state = ChatState::new();
        state.apply(&status("alice", StatusKind::Online, UserColor::new(1, 2, 3)));

        // when (操作):
        state.apply(&chat("alice", "first"));
        state.apply(&chat("stranger", "second"));

        // then (期待する結果):
        let texts: Vec<_> = state.messages().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
        assert_eq!(state.color_of("stranger"), None);
    }

    #[test]
    fn test_history_replay_before_statuses_is_not_an_error() {
        // テスト項目: 接続直後の履歴再送 (状態通知より先に届く) はエラーログにならない
        // given (前提条件):
        let mut state = ChatState::new();

        // when (操作):
        let logs = capture_logs(|| {
            state.apply(&chat("alice", "from history"));
            state.apply(&status("alice", StatusKind::Online, UserColor::new(1, 2, 3)));
        });

        // then (期待する結果):
        assert!(!logs.contains("ERROR"), "logs: {logs}");
        assert!(logs.contains("DEBUG"), "logs: {logs}");
        assert_eq!(state.messages().len(), 1);
        assert_eq!(state.color_of("alice"), Some(UserColor::new(1, 2, 3)));
    }

    #[test]
    fn test_server_response_is_recorded() {
        // テスト項目: サーバー応答のコードが記録される
        // given (前提条件):
        let mut state = ChatState::new();

        // when (操作):
        state.apply(
            &ServerResponse {
                code: ResponseCode::IncorrectPassword,
            }
            .into(),
        );

        // then (期待する結果):
        assert_eq!(state.last_response(), Some(ResponseCode::IncorrectPassword));
    }
}
