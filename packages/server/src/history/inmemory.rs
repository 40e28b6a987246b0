//! InMemory 履歴ストア実装

use natter_shared::protocol::NewMessageReceived;

use super::{HistoryError, HistoryStore};

/// プロセス内に履歴を保持するストア
///
/// サーバー停止と同時に履歴は失われます。
#[derive(Debug, Default, Clone)]
pub struct InMemoryHistory {
    messages: Vec<NewMessageReceived>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 既存のメッセージで初期化
    pub fn with_messages(messages: impl IntoIterator<Item = NewMessageReceived>) -> Self {
        Self {
            messages: messages.into_iter().collect(),
        }
    }
}

impl HistoryStore for InMemoryHistory {
    fn append(&mut self, message: &NewMessageReceived) -> Result<(), HistoryError> {
        self.messages.push(message.clone());
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<NewMessageReceived>, HistoryError> {
        Ok(self.messages.clone())
    }
}
