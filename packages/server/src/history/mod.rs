//! チャット履歴の永続化
//!
//! セッション管理が必要とする履歴ストアのインターフェースを定義します。
//! 具体的な実装はサブモジュールが提供します。

mod inmemory;
mod jsonl;

pub use inmemory::InMemoryHistory;
pub use jsonl::JsonLinesHistory;

use natter_shared::protocol::NewMessageReceived;
use thiserror::Error;

/// 履歴ストアのエラー
#[derive(Debug, Error)]
pub enum HistoryError {
    /// ファイル I/O に失敗
    #[error("history I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// レコードのシリアライズに失敗
    #[error("history record could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// 履歴ストア trait
///
/// I/O スレッド上のハンドラから同期的に呼び出されます。
#[cfg_attr(test, mockall::automock)]
pub trait HistoryStore: Send {
    /// メッセージを履歴の末尾に追加
    fn append(&mut self, message: &NewMessageReceived) -> Result<(), HistoryError>;

    /// 保存済みの全メッセージを追加順に取得
    fn list_all(&self) -> Result<Vec<NewMessageReceived>, HistoryError>;
}
