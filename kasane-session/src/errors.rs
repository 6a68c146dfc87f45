//! セッションのエラー型

use thiserror::Error;

/// 解析セッションとのやり取りで発生するエラー
#[derive(Debug, Error)]
pub enum SessionError {
    /// パイプの読み書きに失敗した
    #[error("session I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// 応答が想定した形式ではない、またはパイプが閉じられた
    #[error("session protocol error: {0}")]
    Protocol(String),

    /// JSON応答のデコード失敗
    #[error("failed to decode reply to `{command}`: {source}")]
    Json {
        command: String,
        #[source]
        source: serde_json::Error,
    },

    /// 16進応答のデコード失敗
    #[error("invalid hex in reply to `{command}`: {source}")]
    Hex {
        command: String,
        #[source]
        source: hex::FromHexError,
    },

    /// セッションで関数が選択されていない
    #[error("no active function in the session")]
    NoActiveFunction,

    /// 継承したパイプのディスクリプタが無効
    #[error("invalid pipe descriptor {fd}: {source}")]
    Descriptor {
        fd: i32,
        #[source]
        source: nix::errno::Errno,
    },
}
