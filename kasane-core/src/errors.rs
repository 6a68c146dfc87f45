//! コアのエラー型

use kasane_meta::MetaError;
use kasane_session::SessionError;
use thiserror::Error;

/// コア操作のエラー
#[derive(Debug, Error)]
pub enum Error {
    /// メタデータの取得失敗
    #[error(transparent)]
    Meta(#[from] MetaError),

    /// セッションとのやり取りの失敗
    #[error(transparent)]
    Session(#[from] SessionError),

    /// デコード中のメモリ読み取り失敗
    #[error("failed to read memory at 0x{address:x}: {source}")]
    MemoryRead {
        address: u64,
        #[source]
        source: MetaError,
    },

    /// 指定アドレスに型がない
    #[error("no type found at 0x{0:x}")]
    AddressNotFound(u64),

    /// 数値引数のパース失敗
    #[error("invalid number '{input}': {reason}")]
    InvalidNumber { input: String, reason: String },
}
