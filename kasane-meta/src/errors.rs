//! メタデータ取得のエラー型

use std::path::PathBuf;
use thiserror::Error;

/// メタデータプロバイダのエラー
#[derive(Debug, Error)]
pub enum MetaError {
    /// 必要なデータを特定できなかった（コンパイラバージョン等）
    #[error("metadata unavailable: {0}")]
    MetadataUnavailable(String),

    /// バイト列が足りずワードを読み取れなかった
    #[error("short read: needed {needed} bytes but only {remaining} remain")]
    ShortRead { needed: usize, remaining: usize },

    /// 指定アドレスのメモリを読み取れなかった
    #[error("failed to read memory at 0x{address:x}: {source}")]
    MemoryRead {
        address: u64,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// サポートされないワードサイズ
    #[error("unsupported word size: {0} (expected 4 or 8)")]
    UnsupportedWordSize(u64),

    /// 不正なコンパイラバージョン文字列
    #[error("invalid Go version string: {0}")]
    InvalidVersion(String),

    /// ファイルの読み込み失敗
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// コンテナ形式のパース失敗
    #[error("failed to parse binary: {0}")]
    Object(#[from] object::Error),

    /// DWARFの読み込み失敗
    #[error("failed to load DWARF: {0}")]
    Dwarf(#[from] gimli::Error),

    /// シンボル名パターンのコンパイル失敗
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Goのメタデータが見つからない
    #[error("not a Go binary: {0}")]
    NotGo(String),
}

impl MetaError {
    /// アドレスと原因メッセージから `MemoryRead` を作成する
    pub fn memory_read(address: u64, reason: impl Into<String>) -> Self {
        let reason: String = reason.into();
        MetaError::MemoryRead {
            address,
            source: reason.into(),
        }
    }
}
