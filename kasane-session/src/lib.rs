//! Kasane 解析セッションクライアント
//!
//! このクレートは、外部の解析ツール（radare2）とパイプ越しに同期的にやり取りするための
//! 機能を提供します。コマンドの送受信、JSON応答のデコード、
//! セッション経由のメモリ読み取りを行います。

pub mod errors;
pub mod pipe;
pub mod session;
pub mod memory;

pub use errors::SessionError;
pub use pipe::{in_session, Channel, PipeChannel};
pub use session::{FunctionInfo, OpenFile, Operation, SectionInfo, Session};

/// セッション操作の結果型
pub type Result<T> = std::result::Result<T, SessionError>;
