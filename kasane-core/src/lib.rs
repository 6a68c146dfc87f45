//! Kasane のコア機能
//!
//! このクレートは、Goバイナリから復元したメタデータを解析セッションへ投影する中核ロジックを提供します。
//! シンボル名の正規化、アドレス補正、シンボル登録、ソース行の注釈、型の解決、
//! メモリ上の文字列配列のデコードを行います。

pub mod config;
pub mod errors;
pub mod sanitize;
pub mod decode;
pub mod correction;
pub mod applier;
pub mod annotate;
pub mod resolve;
pub mod bridge;
pub mod command;
pub mod parse;

pub use config::{Config, LineMode, PackageFilter};
pub use errors::Error;
pub use sanitize::sanitize;
pub use decode::{read_string_array, StringArray};
pub use correction::{compute_correction, detect_correction};
pub use applier::{symbol_records, type_records, ApplyReport, SymbolApplier, SymbolKind, SymbolRecord};
pub use annotate::{annotate, annotate_current_function, line_spans, CorrectedLookup, LineSpan};
pub use resolve::{render_type, TypeResolver};
pub use bridge::{initial_analysis, AnalysisReport};
pub use command::Command;

/// コア操作の結果型
pub type Result<T> = std::result::Result<T, Error>;
