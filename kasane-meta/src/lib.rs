//! Kasane Goバイナリメタデータ
//!
//! このクレートは、コンパイル済みGoバイナリから復元したメタデータを提供します。
//! パッケージ・関数・メソッド・型の列挙、moduledataのセクション境界、
//! PCからソース行への変換、ワードサイズとバイトオーダーを考慮したメモリ読み取りを扱います。

pub mod errors;
pub mod memory;
pub mod loader;
pub mod symbols;
pub mod lines;
pub mod type_info;
pub mod moduledata;
pub mod version;
pub mod provider;

pub use errors::MetaError;
pub use memory::{FileInfo, MemoryReader, WordReader, WordSize};
pub use loader::GoFile;
pub use symbols::{Function, Method, Package, PackageClass, PackageSet};
pub use lines::{LineInfo, LineLookup};
pub use type_info::{GoType, InterfaceMethod, Kind, StructField, TypeKind, TypeMethod};
pub use moduledata::{ModuleData, ModuleDataSection, SectionKind};
pub use version::GoVersion;
pub use provider::MetadataProvider;

// 呼び出し側がバイトオーダーを指定できるように再エクスポート
pub use gimli::RunTimeEndian;

/// メタデータ取得の結果型
pub type Result<T> = std::result::Result<T, MetaError>;
