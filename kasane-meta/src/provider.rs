//! メタデータプロバイダのインターフェース

use crate::{FileInfo, GoType, GoVersion, LineLookup, ModuleData, PackageSet, Result};

/// コンパイル済みバイナリから復元したメタデータの提供元
///
/// 解析セッションやCLIはこのトレイトを通じてのみメタデータを参照します。
pub trait MetadataProvider {
    /// ワードサイズ・バイトオーダー等の基本情報
    fn file_info(&self) -> &FileInfo;

    /// コンパイラバージョン
    ///
    /// 特定できない場合は `MetaError::MetadataUnavailable` を返します。
    fn compiler_version(&self) -> Result<GoVersion>;

    /// 想定するコンパイラバージョンを強制する
    fn set_go_version(&mut self, version: &str) -> Result<()>;

    /// パッケージを分類して返す
    fn packages(&self) -> Result<PackageSet>;

    /// 型を返す
    fn types(&self) -> Result<Vec<GoType>>;

    /// moduledata のセクション表
    fn moduledata(&self) -> Result<ModuleData>;

    /// PC → ソース行の変換
    fn line_lookup(&self) -> Result<&dyn LineLookup>;

    /// ビルドID
    fn build_id(&self) -> Option<String> {
        None
    }
}
