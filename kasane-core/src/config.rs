//! 実行時設定
//!
//! コマンドラインから一度だけ組み立て、各コンポーネントへ参照で渡します。

use kasane_meta::PackageClass;

/// 行情報の付け方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineMode {
    /// `file:line` をコメントとして付ける
    #[default]
    Comment,
    /// 専用のフラグ空間にフラグとして付ける
    Flag,
}

/// 標準パッケージ以外に含めるパッケージの分類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PackageFilter {
    pub std: bool,
    pub vendor: bool,
    pub unknown: bool,
}

impl PackageFilter {
    /// 分類が対象に含まれるか（main は常に含む）
    pub fn includes(&self, class: PackageClass) -> bool {
        match class {
            PackageClass::Main => true,
            PackageClass::Vendor => self.vendor,
            PackageClass::Std => self.std,
            PackageClass::Unknown => self.unknown,
        }
    }
}

/// 設定
#[derive(Debug, Clone)]
pub struct Config {
    pub line_mode: LineMode,
    /// `LineMode::Flag` で使うフラグ空間
    pub lines_flagspace: String,
    /// 型の表示にメソッド一覧を含める
    pub print_methods: bool,
    /// バージョンを特定できないときに仮定するコンパイラバージョン
    pub assumed_go_version: String,
    pub packages: PackageFilter,
    /// 関数シンボルの登録後に実行する解析コマンド
    pub analysis_commands: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            line_mode: LineMode::Comment,
            lines_flagspace: "go.lines".to_string(),
            print_methods: false,
            assumed_go_version: "go1.12".to_string(),
            packages: PackageFilter::default(),
            analysis_commands: vec![
                "afr @@ fcn.main~init".to_string(),
                "afr @ fcn.main.main".to_string(),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_filter() {
        let filter = PackageFilter::default();
        assert!(filter.includes(PackageClass::Main));
        assert!(!filter.includes(PackageClass::Std));

        let filter = PackageFilter {
            vendor: true,
            ..Default::default()
        };
        assert!(filter.includes(PackageClass::Vendor));
        assert!(!filter.includes(PackageClass::Unknown));
    }
}
