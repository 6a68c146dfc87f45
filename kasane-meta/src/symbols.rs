//! パッケージ・関数・メソッドの復元
//!
//! Goのシンボル名（`github.com/x/y.(*T).M` など）をパッケージパス、レシーバ、
//! 関数名に分解し、パッケージ単位にまとめます。

use crate::lines::LineLookup;
use crate::Result;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;

/// 関数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    pub package_name: String,
    /// 開始アドレス（0は未解決）
    pub offset: u64,
    /// 終了アドレス（排他的）
    pub end: u64,
}

/// メソッド
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Method {
    /// レシーバ型名（`T` または `*T`）
    pub receiver: String,
    pub function: Function,
}

impl Method {
    pub fn name(&self) -> &str {
        &self.function.name
    }

    /// レシーバからポインタ記号を除いた型名
    pub fn receiver_type(&self) -> &str {
        self.receiver.trim_start_matches('*')
    }
}

/// パッケージの分類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageClass {
    Main,
    Vendor,
    Std,
    Unknown,
}

/// パッケージ
#[derive(Debug, Clone)]
pub struct Package {
    /// インポートパス
    pub name: String,
    /// コンパイル時のソースディレクトリ
    pub filepath: String,
    pub functions: Vec<Function>,
    pub methods: Vec<Method>,
    pub class: PackageClass,
}

impl Package {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filepath: String::new(),
            functions: Vec::new(),
            methods: Vec::new(),
            class: PackageClass::Unknown,
        }
    }

    /// Go modulesのバージョン（`.../pkg@v1.2.3/sub` の `v1.2.3`）
    pub fn version(&self) -> Option<&str> {
        let idx = self.filepath.rfind('@')?;
        let rest = &self.filepath[idx + 1..];
        let version = rest.split('/').next().unwrap_or(rest);
        if version.is_empty() {
            None
        } else {
            Some(version)
        }
    }

    /// ソースファイルごとに関数の行範囲をまとめる
    ///
    /// 開始行は関数先頭、終了行は関数末尾の直前の命令から求めます。
    pub fn source_files(&self, lookup: &dyn LineLookup) -> Vec<SourceFile> {
        let mut files: BTreeMap<String, Vec<FileEntry>> = BTreeMap::new();

        let entries = self
            .functions
            .iter()
            .map(|f| (f.name.clone(), f))
            .chain(
                self.methods
                    .iter()
                    .map(|m| (format!("({}){}", m.receiver, m.function.name), &m.function)),
            );

        for (name, func) in entries {
            let Some(start) = lookup.line_at(func.offset) else {
                continue;
            };
            let end_line = lookup
                .line_at(func.end.saturating_sub(1).max(func.offset))
                .filter(|end| end.file == start.file)
                .map(|end| end.line)
                .unwrap_or(start.line);

            files.entry(start.file).or_default().push(FileEntry {
                name,
                start: start.line,
                end: end_line.max(start.line),
            });
        }

        files
            .into_iter()
            .map(|(name, mut entries)| {
                entries.sort_by_key(|e| e.start);
                SourceFile { name, entries }
            })
            .collect()
    }
}

/// ソースファイル内の関数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub start: u32,
    pub end: u32,
}

/// ソースファイル
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub entries: Vec<FileEntry>,
}

impl fmt::Display for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let file = self.name.rsplit('/').next().unwrap_or(&self.name);
        write!(f, "File: {}", file)?;
        for entry in &self.entries {
            write!(
                f,
                "\n\t{} Lines: {} to {} ({})",
                entry.name,
                entry.start,
                entry.end,
                entry.end - entry.start
            )?;
        }
        Ok(())
    }
}

/// 分類済みのパッケージ集合
///
/// `MetadataProvider::packages` の成功が前提で、以降の取得は失敗しません。
#[derive(Debug, Clone, Default)]
pub struct PackageSet {
    main: Vec<Package>,
    vendors: Vec<Package>,
    std: Vec<Package>,
    unknown: Vec<Package>,
}

impl PackageSet {
    /// 分類済みのパッケージから集合を作る
    pub fn from_packages(packages: impl IntoIterator<Item = Package>) -> Self {
        let mut set = Self::default();
        for pkg in packages {
            match pkg.class {
                PackageClass::Main => set.main.push(pkg),
                PackageClass::Vendor => set.vendors.push(pkg),
                PackageClass::Std => set.std.push(pkg),
                PackageClass::Unknown => set.unknown.push(pkg),
            }
        }
        set
    }

    pub fn main(&self) -> &[Package] {
        &self.main
    }

    pub fn vendors(&self) -> &[Package] {
        &self.vendors
    }

    pub fn std(&self) -> &[Package] {
        &self.std
    }

    pub fn unknown(&self) -> &[Package] {
        &self.unknown
    }

    /// main → vendor → std → unknown の順ですべてのパッケージを返す
    pub fn all(&self) -> impl Iterator<Item = &Package> {
        self.main
            .iter()
            .chain(&self.vendors)
            .chain(&self.std)
            .chain(&self.unknown)
    }

    /// main パッケージのソースディレクトリ
    pub fn main_root(&self) -> Option<&str> {
        self.main
            .iter()
            .find(|p| p.name == "main")
            .map(|p| p.filepath.as_str())
            .filter(|fp| !fp.is_empty())
    }
}

/// シンボル名の分解結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSymbol {
    pub package: String,
    pub receiver: Option<String>,
    pub name: String,
}

/// Goシンボル名のパーサ
pub struct SymbolNameParser {
    /// コンパイラが生成するクロージャ・ラッパーの名前
    closure: Regex,
}

impl SymbolNameParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            closure: Regex::new(r"^(func\d+|gowrap\d+|deferwrap\d+|\d+)(\.|$)")?,
        })
    }

    /// テキストシンボル名を分解する
    ///
    /// コンパイラ生成の `type:`・`go:` 系シンボルやパッケージ区切りのない名前は `None`。
    pub fn parse(&self, symbol: &str) -> Option<ParsedSymbol> {
        if is_compiler_generated(symbol) {
            return None;
        }

        // ジェネリクスの型引数内の '/' や '.' は区切りとして扱わない
        let head_end = symbol.find('[').unwrap_or(symbol.len());
        let head = &symbol[..head_end];
        let search_from = head.rfind('/').map(|i| i + 1).unwrap_or(0);
        let dot = search_from + head[search_from..].find('.')?;

        let package = &symbol[..dot];
        let rest = &symbol[dot + 1..];
        if package.is_empty() || rest.is_empty() {
            return None;
        }

        // ポインタレシーバ: (*T).M
        if let Some(inner) = rest.strip_prefix("(*") {
            if let Some((recv, name)) = inner.split_once(").") {
                return Some(ParsedSymbol {
                    package: package.to_string(),
                    receiver: Some(format!("*{}", recv)),
                    name: name.to_string(),
                });
            }
        }

        // 値レシーバ: T.M（クロージャと init.N は関数として扱う）
        let rest_head = &rest[..rest.find('[').unwrap_or(rest.len())];
        if let Some(idx) = rest_head.find('.') {
            let (first, tail) = (&rest[..idx], &rest[idx + 1..]);
            if first != "init" && !first.starts_with('(') && !self.closure.is_match(tail) {
                return Some(ParsedSymbol {
                    package: package.to_string(),
                    receiver: Some(first.to_string()),
                    name: tail.to_string(),
                });
            }
        }

        Some(ParsedSymbol {
            package: package.to_string(),
            receiver: None,
            name: rest.to_string(),
        })
    }
}

/// コンパイラが生成したシンボルかどうか
pub fn is_compiler_generated(name: &str) -> bool {
    ["type:", "type.", "go:", "go.", "gclocals"]
        .iter()
        .any(|prefix| name.starts_with(prefix))
        || name.is_empty()
}

/// パッケージを分類する
///
/// `main_root` は main パッケージのソースディレクトリで、その配下は main に含めます。
pub fn classify(name: &str, filepath: &str, main_root: Option<&str>) -> PackageClass {
    if name == "main" {
        return PackageClass::Main;
    }
    if is_compiler_generated(name) {
        return PackageClass::Unknown;
    }

    let vendored = name.contains("/vendor/") || name.starts_with("vendor/");
    if !vendored {
        if let Some(root) = main_root.filter(|r| !r.is_empty()) {
            if !filepath.is_empty() && filepath.starts_with(root) {
                return PackageClass::Main;
            }
        }
    }
    if vendored {
        return PackageClass::Vendor;
    }

    let first = name.split('/').next().unwrap_or(name);
    if first.contains('.') {
        PackageClass::Vendor
    } else if first.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        PackageClass::Std
    } else {
        PackageClass::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lines::LineInfo;

    fn parser() -> SymbolNameParser {
        SymbolNameParser::new().unwrap()
    }

    #[test]
    fn test_parse_plain_function() {
        let parsed = parser().parse("main.main").unwrap();
        assert_eq!(parsed.package, "main");
        assert_eq!(parsed.receiver, None);
        assert_eq!(parsed.name, "main");
    }

    #[test]
    fn test_parse_pointer_receiver() {
        let parsed = parser().parse("github.com/foo/bar.(*Client).Do").unwrap();
        assert_eq!(parsed.package, "github.com/foo/bar");
        assert_eq!(parsed.receiver.as_deref(), Some("*Client"));
        assert_eq!(parsed.name, "Do");
    }

    #[test]
    fn test_parse_value_receiver() {
        let parsed = parser().parse("net/http.Header.Get").unwrap();
        assert_eq!(parsed.package, "net/http");
        assert_eq!(parsed.receiver.as_deref(), Some("Header"));
        assert_eq!(parsed.name, "Get");
    }

    #[test]
    fn test_parse_closures_stay_functions() {
        let p = parser();
        let closure = p.parse("main.main.func1").unwrap();
        assert_eq!(closure.receiver, None);
        assert_eq!(closure.name, "main.func1");

        let init = p.parse("main.init.0").unwrap();
        assert_eq!(init.receiver, None);
        assert_eq!(init.name, "init.0");
    }

    #[test]
    fn test_parse_generic_arguments_are_not_separators() {
        let parsed = parser().parse("main.Map[go.shape.int,github.com/x/y.T]").unwrap();
        assert_eq!(parsed.package, "main");
        assert_eq!(parsed.name, "Map[go.shape.int,github.com/x/y.T]");
    }

    #[test]
    fn test_parse_skips_compiler_symbols() {
        let p = parser();
        assert!(p.parse("type:.eq.main.T").is_none());
        assert!(p.parse("go:buildid").is_none());
        assert!(p.parse("nodots").is_none());
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("main", "/src/app", None), PackageClass::Main);
        assert_eq!(classify("fmt", "/usr/go/src/fmt", Some("/src/app")), PackageClass::Std);
        assert_eq!(classify("internal/abi", "", None), PackageClass::Std);
        assert_eq!(
            classify("github.com/a/b", "/go/pkg/mod/github.com/a/b@v1.0.0", Some("/src/app")),
            PackageClass::Vendor
        );
        assert_eq!(
            classify("example.com/app/util", "/src/app/util", Some("/src/app")),
            PackageClass::Main
        );
        assert_eq!(
            classify("example.com/app/vendor/x", "/src/app/vendor/x", Some("/src/app")),
            PackageClass::Vendor
        );
        assert_eq!(classify("go:itab", "", None), PackageClass::Unknown);
    }

    #[test]
    fn test_package_version() {
        let mut pkg = Package::new("github.com/a/b/c");
        pkg.filepath = "/go/pkg/mod/github.com/a/b@v1.2.3/c".to_string();
        assert_eq!(pkg.version(), Some("v1.2.3"));
        pkg.filepath = "/src/app".to_string();
        assert_eq!(pkg.version(), None);
    }

    struct FixedLines;

    impl LineLookup for FixedLines {
        fn line_at(&self, pc: u64) -> Option<LineInfo> {
            let line = match pc {
                0x1000..=0x100f => 10 + ((pc - 0x1000) / 4) as u32,
                0x2000..=0x2007 => 30,
                _ => return None,
            };
            Some(LineInfo {
                file: "/src/app/main.go".to_string(),
                line,
            })
        }
    }

    #[test]
    fn test_source_files() {
        let mut pkg = Package::new("main");
        pkg.functions.push(Function {
            name: "main".to_string(),
            package_name: "main".to_string(),
            offset: 0x1000,
            end: 0x1010,
        });
        pkg.methods.push(Method {
            receiver: "*T".to_string(),
            function: Function {
                name: "Run".to_string(),
                package_name: "main".to_string(),
                offset: 0x2000,
                end: 0x2008,
            },
        });

        let files = pkg.source_files(&FixedLines);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].entries[0], FileEntry { name: "main".into(), start: 10, end: 13 });
        assert_eq!(files[0].entries[1], FileEntry { name: "(*T)Run".into(), start: 30, end: 30 });
        assert!(files[0].to_string().starts_with("File: main.go\n\tmain Lines: 10 to 13 (3)"));
    }
}
