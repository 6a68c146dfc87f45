//! Goバイナリの読み込み
//!
//! コンテナ形式の解析は `object`、行情報は `addr2line`、構造体定義は `gimli` に任せ、
//! シンボルテーブルからGoのパッケージ・関数・型を復元します。

use crate::lines::{DwarfLines, NoLines};
use crate::symbols::{classify, Function, Method, Package, SymbolNameParser};
use crate::type_info::{DwarfTypeIndex, Kind, TypeKind, TypeMethod};
use crate::version::scan_version;
use crate::{
    FileInfo, GoType, GoVersion, LineLookup, MemoryReader, MetaError, MetadataProvider,
    ModuleData, ModuleDataSection, PackageSet, Result, SectionKind, WordReader, WordSize,
};
use gimli::{EndianSlice, RunTimeEndian};
use object::{Object, ObjectSection, ObjectSymbol};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// テキストセクション先頭に埋め込まれるビルドIDのマーカー
const BUILD_ID_MARKER: &[u8] = b"\xff Go build ID: \"";

/// シンボルテーブルのエントリ
#[derive(Debug, Clone)]
struct RawSymbol {
    name: String,
    address: u64,
    size: u64,
    text: bool,
}

/// Goバイナリ
pub struct GoFile {
    path: PathBuf,
    /// ファイル全体
    data: &'static [u8],
    /// オブジェクトファイル
    object_file: object::File<'static>,
    info: FileInfo,
    /// アドレス順のシンボル
    symbols: Vec<RawSymbol>,
    /// シンボル名 → `symbols` のインデックス
    by_name: HashMap<String, usize>,
    lines: Box<dyn LineLookup>,
    type_index: DwarfTypeIndex,
    forced_version: Option<GoVersion>,
}

impl GoFile {
    /// バイナリを開いてシンボルとDWARFを読み込む
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let file_data = fs::read(path).map_err(|source| MetaError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        // オブジェクトファイルとDWARFが参照し続けるため 'static にする
        let data: &'static [u8] = Box::leak(file_data.into_boxed_slice());

        let object_file = object::File::parse(data)?;

        let byte_order = if object_file.is_little_endian() {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };
        let word_size = if object_file.is_64() {
            WordSize::Eight
        } else {
            WordSize::Four
        };
        let info = FileInfo {
            os: os_name(object_file.format()).to_string(),
            arch: arch_name(object_file.architecture()),
            word_size,
            byte_order,
        };

        let symbols = collect_symbols(&object_file);
        let by_name = symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.clone(), i))
            .collect::<HashMap<_, _>>();

        let is_go = by_name.contains_key("runtime.main")
            || by_name.contains_key("runtime.text")
            || [".gopclntab", "__gopclntab", ".note.go.buildid"]
                .iter()
                .any(|name| object_file.section_by_name(name).is_some());
        if !is_go {
            return Err(MetaError::NotGo(format!(
                "{} has no Go runtime symbols or sections",
                path.display()
            )));
        }

        // DWARFセクションを読み込む
        let dwarf = gimli::Dwarf::load(|id: gimli::SectionId| -> Result<_> {
            Ok(EndianSlice::new(section_data(&object_file, id.name()), byte_order))
        })?;

        let has_dwarf = !section_data(&object_file, ".debug_info").is_empty();
        let (lines, type_index): (Box<dyn LineLookup>, DwarfTypeIndex) = if has_dwarf {
            let index = DwarfTypeIndex::build(&dwarf)?;
            if index.is_empty() {
                debug!("{} has DWARF but no struct definitions", path.display());
            } else {
                debug!("indexed {} struct definitions", index.len());
            }
            (Box::new(DwarfLines::new(dwarf)?), index)
        } else {
            warn!("{} has no DWARF; line and struct information unavailable", path.display());
            (Box::new(NoLines), DwarfTypeIndex::default())
        };

        info!(
            "loaded {} ({} {}, {} symbols)",
            path.display(),
            info.os,
            info.arch,
            symbols.len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            data,
            object_file,
            info,
            symbols,
            by_name,
            lines,
            type_index,
            forced_version: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 仮想アドレスのバイト列をファイルから読み取る
    pub fn bytes(&self, addr: u64, size: usize) -> Result<Vec<u8>> {
        let section = self
            .object_file
            .sections()
            .find(|s| section_contains(s.address(), s.size(), addr))
            .ok_or_else(|| MetaError::memory_read(addr, "address is not inside any section"))?;

        let data = section
            .data()
            .map_err(|e| MetaError::memory_read(addr, e.to_string()))?;
        let start = usize::try_from(addr - section.address())
            .map_err(|e| MetaError::memory_read(addr, e.to_string()))?;
        let end = start
            .checked_add(size)
            .filter(|end| *end <= data.len())
            .ok_or_else(|| {
                MetaError::memory_read(addr, format!("{} bytes are not backed by file data", size))
            })?;

        Ok(data[start..end].to_vec())
    }

    /// シンボルのアドレスとサイズ
    pub fn symbol(&self, name: &str) -> Option<(u64, u64)> {
        self.by_name
            .get(name)
            .map(|&i| (self.symbols[i].address, self.symbols[i].size))
    }

    /// ランタイムの文字列ヘッダ（ポインタ, 長さ）が指す文字列を読み取る
    fn read_go_string(&self, addr: u64) -> Result<String> {
        let header = self.bytes(addr, 2 * self.info.word_size.bytes())?;
        let mut reader = WordReader::with_file_info(&header, &self.info);
        let ptr = reader.read_word()?;
        let len = reader.read_word()?;
        let len = usize::try_from(len).map_err(|e| MetaError::memory_read(ptr, e.to_string()))?;
        let data = self.bytes(ptr, len)?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    /// 関数の終了アドレス（サイズがなければ次のテキストシンボルの開始）
    fn symbol_end(&self, idx: usize) -> u64 {
        let sym = &self.symbols[idx];
        if sym.size > 0 {
            return sym.address + sym.size;
        }
        self.symbols[idx + 1..]
            .iter()
            .find(|s| s.text && s.address > sym.address)
            .map(|s| s.address)
            .unwrap_or(sym.address)
    }

    /// パッケージのソースディレクトリを最初に解決できた関数から推定する
    fn package_dir(&self, pkg: &Package) -> String {
        pkg.functions
            .iter()
            .chain(pkg.methods.iter().map(|m| &m.function))
            .filter_map(|f| self.lines.line_at(f.offset))
            .filter(|l| !l.file.starts_with('<'))
            .find_map(|l| l.file.rsplit_once('/').map(|(dir, _)| dir.to_string()))
            .unwrap_or_default()
    }

    /// 型記述子の kind バイトを読み取る
    ///
    /// `_type` は size, ptrdata (各1ワード), hash (4), tflag, align, fieldAlign, kind の順。
    fn read_kind(&self, addr: u64) -> Result<Kind> {
        let offset = 2 * self.info.word_size.bytes() as u64 + 7;
        let raw = self.bytes(addr + offset, 1)?;
        Ok(Kind::from_raw(raw[0]))
    }

    fn text_section(&self) -> Option<object::Section<'static, '_>> {
        self.object_file
            .sections()
            .find(|s| s.kind() == object::SectionKind::Text)
    }
}

impl MetadataProvider for GoFile {
    fn file_info(&self) -> &FileInfo {
        &self.info
    }

    fn compiler_version(&self) -> Result<GoVersion> {
        if let Some(version) = &self.forced_version {
            return Ok(version.clone());
        }

        if let Some((addr, _)) = self.symbol("runtime.buildVersion") {
            match self.read_go_string(addr).and_then(|s| GoVersion::parse(&s)) {
                Ok(version) => return Ok(version),
                Err(e) => debug!("runtime.buildVersion unreadable: {}", e),
            }
        }

        scan_version(self.data)?.ok_or_else(|| {
            MetaError::MetadataUnavailable("no Go version string found".to_string())
        })
    }

    fn set_go_version(&mut self, version: &str) -> Result<()> {
        self.forced_version = Some(GoVersion::parse(version)?);
        Ok(())
    }

    fn packages(&self) -> Result<PackageSet> {
        let parser = SymbolNameParser::new()?;
        let mut packages: BTreeMap<String, Package> = BTreeMap::new();

        for (idx, sym) in self.symbols.iter().enumerate() {
            if !sym.text {
                continue;
            }
            let Some(parsed) = parser.parse(&sym.name) else {
                continue;
            };

            let function = Function {
                name: parsed.name,
                package_name: parsed.package.clone(),
                offset: sym.address,
                end: self.symbol_end(idx),
            };
            let pkg = packages
                .entry(parsed.package.clone())
                .or_insert_with(|| Package::new(parsed.package));
            match parsed.receiver {
                Some(receiver) => pkg.methods.push(Method { receiver, function }),
                None => pkg.functions.push(function),
            }
        }

        for pkg in packages.values_mut() {
            pkg.filepath = self.package_dir(pkg);
        }

        let main_root = packages
            .get("main")
            .map(|p| p.filepath.clone())
            .filter(|fp| !fp.is_empty());
        for pkg in packages.values_mut() {
            pkg.class = classify(&pkg.name, &pkg.filepath, main_root.as_deref());
        }

        debug!("recovered {} packages", packages.len());
        Ok(PackageSet::from_packages(packages.into_values()))
    }

    fn types(&self) -> Result<Vec<GoType>> {
        let packages = self.packages()?;
        let paths = package_paths(&packages);
        let methods = method_table(&packages);

        let mut types = Vec::new();
        for sym in &self.symbols {
            let Some(name) = type_symbol_name(&sym.name) else {
                continue;
            };

            let kind = self.read_kind(sym.address).unwrap_or_else(|e| {
                debug!("type {} descriptor unreadable: {}", name, e);
                Kind::Invalid
            });
            let kind = match kind {
                Kind::Struct => TypeKind::Struct(
                    self.type_index
                        .struct_fields(name)
                        .map(<[_]>::to_vec)
                        .unwrap_or_default(),
                ),
                // メソッド集合はランタイムの imethod 表にしかない
                Kind::Interface => TypeKind::Interface(None),
                other => TypeKind::Other(other),
            };

            let type_methods = methods_for(name, &methods);
            let qualifier = type_qualifier(name);
            let package_path = paths.get(qualifier).copied().unwrap_or(qualifier).to_string();

            types.push(GoType {
                name: name.to_string(),
                addr: sym.address,
                package_path,
                kind,
                methods: type_methods,
            });
        }

        debug!("recovered {} types", types.len());
        Ok(types)
    }

    fn moduledata(&self) -> Result<ModuleData> {
        if self.symbol("runtime.text").is_none() {
            return Err(MetaError::MetadataUnavailable(
                "runtime.text symbol not found".to_string(),
            ));
        }

        let sections = SectionKind::ALL
            .iter()
            .filter_map(|kind| {
                let (start_name, end_name) = kind.boundary_symbols();
                let (address, size) = self.symbol(start_name)?;
                let length = end_name
                    .and_then(|name| self.symbol(name))
                    .map(|(end, _)| end.saturating_sub(address))
                    .unwrap_or(size);
                Some((*kind, ModuleDataSection { address, length }))
            })
            .collect();

        Ok(ModuleData::new(sections))
    }

    fn line_lookup(&self) -> Result<&dyn LineLookup> {
        Ok(self.lines.as_ref())
    }

    fn build_id(&self) -> Option<String> {
        if let Some(section) = self.object_file.section_by_name(".note.go.buildid") {
            let data = section.data().ok()?;
            // ELFノート: namesz, descsz, type（各4バイト）+ "Go\0\0" + desc
            let mut reader = WordReader::new(data, WordSize::Four, self.info.byte_order);
            let namesz = usize::try_from(reader.read_word().ok()?).ok()?;
            let descsz = usize::try_from(reader.read_word().ok()?).ok()?;
            reader.read_word().ok()?;
            let desc_start = 12 + ((namesz + 3) & !3);
            let desc = data.get(desc_start..desc_start + descsz)?;
            return Some(String::from_utf8_lossy(desc).into_owned());
        }

        let text = self.text_section()?;
        let data = text.data().ok()?;
        let head = &data[..data.len().min(4096)];
        let start = head
            .windows(BUILD_ID_MARKER.len())
            .position(|w| w == BUILD_ID_MARKER)?
            + BUILD_ID_MARKER.len();
        let len = head[start..].iter().position(|&b| b == b'"')?;
        Some(String::from_utf8_lossy(&head[start..start + len]).into_owned())
    }
}

impl MemoryReader for GoFile {
    fn read(&mut self, addr: u64, size: usize) -> Result<Vec<u8>> {
        self.bytes(addr, size)
    }
}

/// シンボルテーブルを読み取り、アドレス順に並べる
fn collect_symbols(object_file: &object::File<'static>) -> Vec<RawSymbol> {
    let macho = object_file.format() == object::BinaryFormat::MachO;

    let mut symbols: Vec<RawSymbol> = object_file
        .symbols()
        .filter_map(|symbol| {
            let name = symbol.name().ok()?;
            // Mach-Oではシンボル名に '_' が前置される
            let name = if macho {
                name.strip_prefix('_').unwrap_or(name)
            } else {
                name
            };
            if name.is_empty() {
                return None;
            }
            Some(RawSymbol {
                name: name.to_string(),
                address: symbol.address(),
                size: symbol.size(),
                text: symbol.kind() == object::SymbolKind::Text,
            })
        })
        .collect();

    symbols.sort_by_key(|s| s.address);
    symbols
}

/// セクションデータを取得する（圧縮されていれば展開する）
fn section_data(object_file: &object::File<'static>, name: &str) -> &'static [u8] {
    let Some(section) = object_file.section_by_name(name) else {
        return &[];
    };
    match section.uncompressed_data() {
        Ok(Cow::Borrowed(data)) => data,
        Ok(Cow::Owned(data)) => Box::leak(data.into_boxed_slice()),
        Err(e) => {
            warn!("failed to read section {}: {}", name, e);
            &[]
        }
    }
}

/// ロードされるセクションが仮想アドレスを含むか
///
/// アドレス0に置かれる非ロードセクション（`.debug_*`, `.symtab`）は何も含みません。
fn section_contains(start: u64, size: u64, addr: u64) -> bool {
    start != 0 && addr >= start && addr - start < size
}

/// 型記述子シンボル名から型名を得る
///
/// Go 1.20 以降は `type:`、それ以前は `type.` が前置されます。
/// `type:.namedata.*` のような補助シンボルは除外します。
fn type_symbol_name(symbol: &str) -> Option<&str> {
    let name = symbol
        .strip_prefix("type:")
        .or_else(|| symbol.strip_prefix("type."))?;
    if name.is_empty() || name == "*" || name.starts_with('.') {
        return None;
    }
    Some(name)
}

/// 型名の先頭にあるパッケージ修飾子（`[]*net/http.Request` → `net/http`）
///
/// 最後の `/` 以降で最初の `.` までをインポートパスとみなします。
fn type_qualifier(name: &str) -> &str {
    let bare = name.trim_start_matches(['*', '[', ']']);
    // ジェネリクスの型引数は見ない
    let head = bare.split('[').next().unwrap_or(bare);
    let last_segment = head.rfind('/').map_or(0, |i| i + 1);
    let Some(dot) = head[last_segment..].find('.') else {
        return "";
    };
    let qualifier = &head[..last_segment + dot];
    let valid = !qualifier.is_empty()
        && qualifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | '~'));
    if valid {
        qualifier
    } else {
        ""
    }
}

/// 型名の修飾子 → インポートパス
///
/// 古いコンパイラの型名は短いパッケージ名で修飾されるので、両方を登録します。
fn package_paths(packages: &PackageSet) -> HashMap<&str, &str> {
    let mut paths = HashMap::new();
    for pkg in packages.all() {
        paths.insert(pkg.name.as_str(), pkg.name.as_str());
    }
    for pkg in packages.all() {
        let short = pkg.name.rsplit('/').next().unwrap_or(&pkg.name);
        paths.entry(short).or_insert(pkg.name.as_str());
    }
    paths
}

/// `インポートパス.型名` → その型をレシーバとするメソッド
fn method_table(packages: &PackageSet) -> HashMap<String, Vec<TypeMethod>> {
    let mut table: HashMap<String, Vec<TypeMethod>> = HashMap::new();
    for pkg in packages.all() {
        for m in &pkg.methods {
            table
                .entry(format!("{}.{}", pkg.name, m.receiver_type()))
                .or_default()
                .push(TypeMethod {
                    receiver: m.receiver.clone(),
                    name: m.name().to_string(),
                });
        }
    }
    table
}

/// 型のメソッド集合
///
/// ポインタ型はすべてのメソッド、値型は値レシーバのメソッドのみを持ちます。
fn methods_for(name: &str, table: &HashMap<String, Vec<TypeMethod>>) -> Vec<TypeMethod> {
    let pointer = name.starts_with('*');
    table
        .get(name.trim_start_matches('*'))
        .map(|ms| {
            ms.iter()
                .filter(|m| pointer || !m.receiver.starts_with('*'))
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

fn os_name(format: object::BinaryFormat) -> &'static str {
    match format {
        object::BinaryFormat::Elf => "linux",
        object::BinaryFormat::MachO => "darwin",
        object::BinaryFormat::Pe => "windows",
        _ => "unknown",
    }
}

fn arch_name(arch: object::Architecture) -> String {
    use object::Architecture;

    match arch {
        Architecture::X86_64 => "amd64".to_string(),
        Architecture::I386 => "386".to_string(),
        Architecture::Aarch64 => "arm64".to_string(),
        Architecture::Arm => "arm".to_string(),
        Architecture::Mips => "mips".to_string(),
        Architecture::Mips64 => "mips64".to_string(),
        Architecture::PowerPc64 => "ppc64".to_string(),
        Architecture::Riscv64 => "riscv64".to_string(),
        Architecture::S390x => "s390x".to_string(),
        Architecture::Wasm32 => "wasm".to_string(),
        other => format!("{:?}", other).to_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_symbol_name() {
        assert_eq!(type_symbol_name("type:main.T"), Some("main.T"));
        assert_eq!(type_symbol_name("type.*main.T"), Some("*main.T"));
        assert_eq!(type_symbol_name("type:.namedata.*func()"), None);
        assert_eq!(type_symbol_name("type..eq.main.T"), None);
        assert_eq!(type_symbol_name("type.*"), None);
        assert_eq!(type_symbol_name("main.main"), None);
    }

    #[test]
    fn test_type_qualifier() {
        assert_eq!(type_qualifier("main.T"), "main");
        assert_eq!(type_qualifier("[]*http.Request"), "http");
        assert_eq!(type_qualifier("net/http.Client"), "net/http");
        assert_eq!(type_qualifier("*net/http.Client"), "net/http");
        assert_eq!(
            type_qualifier("github.com/foo/bar.Widget"),
            "github.com/foo/bar"
        );
        assert_eq!(type_qualifier("main.List[net/http.Header]"), "main");
        assert_eq!(type_qualifier("map[string]int"), "");
        assert_eq!(type_qualifier("func(*net/http.Request)"), "");
        assert_eq!(type_qualifier("int"), "");
    }

    fn package_set() -> PackageSet {
        let method = |package: &str, receiver: &str, name: &str| Method {
            receiver: receiver.to_string(),
            function: Function {
                name: name.to_string(),
                package_name: package.to_string(),
                offset: 0x1000,
                end: 0x1010,
            },
        };

        let mut http = Package::new("net/http");
        http.methods.push(method("net/http", "*Client", "Do"));
        http.methods.push(method("net/http", "Header", "Get"));
        let mut bar = Package::new("github.com/foo/bar");
        bar.methods.push(method("github.com/foo/bar", "Widget", "Draw"));
        PackageSet::from_packages([http, bar])
    }

    #[test]
    fn test_methods_keyed_by_import_path() {
        let table = method_table(&package_set());

        let client = methods_for("*net/http.Client", &table);
        assert_eq!(client.len(), 1);
        assert_eq!(client[0].name, "Do");
        // 値型はポインタレシーバのメソッドを持たない
        assert!(methods_for("net/http.Client", &table).is_empty());

        let widget = methods_for("github.com/foo/bar.Widget", &table);
        assert_eq!(widget[0].receiver, "Widget");
        assert_eq!(methods_for("*github.com/foo/bar.Widget", &table).len(), 1);
    }

    #[test]
    fn test_package_paths_for_nested_imports() {
        let packages = package_set();
        let paths = package_paths(&packages);

        assert_eq!(paths.get(type_qualifier("net/http.Header")), Some(&"net/http"));
        assert_eq!(paths.get(type_qualifier("http.Header")), Some(&"net/http"));
        assert_eq!(
            paths.get(type_qualifier("github.com/foo/bar.Widget")),
            Some(&"github.com/foo/bar")
        );
        assert_eq!(classify("github.com/foo/bar", "", None), crate::PackageClass::Vendor);
        assert_eq!(classify(type_qualifier("*net/http.Client"), "", None), crate::PackageClass::Std);
    }

    #[test]
    fn test_section_contains_skips_unloaded_sections() {
        assert!(section_contains(0x401000, 0x100, 0x401000));
        assert!(section_contains(0x401000, 0x100, 0x4010ff));
        assert!(!section_contains(0x401000, 0x100, 0x401100));
        assert!(!section_contains(0x401000, 0x100, 0x400fff));
        // .debug_info などはアドレス0から始まる
        assert!(!section_contains(0, 0x10000, 0x10));
    }

    #[test]
    fn test_open_missing_file() {
        match GoFile::open("/nonexistent/kasane/binary") {
            Err(MetaError::Io { path, .. }) => {
                assert_eq!(path, PathBuf::from("/nonexistent/kasane/binary"))
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("opening a missing file should fail"),
        }
    }
}
