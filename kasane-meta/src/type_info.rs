//! Goの型情報
//!
//! ランタイム型記述子のアドレスと種別、DWARFから抽出した構造体フィールドを保持します。

use crate::Result;
use gimli::Reader;
use std::collections::HashMap;
use std::fmt;

/// `DW_AT_go_embedded_field`
const DW_AT_GO_EMBEDDED_FIELD: gimli::DwAt = gimli::DwAt(0x2903);

/// ランタイムの型種別（`reflect.Kind` と同じ番号）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Invalid,
    Bool,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Uintptr,
    Float32,
    Float64,
    Complex64,
    Complex128,
    Array,
    Chan,
    Func,
    Interface,
    Map,
    Ptr,
    Slice,
    String,
    Struct,
    UnsafePointer,
}

impl Kind {
    /// 型記述子の kind バイトから種別を得る（上位ビットのフラグは無視）
    pub fn from_raw(raw: u8) -> Self {
        const KINDS: [Kind; 27] = [
            Kind::Invalid,
            Kind::Bool,
            Kind::Int,
            Kind::Int8,
            Kind::Int16,
            Kind::Int32,
            Kind::Int64,
            Kind::Uint,
            Kind::Uint8,
            Kind::Uint16,
            Kind::Uint32,
            Kind::Uint64,
            Kind::Uintptr,
            Kind::Float32,
            Kind::Float64,
            Kind::Complex64,
            Kind::Complex128,
            Kind::Array,
            Kind::Chan,
            Kind::Func,
            Kind::Interface,
            Kind::Map,
            Kind::Ptr,
            Kind::Slice,
            Kind::String,
            Kind::Struct,
            Kind::UnsafePointer,
        ];
        KINDS
            .get(usize::from(raw & 0x1f))
            .copied()
            .unwrap_or(Kind::Invalid)
    }

    /// 型名だけで表現される無名の複合型かどうか
    pub fn is_composite(self) -> bool {
        matches!(
            self,
            Kind::Array | Kind::Chan | Kind::Func | Kind::Map | Kind::Ptr | Kind::Slice
        )
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Kind::Invalid => "invalid",
            Kind::Bool => "bool",
            Kind::Int => "int",
            Kind::Int8 => "int8",
            Kind::Int16 => "int16",
            Kind::Int32 => "int32",
            Kind::Int64 => "int64",
            Kind::Uint => "uint",
            Kind::Uint8 => "uint8",
            Kind::Uint16 => "uint16",
            Kind::Uint32 => "uint32",
            Kind::Uint64 => "uint64",
            Kind::Uintptr => "uintptr",
            Kind::Float32 => "float32",
            Kind::Float64 => "float64",
            Kind::Complex64 => "complex64",
            Kind::Complex128 => "complex128",
            Kind::Array => "array",
            Kind::Chan => "chan",
            Kind::Func => "func",
            Kind::Interface => "interface",
            Kind::Map => "map",
            Kind::Ptr => "ptr",
            Kind::Slice => "slice",
            Kind::String => "string",
            Kind::Struct => "struct",
            Kind::UnsafePointer => "unsafe.Pointer",
        };
        f.write_str(name)
    }
}

/// 構造体フィールド
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructField {
    pub name: String,
    pub type_name: String,
    /// 埋め込みフィールド
    pub embedded: bool,
}

/// インターフェースのメソッド
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceMethod {
    pub name: String,
    /// `(int) error` のようなシグネチャ（不明なら空）
    pub signature: String,
}

/// 型に定義されたメソッド
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMethod {
    /// `T` または `*T`
    pub receiver: String,
    pub name: String,
}

/// 構造に応じた型の中身
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    Struct(Vec<StructField>),
    /// メソッド集合（復元できなければ `None`）
    Interface(Option<Vec<InterfaceMethod>>),
    Other(Kind),
}

/// Goの型
#[derive(Debug, Clone)]
pub struct GoType {
    /// パッケージ修飾済みの型名（`main.T`, `*main.T` など）
    pub name: String,
    /// ランタイム型記述子のアドレス（0は未解決）
    pub addr: u64,
    pub package_path: String,
    pub kind: TypeKind,
    pub methods: Vec<TypeMethod>,
}

/// DWARFから抽出した構造体定義の索引
#[derive(Debug, Default)]
pub struct DwarfTypeIndex {
    structs: HashMap<String, Vec<StructField>>,
}

impl DwarfTypeIndex {
    /// 全コンパイルユニットの構造体型を走査する
    pub fn build<R: Reader>(dwarf: &gimli::Dwarf<R>) -> Result<Self> {
        let mut structs = HashMap::new();

        let mut iter = dwarf.units();
        while let Some(header) = iter.next()? {
            let unit = dwarf.unit(header)?;
            let mut entries = unit.entries();

            while let Some((_, entry)) = entries.next_dfs()? {
                if entry.tag() != gimli::DW_TAG_structure_type {
                    continue;
                }
                let Some(name) = get_name(dwarf, &unit, entry) else {
                    continue;
                };
                if structs.contains_key(&name) {
                    continue;
                }
                let fields = extract_fields(dwarf, &unit, entry.offset())?;
                structs.insert(name, fields);
            }
        }
        Ok(Self { structs })
    }

    /// 構造体のフィールドを取得する
    pub fn struct_fields(&self, name: &str) -> Option<&[StructField]> {
        self.structs.get(name).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.structs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.structs.is_empty()
    }
}

/// 構造体DIEの子から DW_TAG_member を列挙する
fn extract_fields<R: Reader>(
    dwarf: &gimli::Dwarf<R>,
    unit: &gimli::Unit<R>,
    offset: gimli::UnitOffset<R::Offset>,
) -> Result<Vec<StructField>> {
    let mut fields = Vec::new();
    let mut tree = unit.entries_tree(Some(offset))?;
    let root = tree.root()?;

    let mut children = root.children();
    while let Some(child) = children.next()? {
        let entry = child.entry();
        if entry.tag() != gimli::DW_TAG_member {
            continue;
        }

        let name = get_name(dwarf, unit, entry).unwrap_or_else(|| "<unnamed>".to_string());
        let type_name = get_type_name(dwarf, unit, entry).unwrap_or_else(|| "<unknown>".to_string());
        let embedded = matches!(
            entry.attr_value(DW_AT_GO_EMBEDDED_FIELD),
            Ok(Some(gimli::AttributeValue::Flag(true)))
        );

        fields.push(StructField {
            name,
            type_name,
            embedded,
        });
    }

    Ok(fields)
}

/// 名前を取得する
fn get_name<R: Reader>(
    dwarf: &gimli::Dwarf<R>,
    unit: &gimli::Unit<R>,
    entry: &gimli::DebuggingInformationEntry<R>,
) -> Option<String> {
    let attr = entry.attr_value(gimli::DW_AT_name).ok()??;
    let name = dwarf.attr_string(unit, attr).ok()?;
    let name = name.to_string_lossy().ok()?.into_owned();
    Some(name)
}

/// DW_AT_type が指す型DIEの名前を取得する
fn get_type_name<R: Reader>(
    dwarf: &gimli::Dwarf<R>,
    unit: &gimli::Unit<R>,
    entry: &gimli::DebuggingInformationEntry<R>,
) -> Option<String> {
    let offset = match entry.attr_value(gimli::DW_AT_type).ok()?? {
        gimli::AttributeValue::UnitRef(offset) => offset,
        _ => return None,
    };
    let type_entry = unit.entry(offset).ok()?;
    get_name(dwarf, unit, &type_entry)
}
