//! ソース行情報

use addr2line::Context;
use gimli::{EndianSlice, RunTimeEndian};

/// ソース行情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineInfo {
    pub file: String,
    pub line: u32,
}

impl std::fmt::Display for LineInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// PC → (ファイル, 行) の変換
pub trait LineLookup {
    /// 命令アドレスに対応するソース行を返す（情報がなければ `None`）
    fn line_at(&self, pc: u64) -> Option<LineInfo>;
}

impl<L: LineLookup + ?Sized> LineLookup for &L {
    fn line_at(&self, pc: u64) -> Option<LineInfo> {
        (**self).line_at(pc)
    }
}

/// DWARFの行テーブルによるソース行情報プロバイダ
pub struct DwarfLines {
    context: Context<EndianSlice<'static, RunTimeEndian>>,
}

impl DwarfLines {
    /// DWARFコンテキストから作成する
    pub fn new(dwarf: gimli::Dwarf<EndianSlice<'static, RunTimeEndian>>) -> crate::Result<Self> {
        let context = Context::from_dwarf(dwarf)?;
        Ok(Self { context })
    }
}

impl LineLookup for DwarfLines {
    fn line_at(&self, pc: u64) -> Option<LineInfo> {
        let location = self.context.find_location(pc).ok()??;
        Some(LineInfo {
            file: location.file?.to_string(),
            line: location.line?,
        })
    }
}

/// 行情報を持たないバイナリ用
pub struct NoLines;

impl LineLookup for NoLines {
    fn line_at(&self, _pc: u64) -> Option<LineInfo> {
        None
    }
}
