//! moduledata のセクション境界
//!
//! ランタイムが保持するセクション表（text, types, pclntab ...）を表します。

use std::fmt;
use std::str::FromStr;

/// moduledata に記録されたセクション
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    Text,
    Types,
    ITabLinks,
    PclnTab,
    FuncTab,
    NoPtrData,
    Data,
    Bss,
    NoPtrBss,
}

impl SectionKind {
    /// 表示順のすべてのセクション
    pub const ALL: [SectionKind; 9] = [
        SectionKind::Text,
        SectionKind::Types,
        SectionKind::ITabLinks,
        SectionKind::PclnTab,
        SectionKind::FuncTab,
        SectionKind::NoPtrData,
        SectionKind::Data,
        SectionKind::Bss,
        SectionKind::NoPtrBss,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SectionKind::Text => "text",
            SectionKind::Types => "types",
            SectionKind::ITabLinks => "itablinks",
            SectionKind::PclnTab => "pclntab",
            SectionKind::FuncTab => "functab",
            SectionKind::NoPtrData => "noptrdata",
            SectionKind::Data => "data",
            SectionKind::Bss => "bss",
            SectionKind::NoPtrBss => "noptrbss",
        }
    }

    /// 開始・終了を示すランタイムシンボル名
    ///
    /// 終了シンボルがないセクションはシンボルサイズを長さとして使います。
    pub fn boundary_symbols(self) -> (&'static str, Option<&'static str>) {
        match self {
            SectionKind::Text => ("runtime.text", Some("runtime.etext")),
            SectionKind::Types => ("runtime.types", Some("runtime.etypes")),
            SectionKind::ITabLinks => ("runtime.itablink", Some("runtime.eitablink")),
            SectionKind::PclnTab => ("runtime.pclntab", Some("runtime.epclntab")),
            SectionKind::FuncTab => ("runtime.findfunctab", None),
            SectionKind::NoPtrData => ("runtime.noptrdata", Some("runtime.enoptrdata")),
            SectionKind::Data => ("runtime.data", Some("runtime.edata")),
            SectionKind::Bss => ("runtime.bss", Some("runtime.ebss")),
            SectionKind::NoPtrBss => ("runtime.noptrbss", Some("runtime.enoptrbss")),
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SectionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SectionKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| format!("No known section with the name {}", s))
    }
}

/// セクションの範囲
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModuleDataSection {
    pub address: u64,
    pub length: u64,
}

/// moduledata のセクション表
#[derive(Debug, Clone, Default)]
pub struct ModuleData {
    sections: Vec<(SectionKind, ModuleDataSection)>,
}

impl ModuleData {
    pub fn new(sections: Vec<(SectionKind, ModuleDataSection)>) -> Self {
        Self { sections }
    }

    /// セクションを取得する（記録がなければ空の範囲）
    pub fn section(&self, kind: SectionKind) -> ModuleDataSection {
        self.sections
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, s)| *s)
            .unwrap_or_default()
    }

    /// ランタイムが認識しているコードセクションの開始アドレス
    pub fn text(&self) -> ModuleDataSection {
        self.section(SectionKind::Text)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SectionKind, ModuleDataSection)> + '_ {
        SectionKind::ALL.iter().map(move |kind| (*kind, self.section(*kind)))
    }
}
