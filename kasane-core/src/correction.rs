//! アドレス補正
//!
//! ローダーが報告するコードセクションの開始アドレスと、バイナリ内の
//! moduledata が記録するテキストの開始アドレスがずれている場合の差分を求めます。

use crate::Result;
use kasane_meta::ModuleData;
use kasane_session::{Channel, SectionInfo, Session};
use tracing::{info, warn};

/// 補正値を計算する
///
/// ローダー側のアドレスの方が大きい場合は負の補正になるため適用せず 0 を返します。
pub fn compute_correction(loader_section: u64, metadata_text: u64) -> u64 {
    metadata_text.checked_sub(loader_section).unwrap_or(0)
}

/// セクション一覧からコードセクションを探す
///
/// `.text`（Mach-O では `__text`）を優先し、なければ最初の実行可能セクションを返します。
pub fn code_section(sections: &[SectionInfo]) -> Option<&SectionInfo> {
    sections
        .iter()
        .find(|s| s.name == ".text" || s.name.ends_with(".__text"))
        .or_else(|| sections.iter().find(|s| s.is_executable()))
}

/// セッションのコードセクションと moduledata から補正値を求める
pub fn detect_correction<C: Channel>(
    session: &mut Session<C>,
    moduledata: &ModuleData,
) -> Result<u64> {
    let metadata_text = moduledata.text().address;
    if metadata_text == 0 {
        warn!("moduledata has no text address; no correction applied");
        return Ok(0);
    }

    let sections = session.sections()?;
    let Some(section) = code_section(&sections) else {
        warn!("session reports no code section; no correction applied");
        return Ok(0);
    };

    let correction = compute_correction(section.vaddr, metadata_text);
    info!(
        "code section {} at 0x{:x}, moduledata text at 0x{:x}, correction 0x{:x}",
        section.name,
        section.vaddr,
        metadata_text,
        correction
    );
    Ok(correction)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(name: &str, perm: &str, vaddr: u64) -> SectionInfo {
        SectionInfo {
            name: name.to_string(),
            size: 0x100,
            vsize: 0x100,
            perm: perm.to_string(),
            paddr: 0,
            vaddr,
        }
    }

    #[test]
    fn test_compute_correction() {
        assert_eq!(compute_correction(0x1000, 0x401000), 0x400000);
        assert_eq!(compute_correction(0x401000, 0x401000), 0);
        // 負の補正は適用しない
        assert_eq!(compute_correction(0x402000, 0x401000), 0);
        assert_eq!(compute_correction(0, u64::MAX), u64::MAX);
    }

    #[test]
    fn test_code_section() {
        let sections = vec![
            section(".init", "-r-x", 0x400000),
            section(".text", "-r-x", 0x401000),
            section(".data", "-rw-", 0x500000),
        ];
        assert_eq!(code_section(&sections).unwrap().vaddr, 0x401000);

        let macho = vec![
            section("0.__TEXT.__text", "-r-x", 0x1000),
            section("1.__DATA.__data", "-rw-", 0x2000),
        ];
        assert_eq!(code_section(&macho).unwrap().vaddr, 0x1000);

        let stripped = vec![section("LOAD0", "-rw-", 0), section("LOAD1", "-r-x", 0x8000)];
        assert_eq!(code_section(&stripped).unwrap().vaddr, 0x8000);

        assert!(code_section(&[]).is_none());
    }
}
