//! ソース行の注釈
//!
//! 関数の命令アドレスを順にたどり、ソース行が変わる位置にだけ注釈を付けます。

use crate::config::{Config, LineMode};
use crate::sanitize::sanitize;
use crate::Result;
use kasane_meta::{LineInfo, LineLookup};
use kasane_session::{Channel, Session};
use tracing::{debug, info};

/// 同じ (file, line) が続く命令列の先頭
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineSpan {
    pub file: String,
    pub line: u32,
    pub pc_start: u64,
}

impl LineSpan {
    /// `file:line`
    pub fn label(&self) -> String {
        format!("{}:{}", self.file, self.line)
    }
}

/// 行が切り替わる位置を求める
///
/// 行情報のないアドレスは読み飛ばし、直前の行も更新しません。
pub fn line_spans<L: LineLookup + ?Sized>(
    pcs: impl IntoIterator<Item = u64>,
    lookup: &L,
) -> Vec<LineSpan> {
    let mut spans = Vec::new();
    let mut current: Option<LineInfo> = None;

    for pc in pcs {
        let Some(info) = lookup.line_at(pc) else {
            continue;
        };
        if current.as_ref() == Some(&info) {
            continue;
        }
        spans.push(LineSpan {
            file: info.file.clone(),
            line: info.line,
            pc_start: pc,
        });
        current = Some(info);
    }

    spans
}

/// 補正値を引いてから行情報を引くアダプタ
///
/// セッション側のアドレスをバイナリ内のアドレスに戻します。
pub struct CorrectedLookup<L> {
    inner: L,
    correction: u64,
}

impl<L: LineLookup> CorrectedLookup<L> {
    pub fn new(inner: L, correction: u64) -> Self {
        Self { inner, correction }
    }
}

impl<L: LineLookup> LineLookup for CorrectedLookup<L> {
    fn line_at(&self, pc: u64) -> Option<LineInfo> {
        self.inner.line_at(pc.checked_sub(self.correction)?)
    }
}

/// 命令列に行の注釈を付ける
///
/// 1つでも失敗したら残りは付けずにエラーを返します。
/// フラグモードでは失敗した場合も既定のフラグ空間に戻します。
pub fn annotate<C: Channel, L: LineLookup + ?Sized>(
    session: &mut Session<C>,
    pcs: impl IntoIterator<Item = u64>,
    lookup: &L,
    config: &Config,
) -> Result<usize> {
    let spans = line_spans(pcs, lookup);

    match config.line_mode {
        LineMode::Comment => {
            for span in &spans {
                session.add_comment(span.pc_start, &span.label())?;
            }
        }
        LineMode::Flag => {
            session.switch_flagspace(&config.lines_flagspace)?;
            let result = spans
                .iter()
                .try_for_each(|span| session.new_flag(&sanitize(&span.label()), span.pc_start));
            // 復元は必ず行うが、報告するのは先に起きた失敗
            let restored = session.restore_default_flagspace();
            result?;
            restored?;
        }
    }

    info!("{} line annotations added", spans.len());
    Ok(spans.len())
}

/// セッションで選択中の関数に行の注釈を付ける
pub fn annotate_current_function<C: Channel, L: LineLookup + ?Sized>(
    session: &mut Session<C>,
    lookup: &L,
    config: &Config,
) -> Result<usize> {
    let function = session.current_function()?;
    debug!(
        "annotating {} ({} instructions)",
        function.name,
        function.ops.len()
    );
    let pcs: Vec<u64> = function.offsets().collect();
    annotate(session, pcs, lookup, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Table(HashMap<u64, (&'static str, u32)>);

    impl LineLookup for Table {
        fn line_at(&self, pc: u64) -> Option<LineInfo> {
            self.0.get(&pc).map(|(file, line)| LineInfo {
                file: file.to_string(),
                line: *line,
            })
        }
    }

    fn table(entries: &[(u64, &'static str, u32)]) -> Table {
        Table(entries.iter().map(|(pc, f, l)| (*pc, (*f, *l))).collect())
    }

    #[test]
    fn test_line_spans_compress_runs() {
        let lookup = table(&[(0x10, "a.go", 5), (0x14, "a.go", 5), (0x18, "a.go", 6)]);
        let spans = line_spans([0x10, 0x14, 0x18], &lookup);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].pc_start, 0x10);
        assert_eq!(spans[0].label(), "a.go:5");
        assert_eq!(spans[1].pc_start, 0x18);
    }

    #[test]
    fn test_line_spans_returning_line_is_new_span() {
        let lookup = table(&[(0x10, "a.go", 5), (0x14, "b.go", 5), (0x18, "a.go", 5)]);
        let spans = line_spans([0x10, 0x14, 0x18], &lookup);
        assert_eq!(
            spans.iter().map(|s| s.pc_start).collect::<Vec<_>>(),
            vec![0x10, 0x14, 0x18]
        );
    }

    #[test]
    fn test_line_spans_skip_unresolved() {
        // 0x14 は行情報なし。前後が同じ行なら1つにまとまる
        let lookup = table(&[(0x10, "a.go", 5), (0x18, "a.go", 5), (0x1c, "a.go", 7)]);
        let spans = line_spans([0x10, 0x14, 0x18, 0x1c], &lookup);
        assert_eq!(
            spans.iter().map(|s| s.pc_start).collect::<Vec<_>>(),
            vec![0x10, 0x1c]
        );
    }

    #[test]
    fn test_corrected_lookup() {
        let lookup = CorrectedLookup::new(table(&[(0x10, "a.go", 5)]), 0x1000);
        assert_eq!(lookup.line_at(0x1010).unwrap().line, 5);
        assert!(lookup.line_at(0x10).is_none());
        assert!(lookup.line_at(0x8).is_none());
    }
}
