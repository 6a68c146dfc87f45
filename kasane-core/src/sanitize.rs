//! シンボル名の正規化

/// セッションのシンボル名に使えない文字
const FORBIDDEN: [char; 5] = [' ', '-', ';', '/', '@'];

/// 使えない文字を `_` に置き換える
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if FORBIDDEN.contains(&c) { '_' } else { c })
        .collect()
}
