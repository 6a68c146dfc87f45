//! パース関連のユーティリティ関数

use crate::{Error, Result};

/// アドレス文字列をu64にパース
///
/// 16進数（0xプレフィックス付き）または10進数をサポート
///
/// # Examples
/// ```
/// use kasane_core::parse::parse_address;
///
/// assert_eq!(parse_address("0x1234").unwrap(), 0x1234);
/// assert_eq!(parse_address("1234").unwrap(), 1234);
/// ```
pub fn parse_address(s: &str) -> Result<u64> {
    let s = s.trim();

    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        // 16進数
        u64::from_str_radix(hex, 16).map_err(|e| invalid(s, e))
    } else {
        // 10進数でもダメなら16進数として解釈を試みる
        s.parse::<u64>()
            .or_else(|_| u64::from_str_radix(s, 16))
            .map_err(|e| invalid(s, e))
    }
}

/// 要素数をパース
///
/// アドレスと違い、プレフィックスのない文字列は10進数としてのみ解釈します。
pub fn parse_count(s: &str) -> Result<u64> {
    let s = s.trim();

    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse::<u64>(),
    }
    .map_err(|e| invalid(s, e))
}

fn invalid(input: &str, e: std::num::ParseIntError) -> Error {
    Error::InvalidNumber {
        input: input.to_string(),
        reason: e.to_string(),
    }
}
