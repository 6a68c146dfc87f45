//! コンパイラバージョン

use crate::{MetaError, Result};
use regex::bytes::Regex;
use std::fmt;

/// Goコンパイラのバージョン
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoVersion {
    /// `go1.21.3` のような名前
    pub name: String,
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl GoVersion {
    /// `go1.N[.M]`（`beta`/`rc` 接尾辞付きも可）をパースする
    pub fn parse(name: &str) -> Result<Self> {
        let invalid = || MetaError::InvalidVersion(name.to_string());
        let rest = name.strip_prefix("go").ok_or_else(invalid)?;

        // 1.21rc2 → 1.21
        let numeric_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let mut parts = rest[..numeric_end].split('.');

        let major = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        let minor = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        let patch = match parts.next() {
            Some(p) => p.parse().map_err(|_| invalid())?,
            None => 0,
        };

        Ok(Self {
            name: name.to_string(),
            major,
            minor,
            patch,
        })
    }
}

impl fmt::Display for GoVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// バイト列からバージョン文字列を探す
pub fn scan_version(data: &[u8]) -> Result<Option<GoVersion>> {
    let pattern = Regex::new(r"go1\.\d{1,2}(\.\d{1,2})?((beta|rc)\d+)?")?;
    let Some(found) = pattern.find(data) else {
        return Ok(None);
    };
    let name = String::from_utf8_lossy(found.as_bytes());
    GoVersion::parse(&name).map(Some)
}
