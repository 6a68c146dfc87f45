//! 対話シェルのコマンド

use crate::parse::{parse_address, parse_count};

/// シェルコマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// 初期解析（シンボル登録）
    Init,
    /// 選択中の関数に行情報を付ける
    Lines { flags: bool },
    /// アドレスの型を表示
    Type(u64),
    /// 文字列配列を表示
    Strings { address: u64, count: u64 },
    /// セッションのセクション一覧
    Sections,
    /// ヘルプ表示
    Help,
    /// 終了
    Quit,
}

impl Command {
    /// コマンド文字列をパースする
    pub fn parse(input: &str) -> Option<Self> {
        let parts: Vec<&str> = input.split_whitespace().collect();
        if parts.is_empty() {
            return None;
        }

        match parts[0] {
            "init" | "i" => Some(Command::Init),
            "lines" | "l" => match parts.get(1) {
                None => Some(Command::Lines { flags: false }),
                Some(&"flags") | Some(&"--flags") => Some(Command::Lines { flags: true }),
                Some(_) => None,
            },
            "type" | "t" => {
                let addr = parse_address(parts.get(1)?).ok()?;
                Some(Command::Type(addr))
            }
            "strings" | "str" => {
                let address = parse_address(parts.get(1)?).ok()?;
                let count = parse_count(parts.get(2)?).ok()?;
                Some(Command::Strings { address, count })
            }
            "sections" | "iS" => Some(Command::Sections),
            "help" | "h" | "?" => Some(Command::Help),
            "quit" | "q" | "exit" => Some(Command::Quit),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("init"), Some(Command::Init));
        assert_eq!(Command::parse("lines"), Some(Command::Lines { flags: false }));
        assert_eq!(Command::parse("l flags"), Some(Command::Lines { flags: true }));
        assert_eq!(Command::parse("type 0x4a0000"), Some(Command::Type(0x4a0000)));
        assert_eq!(
            Command::parse("strings 0x1000 3"),
            Some(Command::Strings {
                address: 0x1000,
                count: 3
            })
        );
        assert_eq!(Command::parse("  quit  "), Some(Command::Quit));
    }

    #[test]
    fn test_parse_invalid_commands() {
        assert_eq!(Command::parse(""), None);
        assert_eq!(Command::parse("type"), None);
        assert_eq!(Command::parse("strings 0x1000"), None);
        assert_eq!(Command::parse("strings 0x1000 many"), None);
        assert_eq!(Command::parse("lines sideways"), None);
        assert_eq!(Command::parse("break main"), None);
    }
}
