//! シンボルの登録
//!
//! 復元したパッケージ・関数・メソッド・型からシンボル名を合成し、
//! 補正済みのアドレスでセッションへ登録します。

use crate::sanitize::sanitize;
use kasane_meta::{GoType, Package};
use kasane_session::{Channel, Session};
use std::ops::AddAssign;
use tracing::{info, warn};

/// シンボルの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Function,
    Method,
    Type,
}

/// セッションに登録するシンボル
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolRecord {
    pub name: String,
    /// 補正済みのアドレス
    pub address: u64,
    /// 0は範囲不明
    pub length: u64,
    pub kind: SymbolKind,
}

/// `fcn.<package>.<function>`
pub fn function_symbol(package: &str, function: &str) -> String {
    format!("fcn.{}.{}", sanitize(package), sanitize(function))
}

/// `fcn.<package>#<receiver>.<method>`
pub fn method_symbol(package: &str, receiver: &str, method: &str) -> String {
    format!(
        "fcn.{}#{}.{}",
        sanitize(package),
        sanitize(receiver),
        sanitize(method)
    )
}

/// `sym.type.<type>`
pub fn type_symbol(type_name: &str) -> String {
    format!("sym.type.{}", sanitize(type_name))
}

/// パッケージの関数・メソッドのシンボルを列挙する
///
/// 開始アドレスが0（未解決）のものは含めません。
pub fn symbol_records<'a, I>(packages: I, correction: u64) -> impl Iterator<Item = SymbolRecord> + 'a
where
    I: IntoIterator<Item = &'a Package>,
    I::IntoIter: 'a,
{
    packages.into_iter().flat_map(move |pkg| {
        let functions = pkg
            .functions
            .iter()
            .filter(|f| f.offset != 0)
            .map(move |f| SymbolRecord {
                name: function_symbol(&pkg.name, &f.name),
                address: f.offset.wrapping_add(correction),
                length: f.end.saturating_sub(f.offset),
                kind: SymbolKind::Function,
            });
        let methods = pkg
            .methods
            .iter()
            .filter(|m| m.function.offset != 0)
            .map(move |m| SymbolRecord {
                name: method_symbol(&pkg.name, &m.receiver, &m.function.name),
                address: m.function.offset.wrapping_add(correction),
                length: m.function.end.saturating_sub(m.function.offset),
                kind: SymbolKind::Method,
            });
        functions.chain(methods)
    })
}

/// 型のシンボルを列挙する（アドレス0は除外）
pub fn type_records(
    types: &[GoType],
    correction: u64,
) -> impl Iterator<Item = SymbolRecord> + '_ {
    types
        .iter()
        .filter(|t| t.addr != 0)
        .map(move |t| SymbolRecord {
            name: type_symbol(&t.name),
            address: t.addr.wrapping_add(correction),
            length: 0,
            kind: SymbolKind::Type,
        })
}

/// 登録結果の集計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub functions: usize,
    pub methods: usize,
    pub types: usize,
    /// セッションが拒否したシンボル
    pub failed: usize,
}

impl ApplyReport {
    /// 登録できたシンボルの総数
    pub fn total(&self) -> usize {
        self.functions + self.methods + self.types
    }
}

impl AddAssign for ApplyReport {
    fn add_assign(&mut self, other: Self) {
        self.functions += other.functions;
        self.methods += other.methods;
        self.types += other.types;
        self.failed += other.failed;
    }
}

/// シンボルをセッションへ登録する
///
/// 個々の登録失敗はログに残してスキップし、再試行しません。
pub struct SymbolApplier<'s, C: Channel> {
    session: &'s mut Session<C>,
    correction: u64,
}

impl<'s, C: Channel> SymbolApplier<'s, C> {
    pub fn new(session: &'s mut Session<C>, correction: u64) -> Self {
        Self {
            session,
            correction,
        }
    }

    /// パッケージの関数・メソッドと型をすべて登録する
    pub fn apply<'a, I>(&mut self, packages: I, types: &[GoType]) -> ApplyReport
    where
        I: IntoIterator<Item = &'a Package>,
        I::IntoIter: 'a,
    {
        let mut report = self.apply_packages(packages);
        report += self.apply_types(types);
        report
    }

    /// パッケージの関数・メソッドを登録する
    pub fn apply_packages<'a, I>(&mut self, packages: I) -> ApplyReport
    where
        I: IntoIterator<Item = &'a Package>,
        I::IntoIter: 'a,
    {
        let report = self.emit(symbol_records(packages, self.correction));
        info!(
            "{} function symbols applied ({} failed)",
            report.functions + report.methods,
            report.failed
        );
        report
    }

    /// 型を登録する
    pub fn apply_types(&mut self, types: &[GoType]) -> ApplyReport {
        let report = self.emit(type_records(types, self.correction));
        info!("{} type symbols applied ({} failed)", report.types, report.failed);
        report
    }

    /// シンボルを1つずつ登録する
    pub fn emit(&mut self, records: impl IntoIterator<Item = SymbolRecord>) -> ApplyReport {
        let mut report = ApplyReport::default();

        for record in records {
            let result = match record.kind {
                SymbolKind::Function | SymbolKind::Method => {
                    self.session
                        .new_flag_with_length(&record.name, record.address, record.length)
                }
                SymbolKind::Type => self.session.new_flag(&record.name, record.address),
            };

            match result {
                Ok(()) => match record.kind {
                    SymbolKind::Function => report.functions += 1,
                    SymbolKind::Method => report.methods += 1,
                    SymbolKind::Type => report.types += 1,
                },
                Err(e) => {
                    warn!("failed to apply {} at 0x{:x}: {}", record.name, record.address, e);
                    report.failed += 1;
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kasane_meta::{Function, Method, TypeKind};

    fn function(package: &str, name: &str, offset: u64, end: u64) -> Function {
        Function {
            name: name.to_string(),
            package_name: package.to_string(),
            offset,
            end,
        }
    }

    #[test]
    fn test_symbol_names() {
        assert_eq!(function_symbol("main", "main"), "fcn.main.main");
        assert_eq!(
            function_symbol("github.com/foo/bar-baz", "New"),
            "fcn.github.com_foo_bar_baz.New"
        );
        assert_eq!(method_symbol("net/http", "*Client", "Do"), "fcn.net_http#*Client.Do");
        assert_eq!(type_symbol("map[string]main.T"), "sym.type.map[string]main.T");
    }

    #[test]
    fn test_symbol_records_apply_correction() {
        let mut pkg = Package::new("main");
        pkg.functions.push(function("main", "main", 0x1000, 0x1010));

        let records: Vec<_> = symbol_records([&pkg], 0x2000).collect();
        assert_eq!(
            records,
            vec![SymbolRecord {
                name: "fcn.main.main".to_string(),
                address: 0x3000,
                length: 0x10,
                kind: SymbolKind::Function,
            }]
        );
    }

    #[test]
    fn test_symbol_records_skip_unresolved() {
        let mut pkg = Package::new("main");
        pkg.functions.push(function("main", "unresolved", 0, 0x10));
        pkg.functions.push(function("main", "init", 0x2000, 0x2000));
        pkg.methods.push(Method {
            receiver: "T".to_string(),
            function: function("main", "String", 0, 0),
        });
        pkg.methods.push(Method {
            receiver: "*T".to_string(),
            function: function("main", "Close", 0x3000, 0x3040),
        });

        let records: Vec<_> = symbol_records([&pkg], 0).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "fcn.main.init");
        assert_eq!(records[0].length, 0);
        assert_eq!(records[1].name, "fcn.main#*T.Close");
        assert_eq!(records[1].kind, SymbolKind::Method);
    }

    #[test]
    fn test_type_records() {
        let types = vec![
            GoType {
                name: "main.T".to_string(),
                addr: 0x4a0000,
                package_path: "main".to_string(),
                kind: TypeKind::Struct(Vec::new()),
                methods: Vec::new(),
            },
            GoType {
                name: "main.Unresolved".to_string(),
                addr: 0,
                package_path: "main".to_string(),
                kind: TypeKind::Interface(None),
                methods: Vec::new(),
            },
        ];
        let records: Vec<_> = type_records(&types, 0x10).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "sym.type.main.T");
        assert_eq!(records[0].address, 0x4a0010);
    }

    #[test]
    fn test_apply_report() {
        let mut report = ApplyReport {
            functions: 2,
            methods: 1,
            types: 0,
            failed: 1,
        };
        report += ApplyReport {
            types: 3,
            ..Default::default()
        };
        assert_eq!(report.total(), 6);
        assert_eq!(report.failed, 1);
    }
}
