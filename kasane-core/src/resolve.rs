//! 型の解決と表示

use crate::{Error, Result};
use kasane_meta::{GoType, InterfaceMethod, StructField, TypeKind};

/// 型を定義の形で表示する
///
/// `with_methods` が真でメソッドがあれば、メソッド一覧を続けます。
pub fn render_type(typ: &GoType, with_methods: bool) -> String {
    let mut out = match &typ.kind {
        TypeKind::Struct(fields) => struct_def(typ, fields),
        TypeKind::Interface(methods) => interface_def(typ, methods.as_deref()),
        TypeKind::Other(kind) => {
            // 名前付きの型だけ基底の種別を添える
            if kind.is_composite() || !typ.name.contains('.') {
                typ.name.clone()
            } else {
                format!("type {} {}", typ.name, kind)
            }
        }
    };

    if with_methods && !typ.methods.is_empty() {
        out.push('\n');
        out.push_str(&method_def(typ));
    }
    out
}

/// 構造体の定義
pub fn struct_def(typ: &GoType, fields: &[StructField]) -> String {
    if fields.is_empty() {
        return format!("type {} struct{{}}", typ.name);
    }

    let mut out = format!("type {} struct {{", typ.name);
    for field in fields {
        if field.embedded {
            out.push_str(&format!("\n\t{}", field.type_name));
        } else {
            out.push_str(&format!("\n\t{} {}", field.name, field.type_name));
        }
    }
    out.push_str("\n}");
    out
}

/// インターフェースの定義
///
/// メソッド集合が不明（`None`）なら空のインターフェースとは区別して表示します。
pub fn interface_def(typ: &GoType, methods: Option<&[InterfaceMethod]>) -> String {
    let Some(methods) = methods else {
        return format!("type {} interface {{\n\t// methods unknown\n}}", typ.name);
    };
    if methods.is_empty() {
        return format!("type {} interface{{}}", typ.name);
    }

    let mut out = format!("type {} interface {{", typ.name);
    for method in methods {
        out.push_str(&format!("\n\t{}{}", method.name, method.signature));
    }
    out.push_str("\n}");
    out
}

/// メソッド一覧
pub fn method_def(typ: &GoType) -> String {
    typ.methods
        .iter()
        .map(|m| format!("func ({}) {}", m.receiver, m.name))
        .collect::<Vec<_>>()
        .join("\n")
}

/// アドレスから型を引く
pub struct TypeResolver<'t> {
    types: &'t [GoType],
    /// 問い合わせアドレスから差し引く補正値
    correction: u64,
}

impl<'t> TypeResolver<'t> {
    pub fn new(types: &'t [GoType]) -> Self {
        Self {
            types,
            correction: 0,
        }
    }

    /// セッション上の（補正済みの）アドレスで引く
    pub fn with_correction(mut self, correction: u64) -> Self {
        self.correction = correction;
        self
    }

    /// 型記述子のアドレスが一致する型
    pub fn find(&self, addr: u64) -> Option<&'t GoType> {
        let local = addr.checked_sub(self.correction)?;
        self.types.iter().find(|t| t.addr == local)
    }

    /// 型の定義を表示用に整形する（見つからなければ `None`）
    pub fn resolve(&self, addr: u64, with_methods: bool) -> Option<String> {
        self.find(addr).map(|typ| render_type(typ, with_methods))
    }

    /// `resolve` と同じだが、見つからなければ `AddressNotFound`
    pub fn require(&self, addr: u64, with_methods: bool) -> Result<String> {
        self.resolve(addr, with_methods)
            .ok_or(Error::AddressNotFound(addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kasane_meta::{Kind, TypeMethod};

    fn go_type(name: &str, addr: u64, kind: TypeKind) -> GoType {
        GoType {
            name: name.to_string(),
            addr,
            package_path: "main".to_string(),
            kind,
            methods: Vec::new(),
        }
    }

    fn types() -> Vec<GoType> {
        let mut point = go_type(
            "main.Point",
            0x1000,
            TypeKind::Struct(vec![
                StructField {
                    name: "X".to_string(),
                    type_name: "int".to_string(),
                    embedded: false,
                },
                StructField {
                    name: "Base".to_string(),
                    type_name: "main.Base".to_string(),
                    embedded: true,
                },
            ]),
        );
        point.methods.push(TypeMethod {
            receiver: "*Point".to_string(),
            name: "Move".to_string(),
        });

        vec![
            point,
            go_type(
                "main.Shape",
                0x2000,
                TypeKind::Interface(Some(vec![InterfaceMethod {
                    name: "Area".to_string(),
                    signature: "() float64".to_string(),
                }])),
            ),
            go_type("io.Reader", 0x6000, TypeKind::Interface(None)),
            go_type("main.Any", 0x7000, TypeKind::Interface(Some(Vec::new()))),
            go_type("main.Color", 0x3000, TypeKind::Other(Kind::Int)),
            go_type("[]main.Point", 0x4000, TypeKind::Other(Kind::Slice)),
            go_type("main.Empty", 0x5000, TypeKind::Struct(Vec::new())),
        ]
    }

    #[test]
    fn test_resolve_struct() {
        let types = types();
        let resolver = TypeResolver::new(&types);
        assert_eq!(
            resolver.resolve(0x1000, false).unwrap(),
            "type main.Point struct {\n\tX int\n\tmain.Base\n}"
        );
        assert_eq!(
            resolver.resolve(0x1000, true).unwrap(),
            "type main.Point struct {\n\tX int\n\tmain.Base\n}\nfunc (*Point) Move"
        );
    }

    #[test]
    fn test_resolve_interface_and_other() {
        let types = types();
        let resolver = TypeResolver::new(&types);
        assert_eq!(
            resolver.resolve(0x2000, false).unwrap(),
            "type main.Shape interface {\n\tArea() float64\n}"
        );
        assert_eq!(resolver.resolve(0x3000, false).unwrap(), "type main.Color int");
        assert_eq!(resolver.resolve(0x4000, false).unwrap(), "[]main.Point");
        assert_eq!(resolver.resolve(0x5000, true).unwrap(), "type main.Empty struct{}");
    }

    #[test]
    fn test_resolve_interface_with_unknown_methods() {
        let types = types();
        let resolver = TypeResolver::new(&types);
        assert_eq!(
            resolver.resolve(0x6000, false).unwrap(),
            "type io.Reader interface {\n\t// methods unknown\n}"
        );
        assert_eq!(resolver.resolve(0x7000, false).unwrap(), "type main.Any interface{}");
    }

    #[test]
    fn test_resolve_with_correction() {
        let types = types();
        let resolver = TypeResolver::new(&types).with_correction(0x1000);
        assert_eq!(resolver.find(0x4000).map(|t| t.name.as_str()), Some("main.Color"));
        assert_eq!(resolver.find(0x3000).map(|t| t.name.as_str()), Some("main.Shape"));
        assert!(resolver.find(0x800).is_none());
    }

    #[test]
    fn test_resolve_not_found() {
        let types = types();
        let resolver = TypeResolver::new(&types);
        assert!(resolver.resolve(0xdead, false).is_none());
        assert!(matches!(
            resolver.require(0xdead, false),
            Err(Error::AddressNotFound(0xdead))
        ));
    }
}
