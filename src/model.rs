//! The typed records the XML front-end produces and the code generator
//! walks: interfaces, their members, and member arguments, together with
//! symbol derivation and the per-interface validation the front-end runs
//! before anything is generated.

use crate::error::ErrorKind;
use crate::strings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

impl Access {
    pub fn readable(self) -> bool {
        self != Access::Write
    }

    pub fn writable(self) -> bool {
        self != Access::Read
    }
}

/// One `<arg>` of a method or signal. Signal arguments are always
/// direction out.
#[derive(Debug, Clone)]
pub struct Argument {
    pub name: Option<String>,
    pub typ: String,
    pub direction: Direction,
    pub symbol: Option<String>,
}

impl Argument {
    /// The identifier this argument uses in generated code. Anonymous
    /// arguments fall back to their position.
    pub fn symbol(&self, idx: usize) -> String {
        if let Some(sym) = &self.symbol {
            sym.clone()
        } else if let Some(name) = &self.name {
            make_snake(name)
        } else {
            format!("arg{}", idx)
        }
    }
}

#[derive(Debug, Clone)]
pub struct Method {
    pub name: String,
    pub symbol: Option<String>,
    pub deprecated: bool,
    pub args: Vec<Argument>,
}

impl Method {
    pub fn symbol(&self) -> String {
        self.symbol.clone().unwrap_or_else(|| make_snake(&self.name))
    }

    pub fn in_args(&self) -> impl Iterator<Item = (usize, &Argument)> {
        self.args
            .iter()
            .enumerate()
            .filter(|(_, a)| a.direction == Direction::In)
    }

    pub fn out_args(&self) -> impl Iterator<Item = (usize, &Argument)> {
        self.args
            .iter()
            .enumerate()
            .filter(|(_, a)| a.direction == Direction::Out)
    }
}

#[derive(Debug, Clone)]
pub struct Signal {
    pub name: String,
    pub symbol: Option<String>,
    pub deprecated: bool,
    pub args: Vec<Argument>,
}

impl Signal {
    pub fn symbol(&self) -> String {
        self.symbol.clone().unwrap_or_else(|| make_snake(&self.name))
    }
}

#[derive(Debug, Clone)]
pub struct Property {
    pub name: String,
    pub symbol: Option<String>,
    pub deprecated: bool,
    pub typ: String,
    pub access: Access,
}

impl Property {
    pub fn symbol(&self) -> String {
        self.symbol.clone().unwrap_or_else(|| make_snake(&self.name))
    }
}

#[derive(Debug, Clone)]
pub struct Interface {
    pub name: String,
    pub symbol: Option<String>,
    pub deprecated: bool,
    pub methods: Vec<Method>,
    pub signals: Vec<Signal>,
    pub properties: Vec<Property>,
}

impl Interface {
    pub fn symbol(&self) -> String {
        self.symbol.clone().unwrap_or_else(|| make_snake(&self.name))
    }

    /// The cross-member checks that only make sense once the interface is
    /// complete: derived symbols must be unique per member kind, since a
    /// collision would either shadow a generated function or force an
    /// unstable rename.
    pub fn validate(&self) -> Result<(), ErrorKind> {
        check_symbols("method", self.methods.iter().map(|m| (m.name.as_str(), m.symbol())))?;
        check_symbols("signal", self.signals.iter().map(|s| (s.name.as_str(), s.symbol())))?;
        check_symbols(
            "property",
            self.properties.iter().map(|p| (p.name.as_str(), p.symbol())),
        )?;
        Ok(())
    }
}

fn check_symbols<'a>(
    kind: &'static str,
    members: impl Iterator<Item = (&'a str, String)>,
) -> Result<(), ErrorKind> {
    let mut seen: Vec<(String, &str)> = Vec::new();
    for (name, symbol) in members {
        if let Some((_, first)) = seen.iter().find(|(s, _)| *s == symbol) {
            return Err(ErrorKind::DuplicateSymbol {
                kind,
                symbol,
                first: (*first).to_owned(),
                second: name.to_owned(),
            });
        }
        seen.push((symbol, name));
    }
    Ok(())
}

/// The document root: every interface the `<node>` declared.
#[derive(Debug, Clone, Default)]
pub struct Node {
    pub interfaces: Vec<Interface>,
}

/// Convert a D-Bus name to a snake_case identifier: `GetNameOwner`
/// becomes `get_name_owner`, interface dots become underscores.
pub fn make_snake(s: &str) -> String {
    let mut lcase = false;
    let mut r = String::new();
    for c in s.chars() {
        match c {
            'a'..='z' | '0'..='9' => {
                r.push(c);
                lcase = true;
            }
            'A'..='Z' => {
                if lcase {
                    r.push('_');
                }
                lcase = false;
                r.push(c.to_ascii_lowercase());
            }
            _ => {
                if lcase {
                    r.push('_');
                }
                lcase = false;
            }
        }
    }
    r
}

/// Convert an identifier to CamelCase for typedef names.
pub fn make_camel(s: &str) -> String {
    let mut ucase = true;
    s.chars()
        .filter_map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' => {
                let cc = if ucase { c.to_ascii_uppercase() } else { c };
                ucase = false;
                Some(cc)
            }
            _ => {
                ucase = true;
                None
            }
        })
        .collect()
}

/// Validate a member name attribute, mapping failures to the error the
/// front-end reports.
pub fn validate_member_name(name: &str) -> Result<(), ErrorKind> {
    strings::is_valid_member_name(name)
        .map_err(|_| ErrorKind::InvalidMemberName(name.to_owned()))
}

pub fn validate_interface_name(name: &str) -> Result<(), ErrorKind> {
    strings::is_valid_interface_name(name)
        .map_err(|_| ErrorKind::InvalidInterfaceName(name.to_owned()))
}

pub fn validate_symbol(symbol: &str) -> Result<(), ErrorKind> {
    strings::is_valid_symbol(symbol).map_err(|_| ErrorKind::InvalidSymbol(symbol.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snake_derivation() {
        assert_eq!(make_snake("Hello"), "hello");
        assert_eq!(make_snake("GetNameOwner"), "get_name_owner");
        assert_eq!(make_snake("org.freedesktop.DBus"), "org_freedesktop_dbus");
        assert_eq!(make_snake("SHA1Sum"), "sha1sum");
        assert_eq!(make_snake("already_snake"), "already_snake");
    }

    #[test]
    fn camel_derivation() {
        assert_eq!(make_camel("my_test_do"), "MyTestDo");
        assert_eq!(make_camel("com.example.Test"), "ComExampleTest");
    }

    #[test]
    fn duplicate_symbols_name_both_members() {
        let intf = Interface {
            name: "com.example.Test".into(),
            symbol: None,
            deprecated: false,
            methods: vec![
                Method {
                    name: "TestFoo".into(),
                    symbol: None,
                    deprecated: false,
                    args: vec![],
                },
                Method {
                    name: "test_foo".into(),
                    symbol: None,
                    deprecated: false,
                    args: vec![],
                },
            ],
            signals: vec![],
            properties: vec![],
        };
        match intf.validate() {
            Err(ErrorKind::DuplicateSymbol { kind, symbol, first, second }) => {
                assert_eq!(kind, "method");
                assert_eq!(symbol, "test_foo");
                assert_eq!(first, "TestFoo");
                assert_eq!(second, "test_foo");
            }
            other => panic!("expected DuplicateSymbol, got {:?}", other),
        }
    }

    #[test]
    fn symbol_override_wins() {
        let m = Method {
            name: "TestFoo".into(),
            symbol: Some("frobnicate".into()),
            deprecated: false,
            args: vec![],
        };
        assert_eq!(m.symbol(), "frobnicate");
    }

    #[test]
    fn anonymous_arguments_fall_back_to_position() {
        let a = Argument {
            name: None,
            typ: "s".into(),
            direction: Direction::Out,
            symbol: None,
        };
        assert_eq!(a.symbol(3), "arg3");
    }
}
