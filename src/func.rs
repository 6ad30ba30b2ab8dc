//! The model of emitted functions: declared variables, prototypes with
//! their attribute annotations, and the code fragments the codecs build
//! up. Everything here renders to C text; which C is the dialect's say.

use std::fmt::Write;

use crate::model::make_snake;

/// A declared variable in generated code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeVar {
    pub ty: String,
    pub name: String,
}

impl TypeVar {
    pub fn new(ty: impl Into<String>, name: impl Into<String>) -> TypeVar {
        TypeVar { ty: ty.into(), name: name.into() }
    }

    /// Render as a declaration, `char *value;` style.
    pub fn decl(&self) -> String {
        if self.ty.ends_with('*') {
            format!("{}{};", self.ty, self.name)
        } else {
            format!("{} {};", self.ty, self.name)
        }
    }

    /// Render as a parameter, without the trailing semicolon.
    pub fn param(&self) -> String {
        if self.ty.ends_with('*') {
            format!("{}{}", self.ty, self.name)
        } else {
            format!("{} {}", self.ty, self.name)
        }
    }
}

/// Attribute annotations carried on generated prototypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    WarnUnusedResult,
    Deprecated,
}

impl Attribute {
    fn as_c(self) -> &'static str {
        match self {
            Attribute::WarnUnusedResult => "warn_unused_result",
            Attribute::Deprecated => "deprecated",
        }
    }
}

/// Prototype of an emitted or required function.
///
/// Renders both as the definition header placed above a function body and
/// as an `extern` declaration for a header file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncPrototype {
    pub ret: String,
    pub name: String,
    pub args: Vec<TypeVar>,
    pub attribs: Vec<Attribute>,
}

impl FuncPrototype {
    pub fn new(ret: impl Into<String>, name: impl Into<String>) -> FuncPrototype {
        FuncPrototype {
            ret: ret.into(),
            name: name.into(),
            args: Vec::new(),
            attribs: Vec::new(),
        }
    }

    pub fn arg(&mut self, ty: impl Into<String>, name: impl Into<String>) -> &mut Self {
        self.args.push(TypeVar::new(ty, name));
        self
    }

    pub fn attrib(&mut self, a: Attribute) -> &mut Self {
        if !self.attribs.contains(&a) {
            self.attribs.push(a);
        }
        self
    }

    /// The definition header: return type on its own line, continuation
    /// arguments aligned under the first.
    pub fn definition(&self) -> String {
        let mut s = format!("{}\n{} (", self.ret, self.name);
        if self.args.is_empty() {
            s.push_str("void)\n");
            return s;
        }
        let pad = " ".repeat(self.name.len() + 2);
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                let _ = write!(s, ",\n{}", pad);
            }
            s.push_str(&arg.param());
        }
        s.push_str(")\n");
        s
    }

    /// The `extern` declaration line with attribute annotations.
    pub fn declaration(&self) -> String {
        let mut s = format!("extern {} {} (", self.ret, self.name);
        if self.args.is_empty() {
            s.push_str("void)");
        } else {
            for (i, arg) in self.args.iter().enumerate() {
                if i > 0 {
                    s.push_str(", ");
                }
                s.push_str(&arg.param());
            }
            s.push(')');
        }
        if self.attribs.is_empty() {
            s.push_str(";\n");
        } else {
            let list: Vec<&str> = self.attribs.iter().map(|a| a.as_c()).collect();
            let _ = write!(s, "\n\t__attribute__ (({}));\n", list.join(", "));
        }
        s
    }

    /// The forward declaration used for file-local functions.
    pub fn static_declaration(&self) -> String {
        let mut s = format!("static {} {} (", self.ret, self.name);
        if self.args.is_empty() {
            s.push_str("void);\n");
            return s;
        }
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                s.push_str(", ");
            }
            s.push_str(&arg.param());
        }
        s.push_str(");\n");
        s
    }
}

/// A generated `typedef struct`, used for struct and dict-entry values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructDecl {
    pub name: String,
    pub fields: Vec<TypeVar>,
}

impl StructDecl {
    pub fn definition(&self) -> String {
        let mut s = format!("typedef struct {} {{\n", make_snake(&self.name));
        for f in &self.fields {
            let _ = writeln!(s, "\t{}", f.decl());
        }
        let _ = write!(s, "}} {};\n", self.name);
        s
    }
}

/// A code fragment produced by the marshaller or demarshaller.
///
/// `vars` are the variables the caller must supply (marshal) or should
/// bind (demarshal); `locals` are temporaries the fragment needs declared;
/// `structs` are typedefs any compound values require.
#[derive(Debug, Default)]
pub struct Fragment {
    pub code: String,
    pub vars: Vec<TypeVar>,
    pub locals: Vec<TypeVar>,
    pub structs: Vec<StructDecl>,
}

impl Fragment {
    pub fn new() -> Fragment {
        Fragment::default()
    }
}

/// Join statement blocks with a blank line between them, dropping empties.
pub fn join_blocks(blocks: Vec<String>) -> String {
    blocks
        .into_iter()
        .filter(|b| !b.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render a complete function: definition header, locals, indented body.
pub fn render_function(proto: &FuncPrototype, locals: &[TypeVar], body: &str) -> String {
    let mut inner = String::new();
    if !locals.is_empty() {
        inner.push_str(&layout_locals(locals));
        inner.push('\n');
    }
    inner.push_str(body);
    format!("{}{{\n{}}}\n", proto.definition(), indent(&inner, 1))
}

/// Indent every non-empty line by `level` tabs.
pub fn indent(s: &str, level: usize) -> String {
    let tabs = "\t".repeat(level);
    let mut out = String::with_capacity(s.len());
    for line in s.split('\n') {
        if !line.is_empty() {
            out.push_str(&tabs);
            out.push_str(line);
        }
        out.push('\n');
    }
    // split() introduces one trailing empty entry for a trailing newline
    if s.ends_with('\n') {
        out.pop();
    }
    out
}

/// Lay out a declaration block for a function's locals.
pub fn layout_locals(locals: &[TypeVar]) -> String {
    let mut s = String::new();
    for var in locals {
        s.push_str(&var.decl());
        s.push('\n');
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_aligns_continuation_args() {
        let mut f = FuncPrototype::new("int", "my_test_get_name");
        f.arg("DBusStubObject *", "object")
            .arg("DBusStubMessage *", "message")
            .arg("DBusMessageIter *", "iter");
        let pad = " ".repeat("my_test_get_name".len() + 2);
        assert_eq!(
            f.definition(),
            format!(
                "int\nmy_test_get_name (DBusStubObject *object,\n{p}DBusStubMessage *message,\n{p}DBusMessageIter *iter)\n",
                p = pad
            )
        );
    }

    #[test]
    fn declaration_carries_attributes() {
        let mut f = FuncPrototype::new("int", "my_test_do_sync");
        f.arg("const void *", "parent");
        f.attrib(Attribute::WarnUnusedResult);
        f.attrib(Attribute::Deprecated);
        assert_eq!(
            f.declaration(),
            "extern int my_test_do_sync (const void *parent)\n\
             \t__attribute__ ((warn_unused_result, deprecated));\n"
        );
    }

    #[test]
    fn no_args_is_void() {
        let f = FuncPrototype::new("int", "my_ping");
        assert_eq!(f.definition(), "int\nmy_ping (void)\n");
        assert_eq!(f.declaration(), "extern int my_ping (void);\n");
    }

    #[test]
    fn indent_skips_blank_lines() {
        assert_eq!(indent("a;\n\nb;\n", 1), "\ta;\n\n\tb;\n");
    }

    #[test]
    fn struct_decl_renders_tagged_typedef() {
        let s = StructDecl {
            name: "MyTestDoP".into(),
            fields: vec![
                TypeVar::new("int32_t", "item0"),
                TypeVar::new("char *", "item1"),
            ],
        };
        assert_eq!(
            s.definition(),
            "typedef struct my_test_do_p {\n\tint32_t item0;\n\tchar *item1;\n} MyTestDoP;\n"
        );
    }
}
