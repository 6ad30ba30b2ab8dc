//! The target-dialect seam.
//!
//! The walker, type mapping, marshaller and demarshaller never spell out a
//! target type name, iterator primitive or error constructor themselves;
//! they ask the [`Dialect`]. [`Libdbus`] is the C dialect the tool ships:
//! generated code calls libdbus directly plus the small `dbus_stub_`
//! support runtime for parented allocation, error raising and boxed
//! variants.

use crate::func::{indent, StructDecl, TypeVar};
use crate::signature::{SignatureError, Token, TypeCode, Walker};

/// The contained-signature argument of a container open.
#[derive(Debug, Clone, Copy)]
pub enum Contained<'a> {
    None,
    Literal(&'a str),
    Expr(&'a str),
}

pub trait Dialect {
    // Type vocabulary.
    fn basic_type(&self, tc: TypeCode) -> &'static str;
    fn variant_type(&self) -> &'static str;
    fn len_type(&self) -> &'static str;
    fn iter_type(&self) -> &'static str;
    fn object_type(&self) -> &'static str;
    fn message_type(&self) -> &'static str;
    fn proxy_type(&self) -> &'static str;
    fn const_form(&self, ty: &str) -> String;
    fn pointer_to(&self, ty: &str) -> String;
    fn type_constant(&self, tc: TypeCode) -> &'static str;

    // Iterator primitives. `fail` is the caller's recovery fragment and is
    // executed verbatim inside the failure branch.
    fn append_basic(&self, iter: &str, tc: TypeCode, val: &str, fail: &str) -> String;
    fn read_basic(&self, iter: &str, val: &str) -> String;
    fn check_type(&self, iter: &str, tc: TypeCode, fail: &str) -> String;
    fn check_end(&self, iter: &str, fail: &str) -> String;
    fn open_container(
        &self,
        iter: &str,
        tc: TypeCode,
        contained: Contained,
        sub: &str,
        fail: &str,
    ) -> String;
    fn close_container(&self, iter: &str, sub: &str, fail: &str) -> String;
    fn close_container_unchecked(&self, iter: &str, sub: &str) -> String;
    fn recurse(&self, iter: &str, sub: &str) -> String;
    fn advance(&self, iter: &str) -> String;

    // Parented allocation in the generated runtime.
    fn strdup(&self, parent: &str, dst: &str, src: &str, fail: &str) -> String;
    fn alloc_struct(&self, parent: &str, dst: &str, ty: &str, fail: &str) -> String;
    fn alloc_array(&self, parent: &str, dst: &str, elem_ty: &str, fail: &str) -> String;
    fn grow_array(
        &self,
        parent: &str,
        tmp: &str,
        arr: &str,
        elem_ty: &str,
        count: &str,
        fail: &str,
    ) -> String;
    fn release(&self, val: &str) -> String;

    // Boxed variants.
    fn variant_signature(&self, val: &str) -> String;
    fn variant_append(&self, iter: &str, val: &str, fail: &str) -> String;
    fn variant_read(&self, parent: &str, iter: &str, dst: &str, fail: &str) -> String;

    // Error constructors.
    fn raise_no_memory(&self) -> String;
    fn raise_invalid_args(&self, member: &str, kind: &str) -> String;
    fn raise_error(&self, name_expr: &str, message_expr: &str) -> String;
    fn raise_reply_mismatch(&self) -> String;
}

/// The C-against-libdbus dialect.
pub struct Libdbus;

impl Dialect for Libdbus {
    fn basic_type(&self, tc: TypeCode) -> &'static str {
        match tc {
            TypeCode::Byte => "uint8_t",
            TypeCode::Boolean => "int",
            TypeCode::Int16 => "int16_t",
            TypeCode::UInt16 => "uint16_t",
            TypeCode::Int32 => "int32_t",
            TypeCode::UInt32 => "uint32_t",
            TypeCode::Int64 => "int64_t",
            TypeCode::UInt64 => "uint64_t",
            TypeCode::Double => "double",
            TypeCode::String | TypeCode::ObjectPath | TypeCode::Signature => "char *",
            TypeCode::UnixFd => "int",
            _ => unreachable!("container codes have no basic type"),
        }
    }

    fn variant_type(&self) -> &'static str {
        "DBusStubVariant *"
    }

    fn len_type(&self) -> &'static str {
        "size_t"
    }

    fn iter_type(&self) -> &'static str {
        "DBusMessageIter"
    }

    fn object_type(&self) -> &'static str {
        "DBusStubObject *"
    }

    fn message_type(&self) -> &'static str {
        "DBusStubMessage *"
    }

    fn proxy_type(&self) -> &'static str {
        "DBusStubProxy *"
    }

    fn const_form(&self, ty: &str) -> String {
        let stars = ty.chars().rev().take_while(|&c| c == '*' || c == ' ').count();
        if stars == 0 {
            format!("const {}", ty)
        } else if ty.matches('*').count() == 1 {
            format!("const {}", ty)
        } else {
            // more than one level: the pointed-to pointer is const
            let base = ty.trim_end_matches(|c| c == '*' || c == ' ');
            let depth = ty.matches('*').count();
            format!("{} {}const *", base, "* ".repeat(depth - 1))
        }
    }

    fn pointer_to(&self, ty: &str) -> String {
        if ty.ends_with('*') {
            format!("{}*", ty)
        } else {
            format!("{} *", ty)
        }
    }

    fn type_constant(&self, tc: TypeCode) -> &'static str {
        match tc {
            TypeCode::Byte => "DBUS_TYPE_BYTE",
            TypeCode::Boolean => "DBUS_TYPE_BOOLEAN",
            TypeCode::Int16 => "DBUS_TYPE_INT16",
            TypeCode::UInt16 => "DBUS_TYPE_UINT16",
            TypeCode::Int32 => "DBUS_TYPE_INT32",
            TypeCode::UInt32 => "DBUS_TYPE_UINT32",
            TypeCode::Int64 => "DBUS_TYPE_INT64",
            TypeCode::UInt64 => "DBUS_TYPE_UINT64",
            TypeCode::Double => "DBUS_TYPE_DOUBLE",
            TypeCode::String => "DBUS_TYPE_STRING",
            TypeCode::ObjectPath => "DBUS_TYPE_OBJECT_PATH",
            TypeCode::Signature => "DBUS_TYPE_SIGNATURE",
            TypeCode::UnixFd => "DBUS_TYPE_UNIX_FD",
            TypeCode::Array => "DBUS_TYPE_ARRAY",
            TypeCode::Struct => "DBUS_TYPE_STRUCT",
            TypeCode::DictEntry => "DBUS_TYPE_DICT_ENTRY",
            TypeCode::Variant => "DBUS_TYPE_VARIANT",
        }
    }

    fn append_basic(&self, iter: &str, tc: TypeCode, val: &str, fail: &str) -> String {
        format!(
            "if (! dbus_message_iter_append_basic ({}, {}, &{})) {{\n{}}}\n",
            iter,
            self.type_constant(tc),
            val,
            indent(fail, 1)
        )
    }

    fn read_basic(&self, iter: &str, val: &str) -> String {
        format!("dbus_message_iter_get_basic ({}, &{});\n", iter, val)
    }

    fn check_type(&self, iter: &str, tc: TypeCode, fail: &str) -> String {
        format!(
            "if (dbus_message_iter_get_arg_type ({}) != {}) {{\n{}}}\n",
            iter,
            self.type_constant(tc),
            indent(fail, 1)
        )
    }

    fn check_end(&self, iter: &str, fail: &str) -> String {
        format!(
            "if (dbus_message_iter_get_arg_type ({}) != DBUS_TYPE_INVALID) {{\n{}}}\n",
            iter,
            indent(fail, 1)
        )
    }

    fn open_container(
        &self,
        iter: &str,
        tc: TypeCode,
        contained: Contained,
        sub: &str,
        fail: &str,
    ) -> String {
        let sig = match contained {
            Contained::None => "NULL".to_owned(),
            Contained::Literal(s) => format!("\"{}\"", s),
            Contained::Expr(e) => e.to_owned(),
        };
        format!(
            "if (! dbus_message_iter_open_container ({}, {}, {}, &{})) {{\n{}}}\n",
            iter,
            self.type_constant(tc),
            sig,
            sub,
            indent(fail, 1)
        )
    }

    fn close_container(&self, iter: &str, sub: &str, fail: &str) -> String {
        format!(
            "if (! dbus_message_iter_close_container ({}, &{})) {{\n{}}}\n",
            iter,
            sub,
            indent(fail, 1)
        )
    }

    fn close_container_unchecked(&self, iter: &str, sub: &str) -> String {
        format!("dbus_message_iter_close_container ({}, &{});\n", iter, sub)
    }

    fn recurse(&self, iter: &str, sub: &str) -> String {
        format!("dbus_message_iter_recurse ({}, &{});\n", iter, sub)
    }

    fn advance(&self, iter: &str) -> String {
        format!("dbus_message_iter_next ({});\n", iter)
    }

    fn strdup(&self, parent: &str, dst: &str, src: &str, fail: &str) -> String {
        format!(
            "{} = dbus_stub_strdup ({}, {});\nif (! {}) {{\n{}}}\n",
            dst,
            parent,
            src,
            dst,
            indent(fail, 1)
        )
    }

    fn alloc_struct(&self, parent: &str, dst: &str, ty: &str, fail: &str) -> String {
        format!(
            "{} = dbus_stub_new ({}, {});\nif (! {}) {{\n{}}}\n",
            dst,
            parent,
            ty,
            dst,
            indent(fail, 1)
        )
    }

    fn alloc_array(&self, parent: &str, dst: &str, elem_ty: &str, fail: &str) -> String {
        format!(
            "{} = dbus_stub_realloc ({}, NULL, sizeof ({}) * (1));\nif (! {}) {{\n{}}}\n",
            dst,
            parent,
            elem_ty,
            dst,
            indent(fail, 1)
        )
    }

    fn grow_array(
        &self,
        parent: &str,
        tmp: &str,
        arr: &str,
        elem_ty: &str,
        count: &str,
        fail: &str,
    ) -> String {
        format!(
            "{} = dbus_stub_realloc ({}, {}, sizeof ({}) * ({}));\nif (! {}) {{\n{}}}\n\n{} = {};\n",
            tmp,
            parent,
            arr,
            elem_ty,
            count,
            tmp,
            indent(fail, 1),
            arr,
            tmp
        )
    }

    fn release(&self, val: &str) -> String {
        format!("dbus_stub_free ({});\n", val)
    }

    fn variant_signature(&self, val: &str) -> String {
        format!("{}->signature", val)
    }

    fn variant_append(&self, iter: &str, val: &str, fail: &str) -> String {
        format!(
            "if (! dbus_stub_variant_append ({}, {})) {{\n{}}}\n",
            iter,
            val,
            indent(fail, 1)
        )
    }

    fn variant_read(&self, parent: &str, iter: &str, dst: &str, fail: &str) -> String {
        format!(
            "if (! dbus_stub_variant_read ({}, {}, &{})) {{\n{}}}\n",
            parent,
            iter,
            dst,
            indent(fail, 1)
        )
    }

    fn raise_no_memory(&self) -> String {
        "dbus_stub_error_raise_no_memory ();\n".to_owned()
    }

    fn raise_invalid_args(&self, member: &str, kind: &str) -> String {
        format!(
            "dbus_stub_error_raise (DBUS_ERROR_INVALID_ARGS,\n                       \"Invalid arguments to {} {}\");\n",
            member, kind
        )
    }

    fn raise_error(&self, name_expr: &str, message_expr: &str) -> String {
        format!("dbus_stub_error_raise ({}, {});\n", name_expr, message_expr)
    }

    fn raise_reply_mismatch(&self) -> String {
        "dbus_stub_error_raise (DBUS_ERROR_INVALID_ARGS,\n                       \"Invalid arguments received in reply\");\n"
            .to_owned()
    }
}

/// The natural target form of one complete type: the value type, an
/// optional length companion (with its pointer depth, which grows by one
/// per enclosing array), and any typedefs compound values need.
#[derive(Debug, Clone)]
pub struct NaturalType {
    pub value: String,
    pub len: Option<usize>,
    pub structs: Vec<StructDecl>,
}

impl NaturalType {
    /// The declared type of the length companion, if any.
    pub fn len_ty(&self, d: &dyn Dialect) -> Option<String> {
        self.len.map(|depth| {
            if depth == 0 {
                d.len_type().to_owned()
            } else {
                format!("{} {}", d.len_type(), "*".repeat(depth))
            }
        })
    }
}

fn ptr(ty: &str) -> String {
    if ty.ends_with('*') {
        format!("{}*", ty)
    } else {
        format!("{} *", ty)
    }
}

/// Map the complete type at the walker's cursor to its natural form.
/// `camel` is the CamelCase naming context for generated typedefs.
pub fn natural_type(
    d: &dyn Dialect,
    w: &Walker,
    camel: &str,
) -> Result<NaturalType, SignatureError> {
    Ok(match w.token()? {
        Token::Basic(tc) => NaturalType {
            value: d.basic_type(tc).to_owned(),
            len: None,
            structs: Vec::new(),
        },
        Token::Variant => NaturalType {
            value: d.variant_type().to_owned(),
            len: None,
            structs: Vec::new(),
        },
        Token::Struct(fields) => {
            let (decl, mut structs) = struct_decl(d, fields, camel)?;
            let value = ptr(&decl.name);
            structs.push(decl);
            NaturalType { value, len: None, structs }
        }
        Token::DictEntry(entry) => {
            let (decl, mut structs) = entry_decl(d, entry, camel)?;
            let value = ptr(&decl.name);
            structs.push(decl);
            NaturalType { value, len: None, structs }
        }
        Token::Array(elem) => {
            let elem_code = elem.code()?;
            if elem_code.is_fixed() {
                NaturalType {
                    value: ptr(d.basic_type(elem_code)),
                    len: Some(0),
                    structs: Vec::new(),
                }
            } else if elem_code.is_string_like() {
                NaturalType {
                    value: ptr(d.basic_type(elem_code)),
                    len: None,
                    structs: Vec::new(),
                }
            } else {
                let inner = natural_type(d, &elem, &format!("{}Element", camel))?;
                NaturalType {
                    value: ptr(&inner.value),
                    len: inner.len.map(|depth| depth + 1),
                    structs: inner.structs,
                }
            }
        }
    })
}

fn struct_decl(
    d: &dyn Dialect,
    mut fields: Walker,
    camel: &str,
) -> Result<(StructDecl, Vec<StructDecl>), SignatureError> {
    let mut out = Vec::new();
    let mut members = Vec::new();
    let mut idx = 0;
    loop {
        let nt = natural_type(d, &fields, &format!("{}Item{}", camel, idx))?;
        members.push(TypeVar::new(nt.value.clone(), format!("item{}", idx)));
        if let Some(len_ty) = nt.len_ty(d) {
            members.push(TypeVar::new(len_ty, format!("item{}_len", idx)));
        }
        out.extend(nt.structs);
        idx += 1;
        if !fields.advance()? {
            break;
        }
    }
    Ok((StructDecl { name: camel.to_owned(), fields: members }, out))
}

fn entry_decl(
    d: &dyn Dialect,
    mut entry: Walker,
    camel: &str,
) -> Result<(StructDecl, Vec<StructDecl>), SignatureError> {
    let mut out = Vec::new();
    let mut members = Vec::new();
    let key = natural_type(d, &entry, &format!("{}Key", camel))?;
    members.push(TypeVar::new(key.value.clone(), "key"));
    entry.advance()?;
    let value = natural_type(d, &entry, &format!("{}Value", camel))?;
    members.push(TypeVar::new(value.value.clone(), "value"));
    if let Some(len_ty) = value.len_ty(d) {
        members.push(TypeVar::new(len_ty, "value_len"));
    }
    out.extend(key.structs);
    out.extend(value.structs);
    Ok((StructDecl { name: camel.to_owned(), fields: members }, out))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nt(sig: &str) -> NaturalType {
        let w = Walker::single(sig).unwrap();
        natural_type(&Libdbus, &w, "MyTestDoValue").unwrap()
    }

    #[test]
    fn basic_scalars() {
        assert_eq!(nt("i").value, "int32_t");
        assert_eq!(nt("b").value, "int");
        assert_eq!(nt("t").value, "uint64_t");
        assert_eq!(nt("h").value, "int");
        assert_eq!(nt("s").value, "char *");
        assert_eq!(nt("o").value, "char *");
    }

    #[test]
    fn fixed_arrays_carry_a_length() {
        let a = nt("au");
        assert_eq!(a.value, "uint32_t *");
        assert_eq!(a.len, Some(0));
        assert_eq!(a.len_ty(&Libdbus).unwrap(), "size_t");
    }

    #[test]
    fn string_arrays_are_null_terminated() {
        let a = nt("as");
        assert_eq!(a.value, "char **");
        assert_eq!(a.len, None);
    }

    #[test]
    fn nested_fixed_arrays_lift_the_length() {
        let a = nt("aai");
        assert_eq!(a.value, "int32_t **");
        assert_eq!(a.len, Some(1));
        assert_eq!(a.len_ty(&Libdbus).unwrap(), "size_t *");
    }

    #[test]
    fn structs_generate_typedefs() {
        let s = nt("(isau)");
        assert_eq!(s.value, "MyTestDoValue *");
        assert_eq!(s.structs.len(), 1);
        let decl = &s.structs[0];
        assert_eq!(decl.name, "MyTestDoValue");
        let names: Vec<&str> = decl.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["item0", "item1", "item2", "item2_len"]);
        assert_eq!(decl.fields[1].ty, "char *");
        assert_eq!(decl.fields[3].ty, "size_t");
    }

    #[test]
    fn dict_arrays_generate_entry_typedefs() {
        let m = nt("a{sv}");
        assert_eq!(m.value, "MyTestDoValueElement **");
        assert_eq!(m.len, None);
        assert_eq!(m.structs.len(), 1);
        let decl = &m.structs[0];
        assert_eq!(decl.fields[0].name, "key");
        assert_eq!(decl.fields[0].ty, "char *");
        assert_eq!(decl.fields[1].name, "value");
        assert_eq!(decl.fields[1].ty, "DBusStubVariant *");
    }

    #[test]
    fn nested_structs_accumulate_typedefs() {
        let s = nt("(i(ss))");
        assert_eq!(s.structs.len(), 2);
        assert_eq!(s.structs[0].name, "MyTestDoValueItem1");
        assert_eq!(s.structs[1].name, "MyTestDoValue");
        assert_eq!(s.structs[1].fields[1].ty, "MyTestDoValueItem1 *");
    }

    #[test]
    fn const_forms() {
        let d = Libdbus;
        assert_eq!(d.const_form("int32_t"), "const int32_t");
        assert_eq!(d.const_form("char *"), "const char *");
        assert_eq!(d.const_form("char **"), "char * const *");
        assert_eq!(d.pointer_to("char *"), "char **");
        assert_eq!(d.pointer_to("int32_t"), "int32_t *");
    }
}
