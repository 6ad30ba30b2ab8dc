//! Generation of code that reads a typed value out of a message iterator.
//!
//! The inverse of the marshaller: `demarshal` walks one complete type and
//! returns a fragment that validates the wire type, allocates any storage
//! under the caller-named owner, and advances the iterator exactly once
//! past the consumed value. The caller supplies two recovery fragments:
//! one for allocation failure and one for a wire type mismatch. Within a
//! single step the type check always precedes any allocation.

use crate::dialect::{natural_type, Dialect};
use crate::func::{join_blocks as blank_join, Fragment, TypeVar};
use crate::signature::{SignatureError, Token, TypeCode, Walker};

/// Generate demarshalling code for the complete type at `w`.
///
/// `iter` is the iterator expression (already a pointer), `parent` the
/// owner of any allocated storage, `name` the output value name.
#[allow(clippy::too_many_arguments)]
pub fn demarshal(
    d: &dyn Dialect,
    w: &Walker,
    iter: &str,
    parent: &str,
    name: &str,
    oom: &str,
    type_err: &str,
    camel: &str,
) -> Result<Fragment, SignatureError> {
    let nt = natural_type(d, w, camel)?;
    let mut f = Fragment::new();
    f.structs = nt.structs.clone();
    f.vars.push(TypeVar::new(nt.value.clone(), name));
    let len = if let Some(len_ty) = nt.len_ty(d) {
        let len_name = format!("{}_len", name);
        f.vars.push(TypeVar::new(len_ty, len_name.clone()));
        Some(len_name)
    } else {
        None
    };
    f.code = demarshal_type(
        d,
        w,
        iter,
        parent,
        name,
        name,
        len.as_deref(),
        oom,
        type_err,
        camel,
        &mut f.locals,
    )?;
    Ok(f)
}

#[allow(clippy::too_many_arguments)]
fn demarshal_type(
    d: &dyn Dialect,
    w: &Walker,
    iter: &str,
    parent: &str,
    expr: &str,
    sym: &str,
    len: Option<&str>,
    oom: &str,
    type_err: &str,
    camel: &str,
    locals: &mut Vec<TypeVar>,
) -> Result<String, SignatureError> {
    match w.token()? {
        Token::Basic(tc) if tc.is_string_like() => {
            let dup = format!("{}_dbus", sym);
            locals.push(TypeVar::new("const char *", dup.clone()));
            Ok(blank_join(vec![
                d.check_type(iter, tc, type_err),
                d.read_basic(iter, &dup),
                d.strdup(parent, expr, &dup, oom),
                d.advance(iter),
            ]))
        }
        Token::Basic(tc) => Ok(blank_join(vec![
            d.check_type(iter, tc, type_err),
            d.read_basic(iter, expr),
            d.advance(iter),
        ])),
        Token::Variant => Ok(blank_join(vec![
            d.check_type(iter, TypeCode::Variant, type_err),
            d.variant_read(parent, iter, expr, oom),
            d.advance(iter),
        ])),
        Token::Struct(fields) => demarshal_struct(
            d, fields, iter, parent, expr, sym, oom, type_err, camel, locals,
        ),
        Token::DictEntry(entry) => demarshal_entry(
            d, entry, iter, parent, expr, sym, oom, type_err, camel, locals,
        ),
        Token::Array(elem) => demarshal_array(
            d, elem, iter, parent, expr, sym, len, oom, type_err, camel, locals,
        ),
    }
}

/// Recovery that gives a partially built value back to its parent before
/// running the caller's own recovery.
fn release_first(d: &dyn Dialect, expr: &str, oom: &str) -> String {
    format!("{}{} = NULL;\n{}", d.release(expr), expr, oom)
}

#[allow(clippy::too_many_arguments)]
fn demarshal_struct(
    d: &dyn Dialect,
    fields: Walker,
    iter: &str,
    parent: &str,
    expr: &str,
    sym: &str,
    oom: &str,
    type_err: &str,
    camel: &str,
    locals: &mut Vec<TypeVar>,
) -> Result<String, SignatureError> {
    let sub = format!("{}_iter", sym);
    locals.push(TypeVar::new(d.iter_type(), sub.clone()));
    let sub_iter = format!("&{}", sub);
    let field_oom = release_first(d, expr, oom);

    let mut blocks = vec![
        d.check_type(iter, TypeCode::Struct, type_err),
        d.recurse(iter, &sub),
        d.alloc_struct(parent, expr, camel, oom),
    ];
    let mut field = fields;
    let mut idx = 0;
    loop {
        let field_camel = format!("{}Item{}", camel, idx);
        let nt = natural_type(d, &field, &field_camel)?;
        let field_len = nt.len.map(|_| format!("{}->item{}_len", expr, idx));
        blocks.push(demarshal_type(
            d,
            &field,
            &sub_iter,
            expr,
            &format!("{}->item{}", expr, idx),
            &format!("{}_item{}", sym, idx),
            field_len.as_deref(),
            &field_oom,
            type_err,
            &field_camel,
            locals,
        )?);
        idx += 1;
        if !field.advance()? {
            break;
        }
    }
    blocks.push(d.check_end(&sub_iter, type_err));
    blocks.push(d.advance(iter));
    Ok(blank_join(blocks))
}

#[allow(clippy::too_many_arguments)]
fn demarshal_entry(
    d: &dyn Dialect,
    entry: Walker,
    iter: &str,
    parent: &str,
    expr: &str,
    sym: &str,
    oom: &str,
    type_err: &str,
    camel: &str,
    locals: &mut Vec<TypeVar>,
) -> Result<String, SignatureError> {
    let sub = format!("{}_iter", sym);
    locals.push(TypeVar::new(d.iter_type(), sub.clone()));
    let sub_iter = format!("&{}", sub);
    let field_oom = release_first(d, expr, oom);

    let key = entry;
    let mut value = entry;
    value.advance()?;
    let value_nt = natural_type(d, &value, &format!("{}Value", camel))?;
    let value_len = value_nt.len.map(|_| format!("{}->value_len", expr));

    Ok(blank_join(vec![
        d.check_type(iter, TypeCode::DictEntry, type_err),
        d.recurse(iter, &sub),
        d.alloc_struct(parent, expr, camel, oom),
        demarshal_type(
            d,
            &key,
            &sub_iter,
            expr,
            &format!("{}->key", expr),
            &format!("{}_key", sym),
            None,
            &field_oom,
            type_err,
            &format!("{}Key", camel),
            locals,
        )?,
        demarshal_type(
            d,
            &value,
            &sub_iter,
            expr,
            &format!("{}->value", expr),
            &format!("{}_value", sym),
            value_len.as_deref(),
            &field_oom,
            type_err,
            &format!("{}Value", camel),
            locals,
        )?,
        d.check_end(&sub_iter, type_err),
        d.advance(iter),
    ]))
}

#[allow(clippy::too_many_arguments)]
fn demarshal_array(
    d: &dyn Dialect,
    elem: Walker,
    iter: &str,
    parent: &str,
    expr: &str,
    sym: &str,
    len: Option<&str>,
    oom: &str,
    type_err: &str,
    camel: &str,
    locals: &mut Vec<TypeVar>,
) -> Result<String, SignatureError> {
    let sub = format!("{}_iter", sym);
    let size = format!("{}_size", sym);
    let element = format!("{}_element", sym);
    let tmp = format!("{}_tmp", sym);
    let sub_iter = format!("&{}", sub);
    let elem_camel = format!("{}Element", camel);
    let elem_code = elem.code()?;
    let elem_nt = natural_type(d, &elem, &elem_camel)?;
    let arr_ty = d.pointer_to(&elem_nt.value);
    let null_terminated = !elem_code.is_fixed();

    locals.push(TypeVar::new(d.iter_type(), sub.clone()));
    locals.push(TypeVar::new(d.len_type(), size.clone()));
    locals.push(TypeVar::new(elem_nt.value.clone(), element.clone()));
    locals.push(TypeVar::new(arr_ty.clone(), tmp.clone()));

    let arr_oom = release_first(d, expr, oom);

    // the element's own length, lifted into a parallel array
    let elem_len = if elem_nt.len.is_some() {
        let elem_len = format!("{}_len", element);
        locals.push(TypeVar::new(
            elem_nt.len_ty(d).unwrap_or_else(|| d.len_type().to_owned()),
            elem_len.clone(),
        ));
        Some(elem_len)
    } else {
        None
    };
    let len_arr = if elem_len.is_some() {
        Some(len.ok_or(SignatureError::Empty)?)
    } else {
        None
    };
    let len_tmp = format!("{}_len_tmp", sym);
    if len_arr.is_some() {
        locals.push(TypeVar::new(
            d.pointer_to(&elem_nt.len_ty(d).unwrap_or_else(|| d.len_type().to_owned())),
            len_tmp.clone(),
        ));
    }

    let mut pre = vec![
        d.check_type(iter, TypeCode::Array, type_err),
        d.recurse(iter, &sub),
        format!("{} = 0;\n", size),
        d.alloc_array(parent, expr, &elem_nt.value, oom),
    ];
    if let Some(len_arr) = &len_arr {
        let len_elem_ty = elem_nt.len_ty(d).unwrap_or_else(|| d.len_type().to_owned());
        pre.push(d.alloc_array(parent, len_arr, &len_elem_ty, &arr_oom));
    }

    // loop body: element first (type checks precede allocation), then grow
    let mut body = vec![demarshal_type(
        d,
        &elem,
        &sub_iter,
        expr,
        &element,
        &element,
        elem_len.as_deref(),
        &arr_oom,
        type_err,
        &elem_camel,
        locals,
    )?];
    let slack = if null_terminated { 2 } else { 1 };
    body.push(d.grow_array(
        parent,
        &tmp,
        expr,
        &elem_nt.value,
        &format!("{} + {}", size, slack),
        &arr_oom,
    ));
    let mut stores = format!("{}[{}] = {};\n", expr, size, element);
    if let (Some(len_arr), Some(elem_len)) = (&len_arr, &elem_len) {
        let len_elem_ty = elem_nt.len_ty(d).unwrap_or_else(|| d.len_type().to_owned());
        body.push(d.grow_array(
            parent,
            &len_tmp,
            len_arr,
            &len_elem_ty,
            &format!("{} + 1", size),
            &arr_oom,
        ));
        stores.push_str(&format!("{}[{}] = {};\n", len_arr, size, elem_len));
    }
    stores.push_str(&format!("{}++;\n", size));
    body.push(stores);

    let loop_code = format!(
        "while (dbus_message_iter_get_arg_type ({}) != DBUS_TYPE_INVALID) {{\n{}}}\n",
        sub_iter,
        crate::func::indent(&blank_join(body), 1)
    );

    let mut post = Vec::new();
    if null_terminated {
        post.push(format!("{}[{}] = NULL;\n", expr, size));
    }
    if elem_code.is_fixed() {
        let count = len.ok_or(SignatureError::Empty)?;
        post.push(format!("{} = {};\n", count, size));
    }
    post.push(d.advance(iter));

    let mut blocks = pre;
    blocks.push(loop_code);
    blocks.extend(post);
    Ok(blank_join(blocks))
}
