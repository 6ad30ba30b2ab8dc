//! Generation of code that appends a typed value onto a message iterator.
//!
//! `marshal` walks one complete type and returns the code fragment plus
//! the inputs the caller must supply and the locals the fragment needs.
//! The caller provides the out-of-memory recovery fragment; whenever the
//! fragment has a container open, the recovery it threads downwards closes
//! that container first, so iterator open/close balances on every path.

use crate::dialect::{natural_type, Contained, Dialect};
use crate::func::{join_blocks as blank_join, Fragment, TypeVar};
use crate::signature::{SignatureError, Token, TypeCode, Walker};

/// Generate marshalling code for the complete type at `w`.
///
/// `iter` is the iterator expression (already a pointer), `name` the input
/// value name, `oom` the caller's out-of-memory recovery, and `camel` the
/// CamelCase context used to name generated typedefs.
pub fn marshal(
    d: &dyn Dialect,
    w: &Walker,
    iter: &str,
    name: &str,
    oom: &str,
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
    f.code = marshal_type(d, w, iter, name, name, len.as_deref(), oom, camel, &mut f.locals)?;
    Ok(f)
}

#[allow(clippy::too_many_arguments)]
fn marshal_type(
    d: &dyn Dialect,
    w: &Walker,
    iter: &str,
    expr: &str,
    sym: &str,
    len: Option<&str>,
    oom: &str,
    camel: &str,
    locals: &mut Vec<TypeVar>,
) -> Result<String, SignatureError> {
    match w.token()? {
        Token::Basic(tc) => Ok(d.append_basic(iter, tc, expr, oom)),
        Token::Variant => marshal_variant(d, iter, expr, sym, oom, locals),
        Token::Struct(fields) => marshal_struct(d, fields, iter, expr, sym, oom, camel, locals),
        Token::DictEntry(entry) => marshal_entry(d, entry, iter, expr, sym, oom, camel, locals),
        Token::Array(elem) => {
            marshal_array(d, elem, iter, expr, sym, len, oom, camel, locals)
        }
    }
}

fn marshal_variant(
    d: &dyn Dialect,
    iter: &str,
    expr: &str,
    sym: &str,
    oom: &str,
    locals: &mut Vec<TypeVar>,
) -> Result<String, SignatureError> {
    let sub = format!("{}_iter", sym);
    locals.push(TypeVar::new(d.iter_type(), sub.clone()));
    let sig = d.variant_signature(expr);
    let inner_oom = format!("{}{}", d.close_container_unchecked(iter, &sub), oom);
    Ok(blank_join(vec![
        d.open_container(iter, TypeCode::Variant, Contained::Expr(&sig), &sub, oom),
        d.variant_append(&format!("&{}", sub), expr, &inner_oom),
        d.close_container(iter, &sub, oom),
    ]))
}

#[allow(clippy::too_many_arguments)]
fn marshal_struct(
    d: &dyn Dialect,
    fields: Walker,
    iter: &str,
    expr: &str,
    sym: &str,
    oom: &str,
    camel: &str,
    locals: &mut Vec<TypeVar>,
) -> Result<String, SignatureError> {
    let sub = format!("{}_iter", sym);
    locals.push(TypeVar::new(d.iter_type(), sub.clone()));
    let inner_oom = format!("{}{}", d.close_container_unchecked(iter, &sub), oom);
    let sub_iter = format!("&{}", sub);

    let mut blocks = vec![d.open_container(iter, TypeCode::Struct, Contained::None, &sub, oom)];
    let mut field = fields;
    let mut idx = 0;
    loop {
        let field_camel = format!("{}Item{}", camel, idx);
        let nt = natural_type(d, &field, &field_camel)?;
        let field_len = nt.len.map(|_| format!("{}->item{}_len", expr, idx));
        blocks.push(marshal_type(
            d,
            &field,
            &sub_iter,
            &format!("{}->item{}", expr, idx),
            &format!("{}_item{}", sym, idx),
            field_len.as_deref(),
            &inner_oom,
            &field_camel,
            locals,
        )?);
        idx += 1;
        if !field.advance()? {
            break;
        }
    }
    blocks.push(d.close_container(iter, &sub, oom));
    Ok(blank_join(blocks))
}

#[allow(clippy::too_many_arguments)]
fn marshal_entry(
    d: &dyn Dialect,
    entry: Walker,
    iter: &str,
    expr: &str,
    sym: &str,
    oom: &str,
    camel: &str,
    locals: &mut Vec<TypeVar>,
) -> Result<String, SignatureError> {
    let sub = format!("{}_iter", sym);
    locals.push(TypeVar::new(d.iter_type(), sub.clone()));
    let inner_oom = format!("{}{}", d.close_container_unchecked(iter, &sub), oom);
    let sub_iter = format!("&{}", sub);

    let key = entry;
    let mut value = entry;
    value.advance()?;

    let value_nt = natural_type(d, &value, &format!("{}Value", camel))?;
    let value_len = value_nt.len.map(|_| format!("{}->value_len", expr));

    let blocks = vec![
        d.open_container(iter, TypeCode::DictEntry, Contained::None, &sub, oom),
        marshal_type(
            d,
            &key,
            &sub_iter,
            &format!("{}->key", expr),
            &format!("{}_key", sym),
            None,
            &inner_oom,
            &format!("{}Key", camel),
            locals,
        )?,
        marshal_type(
            d,
            &value,
            &sub_iter,
            &format!("{}->value", expr),
            &format!("{}_value", sym),
            value_len.as_deref(),
            &inner_oom,
            &format!("{}Value", camel),
            locals,
        )?,
        d.close_container(iter, &sub, oom),
    ];
    Ok(blank_join(blocks))
}

#[allow(clippy::too_many_arguments)]
fn marshal_array(
    d: &dyn Dialect,
    elem: Walker,
    iter: &str,
    expr: &str,
    sym: &str,
    len: Option<&str>,
    oom: &str,
    camel: &str,
    locals: &mut Vec<TypeVar>,
) -> Result<String, SignatureError> {
    let sub = format!("{}_iter", sym);
    let counter = format!("{}_i", sym);
    locals.push(TypeVar::new(d.iter_type(), sub.clone()));
    locals.push(TypeVar::new(d.len_type(), counter.clone()));
    let inner_oom = format!("{}{}", d.close_container_unchecked(iter, &sub), oom);
    let sub_iter = format!("&{}", sub);
    let elem_sig = elem.complete_signature()?;
    let elem_code = elem.code()?;
    let elem_camel = format!("{}Element", camel);

    let open = d.open_container(
        iter,
        TypeCode::Array,
        Contained::Literal(elem_sig),
        &sub,
        oom,
    );
    let close = d.close_container(iter, &sub, oom);

    let body;
    let head;
    if elem_code.is_fixed() {
        // counted loop over a fixed-width element array
        let count = len.ok_or(SignatureError::Empty)?;
        head = format!("for ({c} = 0; {c} < {count}; {c}++) {{\n", c = counter, count = count);
        body = d.append_basic(
            &sub_iter,
            elem_code,
            &format!("{}[{}]", expr, counter),
            &inner_oom,
        );
    } else if elem_code.is_string_like() {
        head = format!("for ({c} = 0; {expr}[{c}]; {c}++) {{\n", c = counter, expr = expr);
        body = d.append_basic(
            &sub_iter,
            elem_code,
            &format!("{}[{}]", expr, counter),
            &inner_oom,
        );
    } else {
        // pointer elements, NULL-terminated
        let element = format!("{}_element", sym);
        let elem_nt = natural_type(d, &elem, &elem_camel)?;
        locals.push(TypeVar::new(elem_nt.value.clone(), element.clone()));
        let elem_len = if elem_nt.len.is_some() {
            let l = len.ok_or(SignatureError::Empty)?;
            Some(format!("{}[{}]", l, counter))
        } else {
            None
        };
        head = format!("for ({c} = 0; {expr}[{c}]; {c}++) {{\n", c = counter, expr = expr);
        let assign = format!("{} = {}[{}];\n", element, expr, counter);
        let inner = marshal_type(
            d,
            &elem,
            &sub_iter,
            &element,
            &element,
            elem_len.as_deref(),
            &inner_oom,
            &elem_camel,
            locals,
        )?;
        body = blank_join(vec![assign, inner]);
    }

    let loop_code = format!("{}{}}}\n", head, crate::func::indent(&body, 1));
    Ok(blank_join(vec![open, loop_code, close]))
}
