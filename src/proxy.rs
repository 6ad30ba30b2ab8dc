//! Client-side stub composers.
//!
//! Sync stubs build a method call, block for the reply and translate
//! error replies: the standard no-memory error name raises the local
//! no-memory condition, anything else becomes a raised error carrying the
//! remote name and message. Reply demarshalling that can fail on
//! allocation is wrapped in a retry loop that exits once the output slot
//! is set. Async stubs come in pairs: a caller-facing function that
//! registers a pending call and a file-local notify function that runs
//! the user continuation at most once; releasing the pending call drops
//! the continuation without running it.
//!
//! Every client-facing prototype carries `warn_unused_result`, plus
//! `deprecated` when the interface or member is marked deprecated.

use crate::demarshal::demarshal;
use crate::dialect::{natural_type, Contained, Dialect};
use crate::func::{
    join_blocks, render_function, Attribute, Fragment, FuncPrototype, StructDecl, TypeVar,
};
use crate::marshal::marshal;
use crate::model::{make_camel, Interface, Method, Property};
use crate::signature::{SignatureError, TypeCode, Walker};

/// The lists the proxy composers append to while generating one
/// interface.
#[derive(Debug, Default)]
pub struct Collected {
    pub prototypes: Vec<FuncPrototype>,
    pub statics: Vec<FuncPrototype>,
    pub typedefs: Vec<String>,
    pub structs: Vec<StructDecl>,
}

impl Collected {
    pub fn new() -> Collected {
        Collected::default()
    }

    fn adopt_structs(&mut self, frag: &Fragment) {
        for s in &frag.structs {
            if !self.structs.iter().any(|x| x.name == s.name) {
                self.structs.push(s.clone());
            }
        }
    }
}

fn client_attribs(proto: &mut FuncPrototype, intf: &Interface, deprecated: bool) {
    proto.attrib(Attribute::WarnUnusedResult);
    if intf.deprecated || deprecated {
        proto.attrib(Attribute::Deprecated);
    }
}

fn entry_asserts(proto: &FuncPrototype) -> String {
    let mut s = String::new();
    for arg in &proto.args {
        // `parent` may be NULL (top-level ownership) and `data` is opaque
        if arg.ty.ends_with('*') && arg.name != "data" && arg.name != "parent" {
            s.push_str(&format!("assert ({} != NULL);\n", arg.name));
        }
    }
    s
}

/// The construction of a method-call message, shared by every sync and
/// async caller.
fn construct_call(interface: &str, member: &str, bail: &str) -> String {
    format!(
        "/* Construct the method call message. */\n\
         method_call = dbus_message_new_method_call (proxy->name, proxy->path, \"{}\", \"{}\");\n\
         if (! method_call) {{\n{}}}\n\
         \n\
         dbus_message_iter_init_append (method_call, &iter);\n",
        interface,
        member,
        crate::func::indent(bail, 1)
    )
}

/// The blocking send plus the error-reply translation.
fn send_and_wait(d: &dyn Dialect, timeout: i32) -> String {
    format!(
        "/* Send the message, and wait for the reply. */\n\
         dbus_error_init (&error);\n\
         \n\
         reply = dbus_connection_send_with_reply_and_block (proxy->connection, method_call, {}, &error);\n\
         if (! reply) {{\n\
         \tdbus_message_unref (method_call);\n\
         \n\
         \tif (dbus_error_has_name (&error, DBUS_ERROR_NO_MEMORY)) {{\n\
         \t\t{}\
         \t}} else {{\n\
         \t\t{}\
         \t}}\n\
         \n\
         \tdbus_error_free (&error);\n\
         \treturn -1;\n\
         }}\n\
         \n\
         dbus_message_unref (method_call);\n",
        timeout,
        d.raise_no_memory(),
        d.raise_error("error.name", "error.message")
    )
}

/// Wrap allocation-sensitive demarshalling in the retry loop that exits
/// once `cond` is set.
fn oom_retry_loop(body: &str, cond: &str) -> String {
    format!(
        "do {{\n\t__label__ enomem;\n\n{}\
         enomem: __attribute__ ((unused));\n\
         }} while (! {});\n",
        crate::func::indent(body, 1),
        cond
    )
}

fn call_locals(d: &dyn Dialect) -> Vec<TypeVar> {
    vec![
        TypeVar::new("DBusMessage *", "method_call"),
        TypeVar::new(d.iter_type(), "iter"),
        TypeVar::new("DBusError", "error"),
        TypeVar::new("DBusMessage *", "reply"),
    ]
}

/// Generate the synchronous call function for one method.
pub fn method_proxy_sync_function(
    d: &dyn Dialect,
    prefix: &str,
    intf: &Interface,
    method: &Method,
    timeout: i32,
    out: &mut Collected,
) -> Result<String, SignatureError> {
    let isym = intf.symbol();
    let msym = method.symbol();
    let name = format!("{}_{}_{}_sync", prefix, isym, msym);
    let camel = make_camel(&format!("{}_{}_{}", prefix, isym, msym));

    let mut proto = FuncPrototype::new("int", &name);
    client_attribs(&mut proto, intf, method.deprecated);
    proto
        .arg("const void *", "parent")
        .arg(d.proxy_type(), "proxy");

    let mut locals = call_locals(d);
    let bail = format!("{}return -1;\n", d.raise_no_memory());

    // Marshal the inputs into the method call.
    let marshal_oom = format!("dbus_message_unref (method_call);\n{}", bail);
    let mut in_blocks = Vec::new();
    for (idx, arg) in method.in_args() {
        let aname = arg.symbol(idx);
        let w = Walker::single(&arg.typ)?;
        let frag = marshal(
            d,
            &w,
            "&iter",
            &aname,
            &marshal_oom,
            &format!("{}{}", camel, make_camel(&aname)),
        )?;
        out.adopt_structs(&frag);
        for var in &frag.vars {
            proto.arg(d.const_form(&var.ty), &var.name);
        }
        locals.extend(frag.locals.iter().cloned());
        in_blocks.push(frag.code);
    }

    // Demarshal the outputs from the reply into locals.
    let type_err = format!(
        "dbus_message_unref (reply);\n{}return -1;\n",
        d.raise_reply_mismatch()
    );
    let mut out_frags: Vec<Fragment> = Vec::new();
    let mut retry_cond: Option<String> = None;
    for (idx, arg) in method.out_args() {
        let aname = arg.symbol(idx);
        let local = format!("{}_local", aname);
        let w = Walker::single(&arg.typ)?;
        let nt = natural_type(d, &w, &format!("{}{}", camel, make_camel(&aname)))?;
        if retry_cond.is_none() && nt.value.ends_with('*') {
            retry_cond = Some(format!("*{}", aname));
        }
        let oom = match &retry_cond {
            Some(cond) => format!("{} = NULL;\ngoto enomem;\n", cond),
            None => format!("dbus_message_unref (reply);\n{}", bail),
        };
        let frag = demarshal(
            d,
            &w,
            "&iter",
            "parent",
            &local,
            &oom,
            &type_err,
            &format!("{}{}", camel, make_camel(&aname)),
        )?;
        out.adopt_structs(&frag);
        for var in &frag.vars {
            let param = var.name.replacen("_local", "", 1);
            proto.arg(d.pointer_to(&var.ty), param);
            locals.push(var.clone());
        }
        locals.extend(frag.locals.iter().cloned());
        out_frags.push(frag);
    }

    // A retry restarts from the top of the reply, so the iterator init
    // lives inside the loop when there is one.
    let init =
        "/* Iterate the arguments of the reply. */\ndbus_message_iter_init (reply, &iter);\n"
            .to_owned();
    let mut reply_body = vec![init];
    for frag in &out_frags {
        reply_body.push(frag.code.clone());
    }
    reply_body.push(d.check_end("&iter", &type_err));
    let mut copies = String::new();
    for frag in &out_frags {
        for var in &frag.vars {
            let param = var.name.replacen("_local", "", 1);
            copies.push_str(&format!("*{} = {};\n", param, var.name));
        }
    }
    if !copies.is_empty() {
        reply_body.push(copies);
    }

    let reply_block = match retry_cond {
        Some(cond) => oom_retry_loop(&join_blocks(reply_body), &cond),
        None => join_blocks(reply_body),
    };

    let mut blocks = vec![construct_call(&intf.name, &method.name, &bail)];
    blocks.extend(in_blocks);
    blocks.push(send_and_wait(d, timeout));
    blocks.push(reply_block);
    blocks.push("dbus_message_unref (reply);\n".to_owned());
    blocks.push("return 0;\n".to_owned());

    let body = format!("{}\n{}", entry_asserts(&proto), join_blocks(blocks));
    let code = render_function(&proto, &locals, &body);
    out.prototypes.push(proto);
    Ok(code)
}

/// Generate the asynchronous call pair for one method: the caller-facing
/// function that registers the pending call, and the file-local notify
/// function that demarshals the reply and runs the continuation.
pub fn method_proxy_async_functions(
    d: &dyn Dialect,
    prefix: &str,
    intf: &Interface,
    method: &Method,
    timeout: i32,
    out: &mut Collected,
) -> Result<String, SignatureError> {
    let isym = intf.symbol();
    let msym = method.symbol();
    let name = format!("{}_{}_{}", prefix, isym, msym);
    let notify_name = format!("{}_notify", name);
    let camel = make_camel(&name);
    let reply_cb = format!("{}Reply", camel);

    // The continuation typedef the caller supplies.
    let mut cb_args = vec![
        TypeVar::new("void *", "data"),
        TypeVar::new(d.message_type(), "message"),
    ];

    let mut caller = FuncPrototype::new("DBusPendingCall *", &name);
    client_attribs(&mut caller, intf, method.deprecated);
    caller.arg(d.proxy_type(), "proxy");

    let mut caller_locals = vec![
        TypeVar::new("DBusMessage *", "method_call"),
        TypeVar::new(d.iter_type(), "iter"),
        TypeVar::new("DBusPendingCall *", "pending_call"),
        TypeVar::new("DBusStubPending *", "pending_data"),
    ];

    let bail = format!("{}return NULL;\n", d.raise_no_memory());
    let marshal_oom = format!("dbus_message_unref (method_call);\n{}", bail);

    let mut in_blocks = Vec::new();
    for (idx, arg) in method.in_args() {
        let aname = arg.symbol(idx);
        let w = Walker::single(&arg.typ)?;
        let frag = marshal(
            d,
            &w,
            "&iter",
            &aname,
            &marshal_oom,
            &format!("{}{}", camel, make_camel(&aname)),
        )?;
        out.adopt_structs(&frag);
        for var in &frag.vars {
            caller.arg(d.const_form(&var.ty), &var.name);
        }
        caller_locals.extend(frag.locals.iter().cloned());
        in_blocks.push(frag.code);
    }

    caller
        .arg(reply_cb.clone(), "handler")
        .arg("DBusStubErrorHandler", "error_handler")
        .arg("void *", "data");

    let construct = format!(
        "/* Construct the method call message. */\n\
         method_call = dbus_message_new_method_call (proxy->name, proxy->path, \"{}\", \"{}\");\n\
         if (! method_call) {{\n{}}}\n\
         \n\
         dbus_message_iter_init_append (method_call, &iter);\n",
        intf.name,
        method.name,
        crate::func::indent(&bail, 1)
    );

    let register = format!(
        "/* Send the message and set up the reply notification. */\n\
         pending_data = dbus_stub_pending_new (proxy->connection, (DBusStubReplyHandler)handler,\n\
         \t\t\t\t      error_handler, data);\n\
         if (! pending_data) {{\n\
         \tdbus_message_unref (method_call);\n\
         \t{raise}\
         \treturn NULL;\n\
         }}\n\
         \n\
         pending_call = NULL;\n\
         if (! dbus_connection_send_with_reply (proxy->connection, method_call,\n\
         \t\t\t\t       &pending_call, {timeout})) {{\n\
         \tdbus_message_unref (method_call);\n\
         \tdbus_stub_pending_free (pending_data);\n\
         \t{raise}\
         \treturn NULL;\n\
         }}\n\
         \n\
         dbus_message_unref (method_call);\n\
         \n\
         if (! pending_call) {{\n\
         \tdbus_stub_pending_free (pending_data);\n\
         \t{disconnected}\
         \treturn NULL;\n\
         }}\n\
         \n\
         /* A released pending call frees the data and the handler never runs. */\n\
         if (! dbus_pending_call_set_notify (pending_call, (DBusPendingCallNotifyFunction){notify},\n\
         \t\t\t\t    pending_data, (DBusFreeFunction)dbus_stub_pending_free)) {{\n\
         \tdbus_pending_call_cancel (pending_call);\n\
         \tdbus_pending_call_unref (pending_call);\n\
         \tdbus_stub_pending_free (pending_data);\n\
         \t{raise}\
         \treturn NULL;\n\
         }}\n",
        raise = d.raise_no_memory(),
        disconnected = d.raise_error("DBUS_ERROR_DISCONNECTED", "\"Connection is closed\""),
        notify = notify_name,
        timeout = timeout
    );

    let mut caller_blocks = vec![construct];
    caller_blocks.extend(in_blocks);
    caller_blocks.push(register);
    caller_blocks.push("return pending_call;\n".to_owned());

    let mut caller_asserts = entry_asserts(&caller);
    caller_asserts.push_str("assert (handler != NULL);\nassert (error_handler != NULL);\n");
    let caller_body = format!("{}\n{}", caller_asserts, join_blocks(caller_blocks));
    let caller_code = render_function(&caller, &caller_locals, &caller_body);

    // The notify function.
    let mut notify = FuncPrototype::new("void", &notify_name);
    notify
        .arg("DBusPendingCall *", "pending_call")
        .arg("DBusStubPending *", "pending_data");

    let mut notify_locals = vec![
        TypeVar::new("DBusMessage *", "reply"),
        TypeVar::new(d.iter_type(), "iter"),
        TypeVar::new(d.message_type(), "message"),
        TypeVar::new("DBusError", "error"),
    ];

    let cleanup = "dbus_stub_message_free (message);\ndbus_message_unref (reply);\nreturn;\n";
    let type_err = format!(
        "{}pending_data->error_handler (pending_data->data, message);\n{}",
        d.raise_reply_mismatch(),
        cleanup
    );

    let mut out_frags: Vec<Fragment> = Vec::new();
    let mut retry_cond: Option<String> = None;
    let mut handler_args = String::new();
    for (idx, arg) in method.out_args() {
        let aname = arg.symbol(idx);
        let w = Walker::single(&arg.typ)?;
        let arg_camel = format!("{}{}", camel, make_camel(&aname));
        let nt = natural_type(d, &w, &arg_camel)?;
        if retry_cond.is_none() && nt.value.ends_with('*') {
            retry_cond = Some(aname.clone());
        }
        let oom = match &retry_cond {
            Some(cond) => format!("{} = NULL;\ngoto enomem;\n", cond),
            None => cleanup.to_owned(),
        };
        let frag = demarshal(d, &w, "&iter", "message", &aname, &oom, &type_err, &arg_camel)?;
        out.adopt_structs(&frag);
        for var in &frag.vars {
            cb_args.push(TypeVar::new(d.const_form(&var.ty), var.name.clone()));
            handler_args.push_str(&format!(", {}", var.name));
            notify_locals.push(var.clone());
        }
        notify_locals.extend(frag.locals.iter().cloned());
        out_frags.push(frag);
    }

    let mut reply_body = vec![
        "/* Iterate the arguments of the reply. */\ndbus_message_iter_init (reply, &iter);\n"
            .to_owned(),
    ];
    reply_body.extend(out_frags.iter().map(|f| f.code.clone()));
    reply_body.push(d.check_end("&iter", &type_err));
    let reply_block = match retry_cond {
        Some(cond) => oom_retry_loop(&join_blocks(reply_body), &cond),
        None => join_blocks(reply_body),
    };

    let error_branch = format!(
        "/* Handle error replies by translating into a raised error. */\n\
         if (dbus_message_get_type (reply) == DBUS_MESSAGE_TYPE_ERROR) {{\n\
         \tmessage = dbus_stub_message_new (pending_data->connection, reply);\n\
         \tif (! message) {{\n\
         \t\tdbus_message_unref (reply);\n\
         \t\treturn;\n\
         \t}}\n\
         \n\
         \tdbus_error_init (&error);\n\
         \tdbus_set_error_from_message (&error, reply);\n\
         \n\
         \tif (dbus_error_has_name (&error, DBUS_ERROR_NO_MEMORY)) {{\n\
         \t\t{raise}\
         \t}} else {{\n\
         \t\t{remote}\
         \t}}\n\
         \n\
         \tdbus_error_free (&error);\n\
         \n\
         \tpending_data->error_handler (pending_data->data, message);\n\
         \n\
         \tdbus_stub_message_free (message);\n\
         \tdbus_message_unref (reply);\n\
         \treturn;\n\
         }}\n",
        raise = d.raise_no_memory(),
        remote = d.raise_error("error.name", "error.message")
    );

    let notify_blocks = vec![
        "assert (dbus_pending_call_get_completed (pending_call));\n".to_owned(),
        "/* Steal the reply from the pending call. */\n\
         reply = dbus_pending_call_steal_reply (pending_call);\n\
         assert (reply != NULL);\n"
            .to_owned(),
        error_branch,
        "/* Create a message context for the reply. */\n\
         message = dbus_stub_message_new (pending_data->connection, reply);\n\
         if (! message) {\n\
         \tdbus_message_unref (reply);\n\
         \treturn;\n\
         }\n"
            .to_owned(),
        reply_block,
        format!(
            "/* Call the handler function */\n(({})pending_data->handler) (pending_data->data, message{});\n",
            reply_cb, handler_args
        ),
        "dbus_stub_message_free (message);\ndbus_message_unref (reply);\n".to_owned(),
    ];

    let notify_body = format!(
        "assert (pending_call != NULL);\nassert (pending_data != NULL);\n\n{}",
        join_blocks(notify_blocks)
    );
    let notify_code = format!("static {}", render_function(&notify, &notify_locals, &notify_body));

    // The continuation typedef.
    let mut typedef = format!("typedef void (*{}) (", reply_cb);
    for (i, a) in cb_args.iter().enumerate() {
        if i > 0 {
            typedef.push_str(", ");
        }
        typedef.push_str(&a.param());
    }
    typedef.push_str(");\n");
    out.typedefs.push(typedef);

    out.statics.push(notify);
    out.prototypes.push(caller);
    Ok(format!("{}\n{}", notify_code, caller_code))
}

/// Generate the synchronous getter for one property, issuing
/// `org.freedesktop.DBus.Properties.Get`.
pub fn property_proxy_get_sync_function(
    d: &dyn Dialect,
    prefix: &str,
    intf: &Interface,
    prop: &Property,
    timeout: i32,
    out: &mut Collected,
) -> Result<String, SignatureError> {
    let isym = intf.symbol();
    let psym = prop.symbol();
    let name = format!("{}_{}_get_{}_sync", prefix, isym, psym);
    let camel = format!("{}Value", make_camel(&format!("{}_{}_{}", prefix, isym, psym)));

    let mut proto = FuncPrototype::new("int", &name);
    client_attribs(&mut proto, intf, prop.deprecated);
    proto
        .arg("const void *", "parent")
        .arg(d.proxy_type(), "proxy");

    let mut locals = call_locals(d);
    locals.insert(2, TypeVar::new(d.iter_type(), "variter"));
    locals.push(TypeVar::new("const char *", "interface"));
    locals.push(TypeVar::new("const char *", "property"));

    let bail = format!("{}return -1;\n", d.raise_no_memory());
    let append_bail = format!("dbus_message_unref (method_call);\n{}", bail);
    let type_err = format!(
        "dbus_message_unref (reply);\n{}return -1;\n",
        d.raise_reply_mismatch()
    );

    let w = Walker::single(&prop.typ)?;
    let nt = natural_type(d, &w, &camel)?;
    let allocating = nt.value.ends_with('*');
    let oom = if allocating {
        "*value = NULL;\ngoto enomem;\n".to_owned()
    } else {
        format!("dbus_message_unref (reply);\n{}", bail)
    };
    let frag = demarshal(d, &w, "&variter", "parent", "local", &oom, &type_err, &camel)?;
    out.adopt_structs(&frag);
    let mut copies = String::new();
    for var in &frag.vars {
        let param = var.name.replacen("local", "value", 1);
        proto.arg(d.pointer_to(&var.ty), param.clone());
        copies.push_str(&format!("*{} = {};\n", param, var.name));
        locals.push(var.clone());
    }
    locals.extend(frag.locals.iter().cloned());

    let reply_body = join_blocks(vec![frag.code.clone(), copies]);
    let reply_block = if allocating {
        oom_retry_loop(&reply_body, "*value")
    } else {
        reply_body
    };

    let blocks = vec![
        construct_call("org.freedesktop.DBus.Properties", "Get", &bail),
        format!(
            "interface = \"{}\";\n{}",
            intf.name,
            d.append_basic("&iter", TypeCode::String, "interface", &append_bail)
        ),
        format!(
            "property = \"{}\";\n{}",
            prop.name,
            d.append_basic("&iter", TypeCode::String, "property", &append_bail)
        ),
        send_and_wait(d, timeout),
        format!(
            "/* Iterate the arguments of the reply, recursing into the variant */\n\
             dbus_message_iter_init (reply, &iter);\n\
             \n\
             {}\n{}\n{}\n{}",
            d.check_type("&iter", TypeCode::Variant, &type_err),
            d.recurse("&iter", "variter"),
            d.advance("&iter"),
            d.check_end("&iter", &type_err)
        ),
        reply_block,
        "dbus_message_unref (reply);\n".to_owned(),
        "return 0;\n".to_owned(),
    ];

    let body = format!("{}\n{}", entry_asserts(&proto), join_blocks(blocks));
    let code = render_function(&proto, &locals, &body);
    out.prototypes.push(proto);
    Ok(code)
}

/// Generate the synchronous setter for one property, issuing
/// `org.freedesktop.DBus.Properties.Set`.
pub fn property_proxy_set_sync_function(
    d: &dyn Dialect,
    prefix: &str,
    intf: &Interface,
    prop: &Property,
    timeout: i32,
    out: &mut Collected,
) -> Result<String, SignatureError> {
    let isym = intf.symbol();
    let psym = prop.symbol();
    let name = format!("{}_{}_set_{}_sync", prefix, isym, psym);
    let camel = format!("{}Value", make_camel(&format!("{}_{}_{}", prefix, isym, psym)));

    let mut proto = FuncPrototype::new("int", &name);
    client_attribs(&mut proto, intf, prop.deprecated);
    proto.arg(d.proxy_type(), "proxy");

    let mut locals = call_locals(d);
    locals.insert(2, TypeVar::new(d.iter_type(), "variter"));
    locals.push(TypeVar::new("const char *", "interface"));
    locals.push(TypeVar::new("const char *", "property"));

    let bail = format!("{}return -1;\n", d.raise_no_memory());
    let append_bail = format!("dbus_message_unref (method_call);\n{}", bail);
    let variant_oom = format!(
        "{}{}",
        d.close_container_unchecked("&iter", "variter"),
        append_bail
    );
    let type_err = format!(
        "dbus_message_unref (reply);\n{}return -1;\n",
        d.raise_reply_mismatch()
    );

    let w = Walker::single(&prop.typ)?;
    let frag = marshal(d, &w, "&variter", "value", &variant_oom, &camel)?;
    out.adopt_structs(&frag);
    for var in &frag.vars {
        proto.arg(d.const_form(&var.ty), &var.name);
    }
    locals.extend(frag.locals.iter().cloned());

    let blocks = vec![
        construct_call("org.freedesktop.DBus.Properties", "Set", &bail),
        format!(
            "interface = \"{}\";\n{}",
            intf.name,
            d.append_basic("&iter", TypeCode::String, "interface", &append_bail)
        ),
        format!(
            "property = \"{}\";\n{}",
            prop.name,
            d.append_basic("&iter", TypeCode::String, "property", &append_bail)
        ),
        format!(
            "/* Append a variant onto the message to contain the property value. */\n{}",
            d.open_container(
                "&iter",
                TypeCode::Variant,
                Contained::Literal(&prop.typ),
                "variter",
                &append_bail,
            )
        ),
        frag.code,
        format!(
            "/* Finish the variant */\n{}",
            d.close_container("&iter", "variter", &append_bail)
        ),
        send_and_wait(d, timeout),
        format!(
            "/* Check the reply has no arguments. */\n\
             dbus_message_iter_init (reply, &iter);\n\
             \n\
             {}",
            d.check_end("&iter", &type_err)
        ),
        "dbus_message_unref (reply);\n".to_owned(),
        "return 0;\n".to_owned(),
    ];

    let body = format!("{}\n{}", entry_asserts(&proto), join_blocks(blocks));
    let code = render_function(&proto, &locals, &body);
    out.prototypes.push(proto);
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Libdbus;
    use crate::model::{Access, Argument, Direction};

    fn test_interface() -> Interface {
        Interface {
            name: "com.example.Test".into(),
            symbol: None,
            deprecated: false,
            methods: vec![Method {
                name: "Do".into(),
                symbol: None,
                deprecated: false,
                args: vec![
                    Argument {
                        name: Some("p".into()),
                        typ: "(is)".into(),
                        direction: Direction::In,
                        symbol: None,
                    },
                    Argument {
                        name: Some("q".into()),
                        typ: "au".into(),
                        direction: Direction::Out,
                        symbol: None,
                    },
                ],
            }],
            signals: vec![],
            properties: vec![Property {
                name: "Name".into(),
                symbol: None,
                deprecated: false,
                typ: "s".into(),
                access: Access::ReadWrite,
            }],
        }
    }

    #[test]
    fn sync_method_marshals_then_translates_then_demarshals() {
        let intf = test_interface();
        let mut out = Collected::new();
        let code = method_proxy_sync_function(&Libdbus, "my", &intf, &intf.methods[0], -1, &mut out)
            .unwrap();
        assert!(code.contains(
            "dbus_message_new_method_call (proxy->name, proxy->path, \"com.example.Test\", \"Do\")"
        ));
        assert!(code.contains("send_with_reply_and_block (proxy->connection, method_call, -1, &error)"));
        assert!(code.contains("dbus_error_has_name (&error, DBUS_ERROR_NO_MEMORY)"));
        assert!(code.contains("dbus_stub_error_raise (error.name, error.message)"));
        // outputs retry on allocation failure until the slot is set
        assert!(code.contains("__label__ enomem;"));
        assert!(code.contains("} while (! *q);"));
        assert!(code.contains("*q = q_local;"));
        assert!(code.contains("*q_len = q_local_len;"));
    }

    #[test]
    fn sync_method_signature_is_const_in_pointer_out() {
        let intf = test_interface();
        let mut out = Collected::new();
        method_proxy_sync_function(&Libdbus, "my", &intf, &intf.methods[0], -1, &mut out).unwrap();
        let proto = &out.prototypes[0];
        assert_eq!(proto.name, "my_com_example_test_do_sync");
        let tys: Vec<&str> = proto.args.iter().map(|a| a.ty.as_str()).collect();
        assert_eq!(
            tys,
            [
                "const void *",
                "DBusStubProxy *",
                "const MyComExampleTestDoP *",
                "uint32_t **",
                "size_t *",
            ]
        );
        assert_eq!(proto.attribs, vec![Attribute::WarnUnusedResult]);
    }

    #[test]
    fn async_pair_registers_notify_and_casts_the_continuation() {
        let intf = test_interface();
        let mut out = Collected::new();
        let code =
            method_proxy_async_functions(&Libdbus, "my", &intf, &intf.methods[0], -1, &mut out)
                .unwrap();
        assert!(code.contains("dbus_connection_send_with_reply (proxy->connection, method_call,"));
        assert!(code.contains("(DBusPendingCallNotifyFunction)my_com_example_test_do_notify"));
        assert!(code.contains("(DBusFreeFunction)dbus_stub_pending_free"));
        assert!(code.contains("dbus_pending_call_steal_reply (pending_call)"));
        assert!(code.contains("((MyComExampleTestDoReply)pending_data->handler) (pending_data->data, message, q, q_len);"));
        assert_eq!(out.statics[0].name, "my_com_example_test_do_notify");
        assert!(out.typedefs[0].starts_with("typedef void (*MyComExampleTestDoReply) (void *data, DBusStubMessage *message"));
    }

    #[test]
    fn property_get_issues_properties_get_and_checks_the_variant() {
        let intf = test_interface();
        let mut out = Collected::new();
        let code = property_proxy_get_sync_function(
            &Libdbus,
            "my",
            &intf,
            &intf.properties[0],
            -1,
            &mut out,
        )
        .unwrap();
        assert!(code.contains(
            "dbus_message_new_method_call (proxy->name, proxy->path, \"org.freedesktop.DBus.Properties\", \"Get\")"
        ));
        assert!(code.contains("interface = \"com.example.Test\";"));
        assert!(code.contains("property = \"Name\";"));
        assert!(code.contains("!= DBUS_TYPE_VARIANT"));
        assert!(code.contains("} while (! *value);"));
        assert!(code.contains("*value = local;"));
        assert!(code.contains("dbus_stub_strdup (parent, local_dbus)"));
    }

    #[test]
    fn property_set_wraps_the_value_and_expects_an_empty_reply() {
        let intf = test_interface();
        let mut out = Collected::new();
        let code = property_proxy_set_sync_function(
            &Libdbus,
            "my",
            &intf,
            &intf.properties[0],
            -1,
            &mut out,
        )
        .unwrap();
        assert!(code.contains(
            "dbus_message_iter_open_container (&iter, DBUS_TYPE_VARIANT, \"s\", &variter)"
        ));
        assert!(code.contains("/* Check the reply has no arguments. */"));
        assert!(code.contains("!= DBUS_TYPE_INVALID"));
        let proto = &out.prototypes[0];
        assert_eq!(proto.args[1].ty, "const char *");
    }

    #[test]
    fn deprecated_members_decorate_client_stubs() {
        let mut intf = test_interface();
        intf.methods[0].deprecated = true;
        let mut out = Collected::new();
        method_proxy_sync_function(&Libdbus, "my", &intf, &intf.methods[0], -1, &mut out).unwrap();
        method_proxy_async_functions(&Libdbus, "my", &intf, &intf.methods[0], -1, &mut out)
            .unwrap();
        for p in &out.prototypes {
            assert!(p.attribs.contains(&Attribute::WarnUnusedResult));
            assert!(p.attribs.contains(&Attribute::Deprecated));
        }
    }

    #[test]
    fn remote_no_memory_becomes_local_no_memory() {
        let intf = test_interface();
        let mut out = Collected::new();
        let code = property_proxy_get_sync_function(
            &Libdbus,
            "my",
            &intf,
            &intf.properties[0],
            -1,
            &mut out,
        )
        .unwrap();
        let has_name = code.find("dbus_error_has_name (&error, DBUS_ERROR_NO_MEMORY)").unwrap();
        let raise = code.find("dbus_stub_error_raise_no_memory ()").unwrap();
        assert!(raise > has_name || code[..has_name].contains("dbus_stub_error_raise_no_memory"));
    }
}
