//! Server-side stub composers.
//!
//! Each generated stub has the frame `(object, message, iter) -> int`:
//! demarshal the inbound arguments with the message as owner, reject
//! trailing arguments, call the user handler through `object->data`, then
//! build and send any reply. The user-handler prototypes a server must
//! implement are collected separately; they carry `warn_unused_result`
//! but never `deprecated` (a server implements the interface rather than
//! calling it).

use crate::demarshal::demarshal;
use crate::dialect::{Contained, Dialect};
use crate::func::{
    join_blocks, render_function, Attribute, Fragment, FuncPrototype, StructDecl, TypeVar,
};
use crate::marshal::marshal;
use crate::model::{make_camel, Interface, Method, Property, Signal};
use crate::signature::{SignatureError, TypeCode, Walker};

/// The lists a composer appends to while generating one interface.
#[derive(Debug, Default)]
pub struct Collected {
    pub prototypes: Vec<FuncPrototype>,
    pub handlers: Vec<FuncPrototype>,
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

fn entry_asserts(proto: &FuncPrototype) -> String {
    let mut s = String::new();
    for arg in &proto.args {
        if arg.ty.ends_with('*') {
            s.push_str(&format!("assert ({} != NULL);\n", arg.name));
        }
    }
    s
}

/// Generate the dispatch stub for one method.
pub fn method_object_function(
    d: &dyn Dialect,
    prefix: &str,
    intf: &Interface,
    method: &Method,
    out: &mut Collected,
) -> Result<String, SignatureError> {
    let isym = intf.symbol();
    let msym = method.symbol();
    let stub_name = format!("{}_{}_{}_method", prefix, isym, msym);
    let handler_name = format!("{}_{}_{}", prefix, isym, msym);
    let camel = make_camel(&handler_name);

    let mut proto = FuncPrototype::new("int", &stub_name);
    proto
        .arg(d.object_type(), "object")
        .arg(d.message_type(), "message")
        .arg(format!("{} *", d.iter_type()), "iter");

    let mut handler = FuncPrototype::new("int", &handler_name);
    handler.attrib(Attribute::WarnUnusedResult);
    handler.arg("void *", "data").arg(d.message_type(), "message");

    let oom_code = format!("{}return -1;\n", d.raise_no_memory());
    let type_code = format!(
        "{}return -1;\n",
        d.raise_invalid_args(&method.name, "method")
    );

    let mut locals: Vec<TypeVar> = Vec::new();
    let mut blocks: Vec<String> = Vec::new();
    let mut call_args: Vec<String> = Vec::new();

    // Demarshal each input into a local owned by the message.
    for (idx, arg) in method.in_args() {
        let name = arg.symbol(idx);
        let w = Walker::single(&arg.typ)?;
        let frag = demarshal(
            d,
            &w,
            "iter",
            "message",
            &name,
            &oom_code,
            &type_code,
            &format!("{}{}", camel, make_camel(&name)),
        )?;
        out.adopt_structs(&frag);
        for var in &frag.vars {
            handler.arg(d.const_form(&var.ty), &var.name);
            call_args.push(var.name.clone());
            locals.push(var.clone());
        }
        locals.extend(frag.locals.iter().cloned());
        blocks.push(frag.code);
    }

    blocks.push(d.check_end("iter", &type_code));

    // Marshal each output into the reply.
    let mut reply_frags: Vec<Fragment> = Vec::new();
    let reply_oom = "dbus_message_unref (reply);\nreturn -1;\n".to_owned();
    for (idx, arg) in method.out_args() {
        let name = arg.symbol(idx);
        let w = Walker::single(&arg.typ)?;
        let frag = marshal(
            d,
            &w,
            "&reply_iter",
            &name,
            &reply_oom,
            &format!("{}{}", camel, make_camel(&name)),
        )?;
        out.adopt_structs(&frag);
        for var in &frag.vars {
            handler.arg(d.pointer_to(&var.ty), &var.name);
            call_args.push(format!("&{}", var.name));
            locals.push(var.clone());
        }
        reply_frags.push(frag);
    }

    let mut call = format!(
        "/* Call the handler function */\nif ({} (object->data, message",
        handler_name
    );
    for a in &call_args {
        call.push_str(", ");
        call.push_str(a);
    }
    call.push_str(") < 0)\n\treturn -1;\n");
    blocks.push(call);

    blocks.push(
        "/* If the sender doesn't care about a reply, don't bother with one. */\n\
         if (dbus_message_get_no_reply (message->message))\n\treturn 0;\n"
            .to_owned(),
    );
    blocks.push(
        "/* Construct the reply message. */\n\
         reply = dbus_message_new_method_return (message->message);\n\
         if (! reply)\n\treturn -1;\n\
         \n\
         dbus_message_iter_init_append (reply, &reply_iter);\n"
            .to_owned(),
    );
    locals.insert(0, TypeVar::new("DBusMessage *", "reply"));
    locals.insert(1, TypeVar::new(d.iter_type(), "reply_iter"));
    for frag in reply_frags {
        locals.extend(frag.locals.iter().cloned());
        blocks.push(frag.code);
    }
    blocks.push(
        "/* Send the reply, appending it to the outgoing queue. */\n\
         if (! dbus_connection_send (message->connection, reply, NULL)) {\n\
         \tdbus_message_unref (reply);\n\treturn -1;\n}\n\
         \n\
         dbus_message_unref (reply);\n"
            .to_owned(),
    );
    blocks.push("return 0;\n".to_owned());

    let body = format!("{}\n{}", entry_asserts(&proto), join_blocks(blocks));
    let code = render_function(&proto, &locals, &body);
    out.prototypes.push(proto);
    out.handlers.push(handler);
    Ok(code)
}

/// Generate the getter stub for one property: the value is obtained from
/// the user handler and appended wrapped in a variant of the property's
/// signature onto the caller-supplied reply iterator.
pub fn property_object_get_function(
    d: &dyn Dialect,
    prefix: &str,
    intf: &Interface,
    prop: &Property,
    out: &mut Collected,
) -> Result<String, SignatureError> {
    let isym = intf.symbol();
    let psym = prop.symbol();
    let stub_name = format!("{}_{}_{}_get", prefix, isym, psym);
    let handler_name = format!("{}_{}_get_{}", prefix, isym, psym);
    let camel = format!("{}Value", make_camel(&format!("{}_{}_{}", prefix, isym, psym)));

    let mut proto = FuncPrototype::new("int", &stub_name);
    proto
        .arg(d.object_type(), "object")
        .arg(d.message_type(), "message")
        .arg(format!("{} *", d.iter_type()), "iter");

    let mut handler = FuncPrototype::new("int", &handler_name);
    handler.attrib(Attribute::WarnUnusedResult);
    handler.arg("void *", "data").arg(d.message_type(), "message");

    let w = Walker::single(&prop.typ)?;
    let variant_oom = format!(
        "{}return -1;\n",
        d.close_container_unchecked("iter", "variter")
    );
    let frag = marshal(d, &w, "&variter", "value", &variant_oom, &camel)?;
    out.adopt_structs(&frag);

    let mut locals = vec![TypeVar::new(d.iter_type(), "variter")];
    let mut call = format!(
        "/* Call the handler function */\nif ({} (object->data, message",
        handler_name
    );
    for var in &frag.vars {
        handler.arg(d.pointer_to(&var.ty), &var.name);
        call.push_str(&format!(", &{}", var.name));
        locals.push(var.clone());
    }
    call.push_str(") < 0)\n\treturn -1;\n");
    locals.extend(frag.locals.iter().cloned());

    let blocks = vec![
        call,
        format!(
            "/* Append a variant onto the message to contain the property value. */\n{}",
            d.open_container(
                "iter",
                TypeCode::Variant,
                Contained::Literal(&prop.typ),
                "variter",
                "return -1;\n",
            )
        ),
        frag.code,
        format!(
            "/* Finish the variant */\n{}",
            d.close_container("iter", "variter", "return -1;\n")
        ),
        "return 0;\n".to_owned(),
    ];

    let body = format!("{}\n{}", entry_asserts(&proto), join_blocks(blocks));
    let code = render_function(&proto, &locals, &body);
    out.prototypes.push(proto);
    out.handlers.push(handler);
    Ok(code)
}

/// Generate the setter stub for one property: the single argument must be
/// a variant of the property's type; its content is handed to the user
/// handler by value.
pub fn property_object_set_function(
    d: &dyn Dialect,
    prefix: &str,
    intf: &Interface,
    prop: &Property,
    out: &mut Collected,
) -> Result<String, SignatureError> {
    let isym = intf.symbol();
    let psym = prop.symbol();
    let stub_name = format!("{}_{}_{}_set", prefix, isym, psym);
    let handler_name = format!("{}_{}_set_{}", prefix, isym, psym);
    let camel = format!("{}Value", make_camel(&format!("{}_{}_{}", prefix, isym, psym)));

    let mut proto = FuncPrototype::new("int", &stub_name);
    proto
        .arg(d.object_type(), "object")
        .arg(d.message_type(), "message")
        .arg(format!("{} *", d.iter_type()), "iter");

    let mut handler = FuncPrototype::new("int", &handler_name);
    handler.attrib(Attribute::WarnUnusedResult);
    handler.arg("void *", "data").arg(d.message_type(), "message");

    let oom_code = format!("{}return -1;\n", d.raise_no_memory());
    let type_code = format!(
        "{}return -1;\n",
        d.raise_invalid_args(&prop.name, "property")
    );

    let w = Walker::single(&prop.typ)?;
    let frag = demarshal(d, &w, "&variter", "message", "value", &oom_code, &type_code, &camel)?;
    out.adopt_structs(&frag);

    let mut locals = vec![TypeVar::new(d.iter_type(), "variter")];
    let mut call = format!(
        "/* Call the handler function */\nif ({} (object->data, message",
        handler_name
    );
    for var in &frag.vars {
        handler.arg(d.const_form(&var.ty), &var.name);
        call.push_str(&format!(", {}", var.name));
        locals.push(var.clone());
    }
    call.push_str(") < 0)\n\treturn -1;\n");
    locals.extend(frag.locals.iter().cloned());

    let blocks = vec![
        format!(
            "/* Recurse into the variant */\n{}\n{}",
            d.check_type("iter", TypeCode::Variant, &type_code),
            d.recurse("iter", "variter")
        ),
        frag.code,
        d.advance("iter"),
        d.check_end("iter", &type_code),
        call,
        "return 0;\n".to_owned(),
    ];

    let body = format!("{}\n{}", entry_asserts(&proto), join_blocks(blocks));
    let code = render_function(&proto, &locals, &body);
    out.prototypes.push(proto);
    out.handlers.push(handler);
    Ok(code)
}

/// Generate the emission function for one signal: build the signal
/// message, marshal the arguments in declaration order, queue it.
pub fn signal_object_function(
    d: &dyn Dialect,
    prefix: &str,
    intf: &Interface,
    signal: &Signal,
    out: &mut Collected,
) -> Result<String, SignatureError> {
    let isym = intf.symbol();
    let ssym = signal.symbol();
    let stub_name = format!("{}_{}_emit_{}", prefix, isym, ssym);
    let camel = make_camel(&format!("{}_{}_{}", prefix, isym, ssym));

    let mut proto = FuncPrototype::new("int", &stub_name);
    proto.attrib(Attribute::WarnUnusedResult);
    proto
        .arg("DBusConnection *", "connection")
        .arg("const char *", "origin_path");

    let mut locals = vec![
        TypeVar::new("DBusMessage *", "signal"),
        TypeVar::new(d.iter_type(), "iter"),
    ];

    let oom = "dbus_message_unref (signal);\nreturn -1;\n".to_owned();
    let mut arg_blocks = Vec::new();
    for (idx, arg) in signal.args.iter().enumerate() {
        let name = arg.symbol(idx);
        let w = Walker::single(&arg.typ)?;
        let frag = marshal(
            d,
            &w,
            "&iter",
            &name,
            &oom,
            &format!("{}{}", camel, make_camel(&name)),
        )?;
        out.adopt_structs(&frag);
        for var in &frag.vars {
            proto.arg(d.const_form(&var.ty), &var.name);
        }
        locals.extend(frag.locals.iter().cloned());
        arg_blocks.push(frag.code);
    }

    let mut blocks = vec![format!(
        "/* Construct the message. */\n\
         signal = dbus_message_new_signal (origin_path, \"{}\", \"{}\");\n\
         if (! signal)\n\treturn -1;\n\
         \n\
         dbus_message_iter_init_append (signal, &iter);\n",
        intf.name, signal.name
    )];
    blocks.extend(arg_blocks);
    blocks.push(
        "/* Send the signal, appending it to the outgoing queue. */\n\
         if (! dbus_connection_send (connection, signal, NULL)) {\n\
         \tdbus_message_unref (signal);\n\treturn -1;\n}\n\
         \n\
         dbus_message_unref (signal);\n"
            .to_owned(),
    );
    blocks.push("return 0;\n".to_owned());

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
            signals: vec![Signal {
                name: "Changed".into(),
                symbol: None,
                deprecated: false,
                args: vec![Argument {
                    name: Some("count".into()),
                    typ: "u".into(),
                    direction: Direction::Out,
                    symbol: None,
                }],
            }],
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
    fn method_stub_demarshals_then_checks_trailing_then_calls() {
        let intf = test_interface();
        let mut out = Collected::new();
        let code =
            method_object_function(&Libdbus, "my", &intf, &intf.methods[0], &mut out).unwrap();
        let demarshal = code.find("DBUS_TYPE_STRUCT").unwrap();
        let trailing = code.find("!= DBUS_TYPE_INVALID").unwrap();
        let call = code.find("my_com_example_test_do (object->data, message").unwrap();
        assert!(demarshal < call);
        assert!(trailing < call || code[trailing..].contains("my_com_example_test_do"));
        assert!(code.contains("Invalid arguments to Do method"));
        assert!(code.contains("dbus_message_get_no_reply"));
        // outputs are marshalled into the reply
        assert!(code.contains("dbus_message_new_method_return"));
        assert!(code.contains("DBUS_TYPE_ARRAY, \"u\", &q_iter"));
    }

    #[test]
    fn method_handler_takes_inputs_const_and_outputs_by_address() {
        let intf = test_interface();
        let mut out = Collected::new();
        method_object_function(&Libdbus, "my", &intf, &intf.methods[0], &mut out).unwrap();
        let handler = &out.handlers[0];
        assert_eq!(handler.name, "my_com_example_test_do");
        let tys: Vec<&str> = handler.args.iter().map(|a| a.ty.as_str()).collect();
        assert_eq!(
            tys,
            [
                "void *",
                "DBusStubMessage *",
                "const MyComExampleTestDoP *",
                "uint32_t **",
                "size_t *",
            ]
        );
        assert_eq!(handler.attribs, vec![Attribute::WarnUnusedResult]);
    }

    #[test]
    fn property_get_wraps_value_in_a_variant_of_its_signature() {
        let intf = test_interface();
        let mut out = Collected::new();
        let code =
            property_object_get_function(&Libdbus, "my", &intf, &intf.properties[0], &mut out)
                .unwrap();
        assert!(code.contains(
            "dbus_message_iter_open_container (iter, DBUS_TYPE_VARIANT, \"s\", &variter)"
        ));
        let call = code.find("my_com_example_test_get_name (object->data").unwrap();
        let open = code.find("DBUS_TYPE_VARIANT").unwrap();
        assert!(call < open);
        // marshal failure inside the variant closes it before giving up
        assert!(code.contains(
            "\t\tdbus_message_iter_close_container (iter, &variter);\n\t\treturn -1;"
        ));
    }

    #[test]
    fn property_set_rejects_wrong_variant_content_before_the_handler() {
        let intf = test_interface();
        let mut out = Collected::new();
        let code =
            property_object_set_function(&Libdbus, "my", &intf, &intf.properties[0], &mut out)
                .unwrap();
        let check = code.find("!= DBUS_TYPE_STRING").unwrap();
        let call = code.find("my_com_example_test_set_name (object->data").unwrap();
        assert!(check < call);
        assert!(code.contains("Invalid arguments to Name property"));
        // exactly one argument: the trailing check runs before the handler
        let trailing = code.rfind("!= DBUS_TYPE_INVALID").unwrap();
        assert!(trailing < call);
    }

    #[test]
    fn signal_emission_builds_and_sends() {
        let intf = test_interface();
        let mut out = Collected::new();
        let code =
            signal_object_function(&Libdbus, "my", &intf, &intf.signals[0], &mut out).unwrap();
        assert!(code.contains(
            "dbus_message_new_signal (origin_path, \"com.example.Test\", \"Changed\")"
        ));
        assert!(code.contains("DBUS_TYPE_UINT32, &count"));
        assert!(out.handlers.is_empty());
        assert_eq!(out.prototypes[0].name, "my_com_example_test_emit_changed");
    }

    #[test]
    fn server_stubs_never_carry_deprecated() {
        let mut intf = test_interface();
        intf.deprecated = true;
        intf.methods[0].deprecated = true;
        let mut out = Collected::new();
        method_object_function(&Libdbus, "my", &intf, &intf.methods[0], &mut out).unwrap();
        for p in out.prototypes.iter().chain(out.handlers.iter()) {
            assert!(!p.attribs.contains(&Attribute::Deprecated));
        }
    }
}
