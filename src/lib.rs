//! Generates C glue from D-Bus XML introspection data.
//!
//! Given an interface description, this crate emits the object (server)
//! side and proxy (client) side of each interface on top of libdbus: per
//! method and property, stub functions that demarshal and validate the
//! wire arguments and dispatch to user handlers, and client functions
//! (synchronous and asynchronous) that build the method call, wait for or
//! register for the reply, demarshal the results and translate remote
//! errors. Alongside the source text, every generated function's
//! prototype is returned for writing into a header.
//!
//! The pieces are usable on their own: [`signature::Walker`] cursors over
//! type signatures, [`dialect`] maps types to their target form,
//! [`marshal`] and [`demarshal`] build the codec fragments, and
//! [`object`] / [`proxy`] compose complete stubs.

use std::collections::HashSet;

use log::debug;

pub mod demarshal;
pub mod dialect;
pub mod error;
pub mod func;
pub mod marshal;
pub mod model;
pub mod object;
pub mod parse;
pub mod proxy;
pub mod signature;
pub mod strings;

pub use error::{Error, ErrorKind};

use dialect::{Dialect, Libdbus};
use func::FuncPrototype;
use model::Interface;
use signature::SignatureError;

/// Which side of the interface to generate.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum OutputMode {
    /// Server-side dispatch stubs, property accessors and signal
    /// emission functions.
    Object,
    /// Client-side sync and async calls and property accessors.
    Proxy,
}

/// Code generation options.
#[derive(Clone, Debug)]
pub struct GenOpts {
    /// Which side to generate.
    pub mode: OutputMode,
    /// Prefix for every generated function name.
    pub prefix: String,
    /// Name of the input file, used in diagnostics only.
    pub filename: Option<String>,
    /// Interface filter. Only matching interfaces are generated, if set.
    pub interfaces: Option<HashSet<String>>,
    /// Timeout in milliseconds passed to blocking and pending calls;
    /// -1 means the connection default (no explicit timeout).
    pub timeout_ms: i32,
    /// The command line string, inserted into generated source files.
    pub command_line: String,
}

impl Default for GenOpts {
    fn default() -> Self {
        GenOpts {
            mode: OutputMode::Object,
            prefix: "dbus".into(),
            filename: None,
            interfaces: None,
            timeout_ms: -1,
            command_line: String::new(),
        }
    }
}

/// Everything generated for one interface.
#[derive(Debug)]
pub struct InterfaceOutput {
    /// The D-Bus interface name.
    pub name: String,
    /// The derived identifier.
    pub symbol: String,
    /// The emitted source text: typedefs, file-local prototypes, then
    /// every generated function.
    pub source: String,
    /// Prototypes of the externally visible generated functions.
    pub prototypes: Vec<FuncPrototype>,
    /// Prototypes of the handlers the user must implement (object mode).
    pub handlers: Vec<FuncPrototype>,
    /// Declaration lines a header needs besides the prototypes.
    pub typedefs: Vec<String>,
}

/// The result of generating one document.
#[derive(Debug, Default)]
pub struct Output {
    pub interfaces: Vec<InterfaceOutput>,
    command_line: String,
}

impl Output {
    fn module_header(&self) -> String {
        let mut s = String::from("/* Generated by dbus-stubgen");
        if !self.command_line.is_empty() {
            s.push(' ');
            s.push_str(&self.command_line);
        }
        s.push_str(".\n * Do not edit; regenerate from the interface description instead.\n */\n");
        s
    }

    /// The complete source text for every generated interface.
    pub fn source(&self) -> String {
        let mut s = self.module_header();
        for intf in &self.interfaces {
            s.push('\n');
            s.push_str(&intf.source);
        }
        s
    }

    /// Declarations for a header: typedefs, generated prototypes, and the
    /// handler prototypes a server must implement.
    pub fn header(&self) -> String {
        let mut s = self.module_header();
        for intf in &self.interfaces {
            s.push('\n');
            s.push_str(&format!("/* {} */\n", intf.name));
            for t in &intf.typedefs {
                s.push('\n');
                s.push_str(t);
            }
            if !intf.handlers.is_empty() {
                s.push_str("\n/* Handlers to be implemented */\n");
                for h in &intf.handlers {
                    s.push('\n');
                    s.push_str(&h.declaration());
                }
            }
            for p in &intf.prototypes {
                s.push('\n');
                s.push_str(&p.declaration());
            }
        }
        s
    }
}

/// Generate stubs for every interface in an introspection document.
pub fn generate(xmldata: &str, opts: &GenOpts) -> Result<Output, Error> {
    let node = parse::parse_document(xmldata, opts.filename.as_deref())?;
    let d = Libdbus;
    let mut out = Output {
        interfaces: Vec::new(),
        command_line: opts.command_line.clone(),
    };
    for intf in &node.interfaces {
        if let Some(filter) = &opts.interfaces {
            if !filter.contains(&intf.name) {
                debug!("skipping filtered interface {}", intf.name);
                continue;
            }
        }
        let generated = match opts.mode {
            OutputMode::Object => object_interface(&d, opts, intf),
            OutputMode::Proxy => proxy_interface(&d, opts, intf),
        }
        .map_err(|source| {
            Error::new(ErrorKind::Signature { interface: intf.name.clone(), source })
        })?;
        out.interfaces.push(generated);
    }
    Ok(out)
}

fn interface_banner(intf: &Interface) -> String {
    format!("/*\n * {}\n */\n", intf.name)
}

fn name_constant(prefix: &str, intf: &Interface) -> (String, String) {
    let symbol = format!("{}_{}_interface_name", prefix, intf.symbol());
    (
        format!("const char {}[] = \"{}\";\n", symbol, intf.name),
        format!("extern const char {}[];\n", symbol),
    )
}

fn object_interface(
    d: &dyn Dialect,
    opts: &GenOpts,
    intf: &Interface,
) -> Result<InterfaceOutput, SignatureError> {
    let mut col = object::Collected::new();
    let mut funcs = Vec::new();
    for m in &intf.methods {
        funcs.push(object::method_object_function(d, &opts.prefix, intf, m, &mut col)?);
    }
    for p in &intf.properties {
        if p.access.readable() {
            funcs.push(object::property_object_get_function(d, &opts.prefix, intf, p, &mut col)?);
        }
        if p.access.writable() {
            funcs.push(object::property_object_set_function(d, &opts.prefix, intf, p, &mut col)?);
        }
    }
    for s in &intf.signals {
        funcs.push(object::signal_object_function(d, &opts.prefix, intf, s, &mut col)?);
    }

    let (constant, constant_decl) = name_constant(&opts.prefix, intf);
    let mut source = interface_banner(intf);
    let mut typedefs = Vec::new();
    for s in &col.structs {
        source.push('\n');
        source.push_str(&s.definition());
        typedefs.push(s.definition());
    }
    source.push('\n');
    source.push_str(&constant);
    typedefs.push(constant_decl);
    for f in funcs {
        source.push('\n');
        source.push_str(&f);
    }

    Ok(InterfaceOutput {
        name: intf.name.clone(),
        symbol: intf.symbol(),
        source,
        prototypes: col.prototypes,
        handlers: col.handlers,
        typedefs,
    })
}

fn proxy_interface(
    d: &dyn Dialect,
    opts: &GenOpts,
    intf: &Interface,
) -> Result<InterfaceOutput, SignatureError> {
    let mut col = proxy::Collected::new();
    let mut funcs = Vec::new();
    for m in &intf.methods {
        funcs.push(proxy::method_proxy_async_functions(
            d,
            &opts.prefix,
            intf,
            m,
            opts.timeout_ms,
            &mut col,
        )?);
        funcs.push(proxy::method_proxy_sync_function(
            d,
            &opts.prefix,
            intf,
            m,
            opts.timeout_ms,
            &mut col,
        )?);
    }
    for p in &intf.properties {
        if p.access.readable() {
            funcs.push(proxy::property_proxy_get_sync_function(
                d,
                &opts.prefix,
                intf,
                p,
                opts.timeout_ms,
                &mut col,
            )?);
        }
        if p.access.writable() {
            funcs.push(proxy::property_proxy_set_sync_function(
                d,
                &opts.prefix,
                intf,
                p,
                opts.timeout_ms,
                &mut col,
            )?);
        }
    }

    let (constant, constant_decl) = name_constant(&opts.prefix, intf);
    let mut source = interface_banner(intf);
    let mut typedefs = Vec::new();
    for s in &col.structs {
        source.push('\n');
        source.push_str(&s.definition());
        typedefs.push(s.definition());
    }
    for t in &col.typedefs {
        source.push('\n');
        source.push_str(t);
        typedefs.push(t.clone());
    }
    if !col.statics.is_empty() {
        source.push_str("\n/* Prototypes for static functions */\n");
        for s in &col.statics {
            source.push_str(&s.static_declaration());
        }
    }
    source.push('\n');
    source.push_str(&constant);
    typedefs.push(constant_decl);
    for f in funcs {
        source.push('\n');
        source.push_str(&f);
    }

    Ok(InterfaceOutput {
        name: intf.name.clone(),
        symbol: intf.symbol(),
        source,
        prototypes: col.prototypes,
        handlers: Vec::new(),
        typedefs,
    })
}
