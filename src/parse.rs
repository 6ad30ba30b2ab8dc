//! The XML front-end.
//!
//! A pull loop over the introspection document maintains an explicit
//! stack of tagged frames, one per open element. Recognized elements in
//! the wrong place are warned about and ignored; unrecognized elements
//! are ignored wholesale (an `Ignored` frame swallows the subtree);
//! missing or invalid required attributes abort the document with a
//! position-carrying error. The completed records are validated before
//! they are handed to the code generator.

use std::io;

use log::{debug, warn};
use xml::common::Position as _;
use xml::reader::{EventReader, XmlEvent};

use crate::error::{Error, ErrorKind, Position};
use crate::model::{
    validate_interface_name, validate_member_name, validate_symbol, Access, Argument, Direction,
    Interface, Method, Node, Property, Signal,
};
use crate::signature;
use crate::strings;

/// The annotation that marks a member deprecated.
const DEPRECATED_ANNOTATION: &str = "org.freedesktop.DBus.Deprecated";
/// The generator-specific annotation overriding a derived symbol.
const SYMBOL_ANNOTATION: &str = "rs.dbus.Symbol";

enum Frame {
    Node(Node),
    Interface(Interface),
    Method(Method),
    Signal(Signal),
    Property(Property),
    Arg(Argument),
    Ignored,
}

impl Frame {
    fn kind(&self) -> &'static str {
        match self {
            Frame::Node(_) => "node",
            Frame::Interface(_) => "interface",
            Frame::Method(_) => "method",
            Frame::Signal(_) => "signal",
            Frame::Property(_) => "property",
            Frame::Arg(_) => "arg",
            Frame::Ignored => "ignored",
        }
    }
}

fn find_attr<'a>(attrs: &'a [xml::attribute::OwnedAttribute], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|a| a.name.prefix.is_none() && a.name.local_name == name)
        .map(|a| &*a.value)
}

fn warn_unknown_attrs(
    element: &str,
    attrs: &[xml::attribute::OwnedAttribute],
    known: &[&str],
    pos: Position,
) {
    for a in attrs {
        if a.name.prefix.is_some() {
            continue;
        }
        if !known.contains(&a.name.local_name.as_str()) {
            warn!(
                "{}: ignored unknown <{}> attribute {:?}",
                pos, element, a.name.local_name
            );
        }
    }
}

/// Parse an introspection document into the interface model.
///
/// `filename` is only used to position diagnostics.
pub fn parse_document(xmldata: &str, filename: Option<&str>) -> Result<Node, Error> {
    let mut reader = EventReader::new(io::Cursor::new(xmldata));
    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<Node> = None;

    loop {
        let event = {
            let pos = reader.position();
            reader.next().map_err(|e| {
                Error::at(
                    ErrorKind::Xml(e),
                    filename,
                    Position { line: pos.row + 1, column: pos.column + 1 },
                )
            })?
        };
        let pos = Position {
            line: reader.position().row + 1,
            column: reader.position().column + 1,
        };
        let fail = |kind| Error::at(kind, filename, pos);

        match event {
            XmlEvent::StartElement { name, attributes, .. } => {
                if name.prefix.is_some() || matches!(stack.last(), Some(Frame::Ignored)) {
                    stack.push(Frame::Ignored);
                    continue;
                }
                let frame = start_element(
                    &mut stack,
                    &name.local_name,
                    &attributes,
                    pos,
                )
                .map_err(fail)?;
                stack.push(frame);
            }
            XmlEvent::EndElement { name } => {
                if let Some(frame) = stack.pop() {
                    end_element(&mut stack, frame, &mut root, pos).map_err(fail)?;
                } else {
                    return Err(fail(ErrorKind::MismatchedElement(name.local_name)));
                }
            }
            XmlEvent::EndDocument => break,
            _ => (),
        }
    }

    root.ok_or_else(|| Error::new(ErrorKind::UnexpectedEnd))
}

fn start_element(
    stack: &mut Vec<Frame>,
    element: &str,
    attrs: &[xml::attribute::OwnedAttribute],
    pos: Position,
) -> Result<Frame, ErrorKind> {
    let top = stack.last_mut();
    match (element, top) {
        ("node", None) => {
            warn_unknown_attrs("node", attrs, &["name"], pos);
            Ok(Frame::Node(Node::default()))
        }
        ("interface", Some(Frame::Node(_))) => {
            warn_unknown_attrs("interface", attrs, &["name"], pos);
            let name = find_attr(attrs, "name").ok_or(ErrorKind::MissingAttribute {
                element: "interface",
                attribute: "name",
            })?;
            validate_interface_name(name)?;
            Ok(Frame::Interface(Interface {
                name: name.to_owned(),
                symbol: None,
                deprecated: false,
                methods: Vec::new(),
                signals: Vec::new(),
                properties: Vec::new(),
            }))
        }
        ("method", Some(Frame::Interface(_))) => {
            warn_unknown_attrs("method", attrs, &["name"], pos);
            let name = find_attr(attrs, "name").ok_or(ErrorKind::MissingAttribute {
                element: "method",
                attribute: "name",
            })?;
            validate_member_name(name)?;
            Ok(Frame::Method(Method {
                name: name.to_owned(),
                symbol: None,
                deprecated: false,
                args: Vec::new(),
            }))
        }
        ("signal", Some(Frame::Interface(_))) => {
            warn_unknown_attrs("signal", attrs, &["name"], pos);
            let name = find_attr(attrs, "name").ok_or(ErrorKind::MissingAttribute {
                element: "signal",
                attribute: "name",
            })?;
            validate_member_name(name)?;
            Ok(Frame::Signal(Signal {
                name: name.to_owned(),
                symbol: None,
                deprecated: false,
                args: Vec::new(),
            }))
        }
        ("property", Some(Frame::Interface(_))) => {
            warn_unknown_attrs("property", attrs, &["name", "type", "access"], pos);
            let name = find_attr(attrs, "name").ok_or(ErrorKind::MissingAttribute {
                element: "property",
                attribute: "name",
            })?;
            validate_member_name(name)?;
            let typ = find_attr(attrs, "type").ok_or(ErrorKind::MissingAttribute {
                element: "property",
                attribute: "type",
            })?;
            signature::validate_single(typ).map_err(|source| ErrorKind::MalformedSignature {
                signature: typ.to_owned(),
                source,
            })?;
            let access = find_attr(attrs, "access").ok_or(ErrorKind::MissingAttribute {
                element: "property",
                attribute: "access",
            })?;
            let access = match access {
                "read" => Access::Read,
                "write" => Access::Write,
                "readwrite" => Access::ReadWrite,
                other => return Err(ErrorKind::IllegalAccess(other.to_owned())),
            };
            Ok(Frame::Property(Property {
                name: name.to_owned(),
                symbol: None,
                deprecated: false,
                typ: typ.to_owned(),
                access,
            }))
        }
        ("arg", Some(frame @ (Frame::Method(_) | Frame::Signal(_)))) => {
            warn_unknown_attrs("arg", attrs, &["name", "type", "direction"], pos);
            let typ = find_attr(attrs, "type").ok_or(ErrorKind::MissingAttribute {
                element: "arg",
                attribute: "type",
            })?;
            signature::validate_single(typ).map_err(|source| ErrorKind::MalformedSignature {
                signature: typ.to_owned(),
                source,
            })?;
            let name = find_attr(attrs, "name");
            if let Some(name) = name {
                strings::is_valid_member_name(name)
                    .map_err(|_| ErrorKind::InvalidArgumentName(name.to_owned()))?;
            }
            let direction = find_attr(attrs, "direction");
            let direction = match frame {
                Frame::Signal(_) => match direction {
                    None | Some("out") => Direction::Out,
                    Some(other) => return Err(ErrorKind::IllegalDirection(other.to_owned())),
                },
                _ => match direction {
                    None | Some("in") => Direction::In,
                    Some("out") => Direction::Out,
                    Some(other) => return Err(ErrorKind::IllegalDirection(other.to_owned())),
                },
            };
            if let Some(name) = name {
                let existing: &[Argument] = match frame {
                    Frame::Method(m) => &m.args,
                    Frame::Signal(s) => &s.args,
                    _ => &[],
                };
                if existing.iter().any(|a| a.name.as_deref() == Some(name)) {
                    return Err(ErrorKind::DuplicateArgument(name.to_owned()));
                }
            }
            Ok(Frame::Arg(Argument {
                name: name.map(|n| n.to_owned()),
                typ: typ.to_owned(),
                direction,
                symbol: None,
            }))
        }
        ("annotation", Some(top)) => {
            warn_unknown_attrs("annotation", attrs, &["name", "value"], pos);
            let name = find_attr(attrs, "name").ok_or(ErrorKind::MissingAttribute {
                element: "annotation",
                attribute: "name",
            })?;
            let value = find_attr(attrs, "value").ok_or(ErrorKind::MissingAttribute {
                element: "annotation",
                attribute: "value",
            })?;
            annotation(top, name, value, pos)?;
            Ok(Frame::Ignored)
        }
        ("node" | "interface" | "method" | "signal" | "property" | "arg" | "annotation", _) => {
            warn!("{}: ignored misplaced <{}> element", pos, element);
            Ok(Frame::Ignored)
        }
        (other, _) => {
            debug!("{}: ignored unrecognized <{}> element", pos, other);
            Ok(Frame::Ignored)
        }
    }
}

fn annotation(top: &mut Frame, name: &str, value: &str, pos: Position) -> Result<(), ErrorKind> {
    match name {
        DEPRECATED_ANNOTATION => {
            let flag = match value {
                "true" => true,
                "false" => false,
                other => return Err(ErrorKind::IllegalDeprecated(other.to_owned())),
            };
            match top {
                Frame::Interface(i) => i.deprecated = flag,
                Frame::Method(m) => m.deprecated = flag,
                Frame::Signal(s) => s.deprecated = flag,
                Frame::Property(p) => p.deprecated = flag,
                other => warn!(
                    "{}: ignored deprecated annotation on {}",
                    pos,
                    other.kind()
                ),
            }
            Ok(())
        }
        SYMBOL_ANNOTATION => {
            validate_symbol(value)?;
            match top {
                Frame::Interface(i) => i.symbol = Some(value.to_owned()),
                Frame::Method(m) => m.symbol = Some(value.to_owned()),
                Frame::Signal(s) => s.symbol = Some(value.to_owned()),
                Frame::Property(p) => p.symbol = Some(value.to_owned()),
                Frame::Arg(a) => a.symbol = Some(value.to_owned()),
                other => warn!("{}: ignored symbol annotation on {}", pos, other.kind()),
            }
            Ok(())
        }
        other => Err(ErrorKind::UnknownAnnotation(other.to_owned())),
    }
}

fn end_element(
    stack: &mut Vec<Frame>,
    frame: Frame,
    root: &mut Option<Node>,
    _pos: Position,
) -> Result<(), ErrorKind> {
    match (frame, stack.last_mut()) {
        (Frame::Ignored, _) => Ok(()),
        (Frame::Node(node), None) => {
            *root = Some(node);
            Ok(())
        }
        (Frame::Interface(intf), Some(Frame::Node(node))) => {
            intf.validate()?;
            debug!("parsed interface {}", intf.name);
            node.interfaces.push(intf);
            Ok(())
        }
        (Frame::Method(m), Some(Frame::Interface(intf))) => {
            intf.methods.push(m);
            Ok(())
        }
        (Frame::Signal(s), Some(Frame::Interface(intf))) => {
            intf.signals.push(s);
            Ok(())
        }
        (Frame::Property(p), Some(Frame::Interface(intf))) => {
            intf.properties.push(p);
            Ok(())
        }
        (Frame::Arg(a), Some(Frame::Method(m))) => {
            m.args.push(a);
            Ok(())
        }
        (Frame::Arg(a), Some(Frame::Signal(s))) => {
            s.args.push(a);
            Ok(())
        }
        (frame, _) => Err(ErrorKind::MismatchedElement(frame.kind().to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(xml: &str) -> Result<Node, Error> {
        parse_document(xml, Some("test.xml"))
    }

    #[test]
    fn parses_a_small_document() {
        let node = parse(
            r#"<node>
  <interface name="com.example.Test">
    <method name="Do">
      <arg name="p" type="(is)" direction="in"/>
      <arg name="q" type="au" direction="out"/>
    </method>
    <signal name="Changed">
      <arg name="count" type="u"/>
    </signal>
    <property name="Name" type="s" access="readwrite"/>
  </interface>
</node>"#,
        )
        .unwrap();
        assert_eq!(node.interfaces.len(), 1);
        let intf = &node.interfaces[0];
        assert_eq!(intf.name, "com.example.Test");
        assert_eq!(intf.methods.len(), 1);
        assert_eq!(intf.methods[0].args.len(), 2);
        assert_eq!(intf.methods[0].args[1].direction, Direction::Out);
        assert_eq!(intf.signals[0].args[0].direction, Direction::Out);
        assert_eq!(intf.properties[0].access, Access::ReadWrite);
    }

    #[test]
    fn missing_interface_name_is_a_hard_error() {
        let err = parse("<node><interface/></node>").unwrap_err();
        assert!(matches!(
            err.kind,
            ErrorKind::MissingAttribute { element: "interface", attribute: "name" }
        ));
        assert!(err.position.is_some());
        assert_eq!(err.file.as_deref(), Some("test.xml"));
    }

    #[test]
    fn two_complete_types_is_a_malformed_property() {
        let err = parse(
            r#"<node><interface name="com.example.Test">
                 <property name="Blob" type="si" access="readwrite"/>
               </interface></node>"#,
        )
        .unwrap_err();
        match err.kind {
            ErrorKind::MalformedSignature { signature, .. } => assert_eq!(signature, "si"),
            other => panic!("expected MalformedSignature, got {:?}", other),
        }
    }

    #[test]
    fn illegal_access_value() {
        let err = parse(
            r#"<node><interface name="com.example.Test">
                 <property name="Name" type="s" access="sometimes"/>
               </interface></node>"#,
        )
        .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::IllegalAccess(v) if v == "sometimes"));
    }

    #[test]
    fn signal_arguments_may_not_be_inputs() {
        let err = parse(
            r#"<node><interface name="com.example.Test">
                 <signal name="Changed"><arg name="x" type="u" direction="in"/></signal>
               </interface></node>"#,
        )
        .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::IllegalDirection(v) if v == "in"));
    }

    #[test]
    fn duplicate_argument_names_are_rejected() {
        let err = parse(
            r#"<node><interface name="com.example.Test">
                 <method name="Do">
                   <arg name="x" type="u" direction="in"/>
                   <arg name="x" type="s" direction="in"/>
                 </method>
               </interface></node>"#,
        )
        .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::DuplicateArgument(v) if v == "x"));
    }

    #[test]
    fn deprecated_annotation_sets_the_flag() {
        let node = parse(
            r#"<node><interface name="com.example.Test">
                 <method name="Old">
                   <annotation name="org.freedesktop.DBus.Deprecated" value="true"/>
                 </method>
               </interface></node>"#,
        )
        .unwrap();
        assert!(node.interfaces[0].methods[0].deprecated);
    }

    #[test]
    fn illegal_deprecated_value_is_rejected() {
        let err = parse(
            r#"<node><interface name="com.example.Test">
                 <method name="Old">
                   <annotation name="org.freedesktop.DBus.Deprecated" value="maybe"/>
                 </method>
               </interface></node>"#,
        )
        .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::IllegalDeprecated(v) if v == "maybe"));
    }

    #[test]
    fn symbol_annotation_overrides_the_derived_symbol() {
        let node = parse(
            r#"<node><interface name="com.example.Test">
                 <method name="Do">
                   <annotation name="rs.dbus.Symbol" value="frobnicate"/>
                 </method>
               </interface></node>"#,
        )
        .unwrap();
        assert_eq!(node.interfaces[0].methods[0].symbol(), "frobnicate");
    }

    #[test]
    fn invalid_symbol_annotation_is_rejected() {
        let err = parse(
            r#"<node><interface name="com.example.Test">
                 <method name="Do">
                   <annotation name="rs.dbus.Symbol" value="not valid"/>
                 </method>
               </interface></node>"#,
        )
        .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::InvalidSymbol(v) if v == "not valid"));
    }

    #[test]
    fn unknown_annotation_is_a_hard_error() {
        let err = parse(
            r#"<node><interface name="com.example.Test">
                 <method name="Do">
                   <annotation name="org.example.Whatever" value="1"/>
                 </method>
               </interface></node>"#,
        )
        .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::UnknownAnnotation(v) if v == "org.example.Whatever"));
    }

    #[test]
    fn duplicate_derived_symbols_are_rejected_naming_both() {
        let err = parse(
            r#"<node><interface name="com.example.Test">
                 <method name="TestFoo"/>
                 <method name="test_foo"/>
               </interface></node>"#,
        )
        .unwrap_err();
        match err.kind {
            ErrorKind::DuplicateSymbol { symbol, first, second, .. } => {
                assert_eq!(symbol, "test_foo");
                assert_eq!(first, "TestFoo");
                assert_eq!(second, "test_foo");
            }
            other => panic!("expected DuplicateSymbol, got {:?}", other),
        }
    }

    #[test]
    fn misplaced_recognized_elements_are_ignored() {
        let node = parse(
            r#"<node>
                 <property name="Nope" type="s" access="read"/>
                 <interface name="com.example.Test"/>
               </node>"#,
        )
        .unwrap();
        assert_eq!(node.interfaces.len(), 1);
        assert!(node.interfaces[0].properties.is_empty());
    }

    #[test]
    fn unrecognized_subtrees_are_swallowed_whole() {
        let node = parse(
            r#"<node>
                 <interface name="com.example.Test">
                   <doc><method name="NotReal"/></doc>
                   <method name="Real"/>
                 </interface>
               </node>"#,
        )
        .unwrap();
        assert_eq!(node.interfaces[0].methods.len(), 1);
        assert_eq!(node.interfaces[0].methods[0].name, "Real");
    }

    #[test]
    fn anonymous_args_are_accepted() {
        let node = parse(
            r#"<node><interface name="com.example.Test">
                 <method name="Do"><arg type="s" direction="in"/></method>
               </interface></node>"#,
        )
        .unwrap();
        assert_eq!(node.interfaces[0].methods[0].args[0].name, None);
    }

    #[test]
    fn nested_child_nodes_are_ignored() {
        let node = parse(
            r#"<node>
                 <node name="child"><interface name="com.example.Child"/></node>
                 <interface name="com.example.Test"/>
               </node>"#,
        )
        .unwrap();
        assert_eq!(node.interfaces.len(), 1);
        assert_eq!(node.interfaces[0].name, "com.example.Test");
    }
}
