use std::fmt;

use thiserror::Error;

use crate::signature::SignatureError;

/// Position of an element within the introspection document.
///
/// Rows and columns are 1-based, matching what compilers and editors print.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: u64,
    pub column: u64,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Why an introspection document was rejected.
#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("<{element}> missing required attribute {attribute:?}")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },
    #[error("{0:?} is not a valid D-Bus member name")]
    InvalidMemberName(String),
    #[error("{0:?} is not a valid D-Bus interface name")]
    InvalidInterfaceName(String),
    #[error("{0:?} is not a valid symbol")]
    InvalidSymbol(String),
    #[error("{0:?} is not a valid argument name")]
    InvalidArgumentName(String),
    #[error("invalid type signature {signature:?}")]
    MalformedSignature {
        signature: String,
        #[source]
        source: SignatureError,
    },
    #[error("invalid access value {0:?}")]
    IllegalAccess(String),
    #[error("invalid direction value {0:?}")]
    IllegalDirection(String),
    #[error("invalid value {0:?} for deprecated annotation")]
    IllegalDeprecated(String),
    #[error("unknown annotation {0:?}")]
    UnknownAnnotation(String),
    #[error("{kind} {second:?} generates symbol {symbol:?}, already used by {kind} {first:?}")]
    DuplicateSymbol {
        kind: &'static str,
        symbol: String,
        first: String,
        second: String,
    },
    #[error("argument name {0:?} appears twice")]
    DuplicateArgument(String),
    #[error("unexpected <{0}> element here")]
    MismatchedElement(String),
    #[error("unexpected end of document")]
    UnexpectedEnd,
    #[error("interface {interface}: {source}")]
    Signature {
        interface: String,
        #[source]
        source: SignatureError,
    },
    #[error(transparent)]
    Xml(#[from] xml::reader::Error),
}

/// An error rejecting an entire introspection document.
///
/// Carries the source position where one is known; a document either
/// generates completely or fails with a single root cause.
#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub file: Option<String>,
    pub position: Option<Position>,
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Error { kind, file: None, position: None }
    }

    pub fn at(kind: ErrorKind, file: Option<&str>, position: Position) -> Self {
        Error {
            kind,
            file: file.map(|f| f.to_owned()),
            position: Some(position),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (&self.file, &self.position) {
            (Some(file), Some(pos)) => write!(f, "{}:{}: {}", file, pos, self.kind),
            (None, Some(pos)) => write!(f, "<input>:{}: {}", pos, self.kind),
            _ => self.kind.fmt(f),
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_render_like_compilers() {
        let e = Error::at(
            ErrorKind::IllegalAccess("sometimes".into()),
            Some("test.xml"),
            Position { line: 4, column: 17 },
        );
        assert_eq!(
            e.to_string(),
            "test.xml:4:17: invalid access value \"sometimes\""
        );
    }

    #[test]
    fn bare_kind_renders_without_position() {
        let e = Error::new(ErrorKind::UnexpectedEnd);
        assert_eq!(e.to_string(), "unexpected end of document");
    }
}
