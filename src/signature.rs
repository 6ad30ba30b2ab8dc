//! A cursor over D-Bus type signatures.
//!
//! The walker yields one complete type at a time: a basic code, a variant,
//! or a container together with a sub-walker positioned at the first
//! contained type. Structural problems (unbalanced nesting, a dict entry
//! outside an array, unknown codes) surface as [`SignatureError`].

use thiserror::Error;

/// The wire limit on nesting of each container class.
const MAX_CONTAINER_DEPTH: u8 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("a complete type is required")]
    Empty,
    #[error("unknown type code {0:?}")]
    UnknownCode(char),
    #[error("container nesting does not balance")]
    Unbalanced,
    #[error("struct with no member types")]
    EmptyStruct,
    #[error("dict entry outside an array")]
    DictEntryOutsideArray,
    #[error("dict entry key must be a basic type")]
    DictEntryKeyNotBasic,
    #[error("dict entry must hold exactly a key and a value")]
    DictEntryArity,
    #[error("containers nested too deeply")]
    TooDeep,
    #[error("trailing characters after complete type")]
    Trailing,
    #[error("signature exceeds 255 bytes")]
    TooLong,
}

/// One D-Bus type code, container openings included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCode {
    Byte,
    Boolean,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Double,
    String,
    ObjectPath,
    Signature,
    UnixFd,
    Array,
    Struct,
    DictEntry,
    Variant,
}

impl TypeCode {
    pub fn from_char(c: char) -> Option<TypeCode> {
        Some(match c {
            'y' => TypeCode::Byte,
            'b' => TypeCode::Boolean,
            'n' => TypeCode::Int16,
            'q' => TypeCode::UInt16,
            'i' => TypeCode::Int32,
            'u' => TypeCode::UInt32,
            'x' => TypeCode::Int64,
            't' => TypeCode::UInt64,
            'd' => TypeCode::Double,
            's' => TypeCode::String,
            'o' => TypeCode::ObjectPath,
            'g' => TypeCode::Signature,
            'h' => TypeCode::UnixFd,
            'a' => TypeCode::Array,
            '(' => TypeCode::Struct,
            '{' => TypeCode::DictEntry,
            'v' => TypeCode::Variant,
            _ => return None,
        })
    }

    pub fn is_basic(self) -> bool {
        !matches!(
            self,
            TypeCode::Array | TypeCode::Struct | TypeCode::DictEntry | TypeCode::Variant
        )
    }

    pub fn is_string_like(self) -> bool {
        matches!(self, TypeCode::String | TypeCode::ObjectPath | TypeCode::Signature)
    }

    /// Basic and of fixed width, i.e. read and written by value.
    pub fn is_fixed(self) -> bool {
        self.is_basic() && !self.is_string_like()
    }
}

fn is_basic_code(b: u8) -> bool {
    b"ybnqiuxtdsogh".contains(&b)
}

/// Length in bytes of the complete type starting at `pos`, validating it
/// structurally along the way.
fn complete_len(
    s: &[u8],
    pos: usize,
    end: usize,
    in_array: bool,
    arrays: u8,
    structs: u8,
) -> Result<usize, SignatureError> {
    if pos >= end {
        return Err(SignatureError::Empty);
    }
    let c = s[pos];
    if is_basic_code(c) || c == b'v' {
        return Ok(1);
    }
    match c {
        b'a' => {
            if arrays >= MAX_CONTAINER_DEPTH {
                return Err(SignatureError::TooDeep);
            }
            Ok(1 + complete_len(s, pos + 1, end, true, arrays + 1, structs)?)
        }
        b'(' => {
            if structs >= MAX_CONTAINER_DEPTH {
                return Err(SignatureError::TooDeep);
            }
            let mut p = pos + 1;
            if p < end && s[p] == b')' {
                return Err(SignatureError::EmptyStruct);
            }
            loop {
                if p >= end {
                    return Err(SignatureError::Unbalanced);
                }
                if s[p] == b')' {
                    return Ok(p + 1 - pos);
                }
                p += complete_len(s, p, end, false, arrays, structs + 1)?;
            }
        }
        b'{' => {
            if !in_array {
                return Err(SignatureError::DictEntryOutsideArray);
            }
            let mut p = pos + 1;
            if p >= end {
                return Err(SignatureError::Unbalanced);
            }
            if s[p] == b'}' {
                return Err(SignatureError::DictEntryArity);
            }
            if !is_basic_code(s[p]) {
                return Err(SignatureError::DictEntryKeyNotBasic);
            }
            p += 1;
            if p < end && s[p] == b'}' {
                return Err(SignatureError::DictEntryArity);
            }
            p += complete_len(s, p, end, false, arrays, structs + 1)?;
            if p >= end {
                Err(SignatureError::Unbalanced)
            } else if s[p] == b'}' {
                Ok(p + 1 - pos)
            } else {
                Err(SignatureError::DictEntryArity)
            }
        }
        b')' | b'}' => Err(SignatureError::Unbalanced),
        _ => Err(SignatureError::UnknownCode(c as char)),
    }
}

/// The type at the walker's cursor. Container tokens carry a sub-walker
/// positioned at the first contained type.
#[derive(Debug, Clone, Copy)]
pub enum Token<'a> {
    Basic(TypeCode),
    Variant,
    Array(Walker<'a>),
    Struct(Walker<'a>),
    DictEntry(Walker<'a>),
}

/// Cursor over zero or more complete types within a signature.
#[derive(Debug, Clone, Copy)]
pub struct Walker<'a> {
    sig: &'a str,
    pos: usize,
    end: usize,
    in_array: bool,
}

impl<'a> Walker<'a> {
    /// A walker over a sequence of zero or more complete types.
    pub fn new(sig: &'a str) -> Walker<'a> {
        Walker { sig, pos: 0, end: sig.len(), in_array: false }
    }

    /// A walker over exactly one complete type, fully validated.
    pub fn single(sig: &'a str) -> Result<Walker<'a>, SignatureError> {
        if sig.len() > 255 {
            return Err(SignatureError::TooLong);
        }
        let len = complete_len(sig.as_bytes(), 0, sig.len(), false, 0, 0)?;
        if len != sig.len() {
            return Err(SignatureError::Trailing);
        }
        Ok(Walker::new(sig))
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.end
    }

    fn len_here(&self) -> Result<usize, SignatureError> {
        complete_len(self.sig.as_bytes(), self.pos, self.end, self.in_array, 0, 0)
    }

    /// The complete type at the cursor as a signature fragment, e.g.
    /// `"a{sv}"` when the cursor sits on such an array.
    pub fn complete_signature(&self) -> Result<&'a str, SignatureError> {
        let len = self.len_here()?;
        Ok(&self.sig[self.pos..self.pos + len])
    }

    /// The type code at the cursor.
    pub fn code(&self) -> Result<TypeCode, SignatureError> {
        if self.at_end() {
            return Err(SignatureError::Empty);
        }
        let c = self.sig.as_bytes()[self.pos] as char;
        TypeCode::from_char(c).ok_or(SignatureError::UnknownCode(c))
    }

    /// The type at the cursor, with a sub-walker for containers.
    pub fn token(&self) -> Result<Token<'a>, SignatureError> {
        let len = self.len_here()?;
        let c = self.sig.as_bytes()[self.pos];
        Ok(match c {
            b'v' => Token::Variant,
            b'a' => Token::Array(Walker {
                sig: self.sig,
                pos: self.pos + 1,
                end: self.pos + len,
                in_array: true,
            }),
            b'(' => Token::Struct(Walker {
                sig: self.sig,
                pos: self.pos + 1,
                end: self.pos + len - 1,
                in_array: false,
            }),
            b'{' => Token::DictEntry(Walker {
                sig: self.sig,
                pos: self.pos + 1,
                end: self.pos + len - 1,
                in_array: false,
            }),
            c => Token::Basic(
                TypeCode::from_char(c as char).ok_or(SignatureError::UnknownCode(c as char))?,
            ),
        })
    }

    /// Step past the complete type at the cursor. Returns whether a
    /// further complete type follows.
    pub fn advance(&mut self) -> Result<bool, SignatureError> {
        self.pos += self.len_here()?;
        Ok(!self.at_end())
    }
}

/// Check that `sig` is a single complete type.
pub fn validate_single(sig: &str) -> Result<(), SignatureError> {
    Walker::single(sig).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_complete_types() {
        assert!(validate_single("").is_err());
        assert!(validate_single("i").is_ok());
        assert!(validate_single("ii").is_err());
        assert!(validate_single("vi").is_err());
        assert!(validate_single("g").is_ok());
        assert!(validate_single("{ss}").is_err());
        assert!(validate_single("ad").is_ok());
        assert!(validate_single("a{ss}").is_ok());
        assert!(validate_single("a{vs}").is_err());
        assert!(validate_single("a{ss}i").is_err());
        assert!(validate_single("a{oa{sv}}").is_ok());
        assert!(validate_single("v").is_ok());
        assert!(validate_single("()").is_err());
        assert!(validate_single("(s)").is_ok());
        assert!(validate_single("(sa{sv}(i))").is_ok());
        assert!(validate_single("(sa{sv}(i)").is_err());
        assert!(validate_single("(dbus)").is_ok());
        assert!(validate_single("a").is_err());
        assert!(validate_single("e").is_err());
    }

    #[test]
    fn specific_errors() {
        assert_eq!(validate_single("{ss}"), Err(SignatureError::DictEntryOutsideArray));
        assert_eq!(validate_single("a{vs}"), Err(SignatureError::DictEntryKeyNotBasic));
        assert_eq!(validate_single("a{s}"), Err(SignatureError::DictEntryArity));
        assert_eq!(validate_single("a{sss}"), Err(SignatureError::DictEntryArity));
        assert_eq!(validate_single("()"), Err(SignatureError::EmptyStruct));
        assert_eq!(validate_single("e"), Err(SignatureError::UnknownCode('e')));
        assert_eq!(validate_single("si"), Err(SignatureError::Trailing));
        let deep: String = "a".repeat(33) + "i";
        assert_eq!(validate_single(&deep), Err(SignatureError::TooDeep));
    }

    #[test]
    fn walks_struct_fields_in_order() {
        let mut w = Walker::single("(ia{sv}s)").unwrap();
        let mut fields = match w.token().unwrap() {
            Token::Struct(f) => f,
            t => panic!("expected struct, got {:?}", t),
        };
        assert!(matches!(fields.token().unwrap(), Token::Basic(TypeCode::Int32)));
        assert!(fields.advance().unwrap());
        assert_eq!(fields.complete_signature().unwrap(), "a{sv}");
        let entry = match fields.token().unwrap() {
            Token::Array(e) => e,
            t => panic!("expected array, got {:?}", t),
        };
        let mut kv = match entry.token().unwrap() {
            Token::DictEntry(kv) => kv,
            t => panic!("expected dict entry, got {:?}", t),
        };
        assert!(matches!(kv.token().unwrap(), Token::Basic(TypeCode::String)));
        assert!(kv.advance().unwrap());
        assert!(matches!(kv.token().unwrap(), Token::Variant));
        assert!(!kv.advance().unwrap());
        assert!(fields.advance().unwrap());
        assert!(matches!(fields.token().unwrap(), Token::Basic(TypeCode::String)));
        assert!(!fields.advance().unwrap());
        assert!(!w.advance().unwrap());
        assert!(w.at_end());
    }

    #[test]
    fn array_subwalker_permits_dict_entry() {
        let w = Walker::single("a{ss}").unwrap();
        let elem = match w.token().unwrap() {
            Token::Array(e) => e,
            t => panic!("expected array, got {:?}", t),
        };
        assert!(matches!(elem.token().unwrap(), Token::DictEntry(_)));
    }
}
