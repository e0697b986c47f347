//! This module defines the value model shared by the reader and the evaluator.
//! The main enum, [`Value`], is the closed set of entity kinds a program is made
//! of: atoms (numbers, strings, identifiers, constants), quoted forms, compounds
//! (S-expressions), user-defined functions, and the `Error`/`Eof` markers.
//!
//! A `Value` is a cheap handle: every payload lives behind an `Rc`, so cloning a
//! value aliases it instead of copying it. Atoms produced through the
//! [`Interner`](crate::intern::Interner) are canonical, which makes
//! [`Value::ptr_eq`] a valid substitute for content comparison on them.

use std::fmt;
use std::rc::Rc;

/// Type alias for number values in interpreter
pub type NumberType = i64;

/// Allowed non-alphanumeric characters in identifiers
pub(crate) const IDENT_SPECIAL_CHARS: &str = "?_-!+*/%><=";

/// Check if a character may appear in an identifier
pub(crate) fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || IDENT_SPECIAL_CHARS.contains(c)
}

/// The three constant singletons. Only `T` is truthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Const {
    T,
    F,
    Nil,
}

impl Const {
    /// Reserved spellings recognized by the reader
    pub(crate) fn from_spelling(name: &str) -> Option<Const> {
        match name {
            "t" | "T" => Some(Const::T),
            "f" | "F" => Some(Const::F),
            "nil" | "NIL" => Some(Const::Nil),
            _ => None,
        }
    }

    pub fn is_truthy(self) -> bool {
        self == Const::T
    }
}

impl fmt::Display for Const {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Const::T => write!(f, "T"),
            Const::F => write!(f, "F"),
            Const::Nil => write!(f, "NIL"),
        }
    }
}

/// A user-defined procedure created by `defun`.
///
/// Functions do not capture an environment; the body is evaluated against the
/// caller's frames. The value graph therefore stays acyclic.
#[derive(Debug)]
pub struct Function {
    pub name: Rc<str>,
    pub params: Vec<Rc<str>>,
    pub body: Value,
}

/// Core value type in interpreter
///
/// To build values by hand in tests, use the helpers [`num`], [`string`],
/// [`ident`] and [`compound`]. Values built this way are *not* interned, so they
/// are content-equal but not identity-equal to reader output.
#[derive(Clone)]
pub enum Value {
    /// Failure marker; errors compare by identity of their reason
    Error(Rc<str>),
    /// No more input
    Eof,
    /// String literals (raw text, no escapes)
    String(Rc<str>),
    /// Numbers (integers only)
    Number(Rc<NumberType>),
    /// Identifiers
    Ident(Rc<str>),
    /// A suspended form; evaluating it yields the inner form unevaluated
    Quote(Rc<Value>),
    /// S-expression lists
    Compound(Rc<Vec<Value>>),
    /// User-defined functions
    Function(Rc<Function>),
    /// `T`, `F` or `NIL`
    Const(Const),
}

impl Value {
    pub fn error(reason: impl Into<Rc<str>>) -> Value {
        Value::Error(reason.into())
    }

    pub fn compound(elements: Vec<Value>) -> Value {
        Value::Compound(Rc::new(elements))
    }

    pub fn quote(inner: Value) -> Value {
        Value::Quote(Rc::new(inner))
    }

    pub fn function(name: Rc<str>, params: Vec<Rc<str>>, body: Value) -> Value {
        Value::Function(Rc::new(Function { name, params, body }))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    pub fn is_eof(&self) -> bool {
        matches!(self, Value::Eof)
    }

    pub fn as_ident(&self) -> Option<&Rc<str>> {
        match self {
            Value::Ident(name) => Some(name),
            _ => None,
        }
    }

    /// Append to a compound. Only used to build the implicit top-level sequence;
    /// other kinds are left untouched.
    pub fn add_value(&mut self, value: Value) {
        if let Value::Compound(elements) = self {
            Rc::make_mut(elements).push(value);
        }
    }

    /// Identity comparison: true when both handles point at the same instance.
    /// Constants and `Eof` have no allocation and compare by kind.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Error(a), Value::Error(b))
            | (Value::String(a), Value::String(b))
            | (Value::Ident(a), Value::Ident(b)) => Rc::ptr_eq(a, b),
            (Value::Number(a), Value::Number(b)) => Rc::ptr_eq(a, b),
            (Value::Quote(a), Value::Quote(b)) => Rc::ptr_eq(a, b),
            (Value::Compound(a), Value::Compound(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Const(a), Value::Const(b)) => a == b,
            (Value::Eof, Value::Eof) => true,
            _ => false,
        }
    }
}

/// Value equality as used by the `eq` builtin.
///
/// Compounds compare element-wise by identity, which coincides with content
/// equality for interned atoms but not for separately built nested compounds.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Error(a), Value::Error(b)) => Rc::ptr_eq(a, b),
            (Value::Eof, Value::Eof) => true,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Ident(a), Value::Ident(b)) => a == b,
            (Value::Quote(a), Value::Quote(b)) => a == b,
            (Value::Compound(a), Value::Compound(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.ptr_eq(y))
            }
            (Value::Function(a), Value::Function(b)) => a.name == b.name,
            (Value::Const(a), Value::Const(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Error(reason) => write!(f, "Error({reason:?})"),
            Value::Eof => write!(f, "Eof"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Ident(name) => write!(f, "Ident({name})"),
            Value::Quote(inner) => write!(f, "Quote({inner:?})"),
            Value::Compound(elements) => {
                write!(f, "Compound(")?;
                for (i, v) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v:?}")?;
                }
                write!(f, ")")
            }
            Value::Function(func) => {
                write!(f, "Function({}, params={:?})", func.name, func.params)
            }
            Value::Const(c) => write!(f, "Const({c})"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Error(reason) => write!(f, "Error: {reason}"),
            Value::Eof => write!(f, "End of file"),
            Value::String(s) => write!(f, "{s}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Ident(name) => write!(f, "{name}"),
            Value::Quote(inner) => write!(f, "{inner}"),
            Value::Compound(elements) => {
                write!(f, "(")?;
                for elem in elements.iter() {
                    write!(f, "{elem} ")?;
                }
                write!(f, ")")
            }
            Value::Function(func) => write!(f, "function {}", func.name),
            Value::Const(c) => write!(f, "{c}"),
        }
    }
}

impl From<NumberType> for Value {
    fn from(n: NumberType) -> Self {
        Value::Number(Rc::new(n))
    }
}

impl From<Const> for Value {
    fn from(c: Const) -> Self {
        Value::Const(c)
    }
}

/// Helper for building an uninterned number
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn num(n: NumberType) -> Value {
    Value::from(n)
}

/// Helper for building an uninterned string
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn string(s: &str) -> Value {
    Value::String(s.into())
}

/// Helper for building an uninterned identifier
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn ident(name: &str) -> Value {
    Value::Ident(name.into())
}

/// Helper for building a compound from anything convertible into a vector
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn compound<V: Into<Vec<Value>>>(elements: V) -> Value {
    Value::compound(elements.into())
}
