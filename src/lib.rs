//! TinyLisp - a small interpreter for a Lisp-like expression language
//!
//! A program is a sequence of S-expressions. The reader turns source text into
//! [`ast::Value`]s, canonicalizing atoms through an [`intern::Interner`], and the
//! evaluator reduces the whole program, in order, against one mutable
//! [`environment::Environment`]:
//!
//! ```lisp
//! (setq x 10)
//! (defun add1 (n) (+ n 1))
//! (print (add1 x) "done")   ; prints: 11 done
//! (if (< x 5) 'small 'large)
//! ```
//!
//! ## Values, not exceptions
//!
//! Failures inside the language are ordinary values: evaluation never returns a
//! `Result`, it returns [`ast::Value::Error`] and lets enclosing forms decide
//! whether to propagate it. A sequence stops at the first error it produces.
//! Only the host boundary (reading a whole program, I/O in the driver) uses the
//! [`Error`] type defined here.
//!
//! ## Scoping
//!
//! Scoping is dynamic. A function body resolves free identifiers against the
//! frames that are live when it is called, and `setq` only ever writes to the
//! innermost frame.
//!
//! ## Modules
//!
//! - `ast`: the value model, printing and equality
//! - `intern`: canonical instances of numbers, strings and identifiers
//! - `reader`: S-expression reader built on `nom`
//! - `environment`: the frame stack
//! - `evaluator`: the evaluator and the [`evaluator::Interpreter`] context
//! - `builtinops`: the builtin registry (`print`, `setq`, `defun`, `if`, ...)

use std::fmt;

/// Default maximum nesting depth accepted by the reader.
/// Evaluation depth is deliberately not limited; it is bounded by the host stack.
pub const MAX_PARSE_DEPTH: usize = 512;

/// Categorizes the different kinds of parsing errors.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum ParseErrorKind {
    /// Invalid or unexpected syntax (bad characters, malformed number literals)
    InvalidSyntax,
    /// Input ended before the form was complete (unterminated string, unclosed parens)
    Incomplete,
    /// Form nesting exceeded the configured maximum depth
    TooDeeplyNested,
    /// Implementation-imposed limit exceeded (integer literal overflow)
    ImplementationLimit,
}

/// A structured error providing detailed information about a parsing failure.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Context snippet from the input showing where the error occurred (max 60 chars)
    pub context: Option<String>,
    /// The problematic character encountered, if identifiable
    pub found: Option<String>,
}

impl ParseError {
    pub fn new(
        kind: ParseErrorKind,
        message: impl Into<String>,
        context: Option<String>,
        found: Option<String>,
    ) -> Self {
        ParseError {
            kind,
            message: message.into(),
            context,
            found,
        }
    }

    /// Create a ParseError with context extracted from input around a byte offset
    pub fn with_context(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
    ) -> Self {
        const MAX_CONTEXT: usize = 60;

        let error_offset = error_offset.min(input.len());
        let found = input[error_offset..]
            .chars()
            .next()
            .map(|c| c.to_string());

        // Character index of the error, then back up a little for context
        let error_char = input[..error_offset].chars().count();
        let context_start = error_char.saturating_sub(20);

        let context_str: String = input
            .chars()
            .skip(context_start)
            .take(MAX_CONTEXT)
            .collect();

        let mut display_context = String::new();
        if context_start > 0 {
            display_context.push_str("[...]");
        }
        display_context.push_str(&context_str);
        if context_start + context_str.chars().count() < input.chars().count() {
            display_context.push_str("[...]");
        }

        let display_context = display_context.replace('\n', "\\n").replace('\r', "");

        Self::new(kind, message, Some(display_context), found)
    }
}

/// Error types at the host boundary of the interpreter
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    ParseError(ParseError),
    /// Reading the program source failed
    Io(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::ParseError(e) => {
                write!(f, "ParseError: {}", e.message)?;
                if let Some(found) = &e.found {
                    write!(f, "\nFound: {found}")?;
                }
                if let Some(context) = &e.context {
                    write!(f, "\nContext: {context}")?;
                }
                Ok(())
            }
            Error::Io(msg) => write!(f, "IoError: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

pub mod ast;
pub mod builtinops;
pub mod environment;
pub mod evaluator;
pub mod intern;
pub mod reader;
