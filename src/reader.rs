use log::trace;
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{take_till, take_while, take_while1},
    character::complete::{char, digit1, not_line_ending, satisfy},
    combinator::{cut, eof, map, not, peek, recognize, value},
    error::ErrorKind,
    multi::{many0, many0_count},
    sequence::{preceded, terminated},
};

use crate::ast::{Const, NumberType, Value, is_ident_char};
use crate::intern::Interner;
use crate::{Error, MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

/// Reader options
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParseConfig {
    /// Treat `;` up to the end of the line as whitespace
    pub handle_comments: bool,
    /// Maximum nesting of compounds and quotes
    pub max_depth: usize,
}

impl Default for ParseConfig {
    fn default() -> Self {
        ParseConfig {
            handle_comments: false,
            max_depth: MAX_PARSE_DEPTH,
        }
    }
}

/// Reader failure: where it happened, its category and the reason handed to the program
#[derive(Debug, Clone, PartialEq)]
struct ReadError<'a> {
    input: &'a str,
    kind: ParseErrorKind,
    reason: &'static str,
}

impl<'a> ReadError<'a> {
    fn new(input: &'a str, kind: ParseErrorKind, reason: &'static str) -> Self {
        ReadError {
            input,
            kind,
            reason,
        }
    }
}

impl<'a> nom::error::ParseError<&'a str> for ReadError<'a> {
    fn from_error_kind(input: &'a str, _kind: ErrorKind) -> Self {
        ReadError::new(input, ParseErrorKind::InvalidSyntax, "unexpected character")
    }

    fn append(_input: &'a str, _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

type ReadResult<'a, O> = IResult<&'a str, O, ReadError<'a>>;

fn fatal<'a, O>(input: &'a str, kind: ParseErrorKind, reason: &'static str) -> ReadResult<'a, O> {
    Err(nom::Err::Failure(ReadError::new(input, kind, reason)))
}

/// Turn any failure of `parser` into a fatal error with the given reason,
/// keeping the position where the inner parser stopped.
fn or_fail<'a, O, P>(
    kind: ParseErrorKind,
    reason: &'static str,
    mut parser: P,
) -> impl FnMut(&'a str) -> ReadResult<'a, O>
where
    P: Parser<&'a str, Output = O, Error = ReadError<'a>>,
{
    move |input| {
        parser.parse(input).map_err(|err| match err {
            nom::Err::Error(e) | nom::Err::Failure(e) => {
                nom::Err::Failure(ReadError::new(e.input, kind, reason))
            }
            nom::Err::Incomplete(needed) => nom::Err::Incomplete(needed),
        })
    }
}

/// Separators between forms: the ASCII whitespace set of C `isspace`
fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r' | '\x0b' | '\x0c')
}

fn comment(input: &str) -> ReadResult<'_, &str> {
    recognize(preceded(char(';'), not_line_ending)).parse(input)
}

/// Skip whitespace, and comments when enabled
fn trivia(input: &str, handle_comments: bool) -> ReadResult<'_, ()> {
    if handle_comments {
        value((), many0_count(alt((take_while1(is_space), comment)))).parse(input)
    } else {
        value((), take_while(is_space)).parse(input)
    }
}

/// What may directly follow a number literal, without consuming it
fn number_end(input: &str, handle_comments: bool) -> ReadResult<'_, ()> {
    let terminator = |c: char| is_space(c) || c == ')' || (handle_comments && c == ';');
    peek(alt((value((), eof), value((), satisfy(terminator))))).parse(input)
}

/// Accumulate a base-10 magnitude, rejecting values that do not fit
fn number_value(digits: &str) -> Option<NumberType> {
    digits.bytes().try_fold(0 as NumberType, |acc, d| {
        acc.checked_mul(10)?
            .checked_add(NumberType::from(d - b'0'))
    })
}

fn parse_number(input: &str, handle_comments: bool) -> ReadResult<'_, NumberType> {
    let (rest, digits) = terminated(
        digit1,
        or_fail(
            ParseErrorKind::InvalidSyntax,
            "unexpected character after number literal",
            |i| number_end(i, handle_comments),
        ),
    )
    .parse(input)?;

    match number_value(digits) {
        Some(n) => Ok((rest, n)),
        None => fatal(
            input,
            ParseErrorKind::ImplementationLimit,
            "number literal out of range",
        ),
    }
}

/// Raw string literal: no escape sequences
fn parse_string(input: &str) -> ReadResult<'_, &str> {
    preceded(
        char('"'),
        or_fail(
            ParseErrorKind::Incomplete,
            "unclosed string literal",
            terminated(take_till(|c: char| c == '"'), char('"')),
        ),
    )
    .parse(input)
}

/// The token a form starts with
#[derive(Debug, Clone, Copy, PartialEq)]
enum Opening<'a> {
    Compound,
    Quote,
    Str(&'a str),
    Number(NumberType),
    Ident(&'a str),
}

fn parse_opening(input: &str, handle_comments: bool) -> ReadResult<'_, Opening<'_>> {
    cut(alt((
        value(Opening::Compound, char('(')),
        value(Opening::Quote, char('\'')),
        map(parse_string, Opening::Str),
        map(|i| parse_number(i, handle_comments), Opening::Number),
        map(take_while1(is_ident_char), Opening::Ident),
    )))
    .parse(input)
}

/// Parse one form. `None` means only trivia was left.
fn parse_form<'a>(
    input: &'a str,
    interner: &mut Interner,
    config: ParseConfig,
    depth: usize,
) -> ReadResult<'a, Option<Value>> {
    let (input, ()) = trivia(input, config.handle_comments)?;
    if input.is_empty() {
        return Ok((input, None));
    }

    let (rest, opening) = parse_opening(input, config.handle_comments)?;
    let form = match opening {
        Opening::Compound | Opening::Quote if depth >= config.max_depth => {
            return fatal(
                input,
                ParseErrorKind::TooDeeplyNested,
                "compound literal nested too deeply",
            );
        }
        Opening::Compound => return parse_compound(rest, interner, config, depth + 1),
        Opening::Quote => match parse_form(rest, interner, config, depth + 1)? {
            (rest, Some(inner)) => return Ok((rest, Some(Value::quote(inner)))),
            (rest, None) => {
                return fatal(
                    rest,
                    ParseErrorKind::Incomplete,
                    "unexpected end of input after quote",
                );
            }
        },
        Opening::Str(text) => interner.get_string(text),
        Opening::Number(n) => interner.get_number(n),
        Opening::Ident(name) => match Const::from_spelling(name) {
            Some(kind) => interner.get_const(kind),
            None => interner.get_ident(name),
        },
    };
    Ok((rest, Some(form)))
}

/// A compound element. Fails recoverably at `)` or end of input.
fn parse_element<'a>(
    input: &'a str,
    interner: &mut Interner,
    config: ParseConfig,
    depth: usize,
) -> ReadResult<'a, Value> {
    let (input, ()) = trivia(input, config.handle_comments)?;
    let (input, ()) = not(char(')')).parse(input)?;
    match parse_form(input, interner, config, depth)? {
        (rest, Some(element)) => Ok((rest, element)),
        (rest, None) => Err(nom::Err::Error(ReadError::new(
            rest,
            ParseErrorKind::Incomplete,
            "unclosed compound literal",
        ))),
    }
}

/// Elements up to the closing paren; the opening one is already consumed
fn parse_compound<'a>(
    input: &'a str,
    interner: &mut Interner,
    config: ParseConfig,
    depth: usize,
) -> ReadResult<'a, Option<Value>> {
    let (input, elements) =
        many0(|i| parse_element(i, interner, config, depth)).parse(input)?;
    let (input, _) = preceded(
        |i| trivia(i, config.handle_comments),
        or_fail(
            ParseErrorKind::Incomplete,
            "unclosed compound literal",
            char(')'),
        ),
    )
    .parse(input)?;
    Ok((input, Some(Value::compound(elements))))
}

/// Reads one top-level form per call from a source string.
///
/// Errors are returned as [`Value::Error`]; the cursor is left at the point of
/// failure so [`Reader::offset`] and [`Reader::error_kind`] can describe it.
pub struct Reader<'a> {
    source: &'a str,
    rest: &'a str,
    config: ParseConfig,
    error_kind: Option<ParseErrorKind>,
}

impl<'a> Reader<'a> {
    pub fn new(source: &'a str) -> Self {
        Self::with_config(source, ParseConfig::default())
    }

    pub fn with_config(source: &'a str, config: ParseConfig) -> Self {
        Reader {
            source,
            rest: source,
            config,
            error_kind: None,
        }
    }

    /// Byte offset of the cursor into the source
    pub fn offset(&self) -> usize {
        self.source.len() - self.rest.len()
    }

    /// Category of the failure behind the last `Error` returned by [`Reader::read`]
    pub fn error_kind(&self) -> Option<ParseErrorKind> {
        self.error_kind
    }

    /// Read the next form, or `Eof` when the input is exhausted.
    pub fn read(&mut self, interner: &mut Interner) -> Value {
        let value = match parse_form(self.rest, interner, self.config, 0) {
            Ok((rest, form)) => {
                self.rest = rest;
                self.error_kind = None;
                form.unwrap_or(Value::Eof)
            }
            Err(nom::Err::Error(err) | nom::Err::Failure(err)) => {
                self.rest = err.input;
                self.error_kind = Some(err.kind);
                Value::error(err.reason)
            }
            Err(nom::Err::Incomplete(_)) => {
                self.rest = &self.rest[self.rest.len()..];
                self.error_kind = Some(ParseErrorKind::Incomplete);
                Value::error("unexpected end of input")
            }
        };
        trace!("read {value:?} (offset {})", self.offset());
        value
    }
}

/// Read every form of a program.
///
/// The first reader error aborts the whole read and is reported as
/// [`Error::ParseError`] with a context snippet; nothing is evaluated on failure.
pub fn read_program(
    source: &str,
    interner: &mut Interner,
    config: ParseConfig,
) -> Result<Vec<Value>, Error> {
    let mut reader = Reader::with_config(source, config);
    let mut forms = Vec::new();
    loop {
        match reader.read(interner) {
            Value::Eof => return Ok(forms),
            Value::Error(reason) => {
                let kind = reader.error_kind().unwrap_or(ParseErrorKind::InvalidSyntax);
                return Err(Error::ParseError(ParseError::with_context(
                    kind,
                    reason.as_ref(),
                    source,
                    reader.offset(),
                )));
            }
            form => forms.push(form),
        }
    }
}
