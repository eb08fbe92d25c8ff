//! Text → syntax trees.
//!
//! A nom-combinator reader for the concrete surface syntax: decimal
//! integers, `n/d` rationals, `#t`/`#f`, double-quoted strings with the
//! usual escapes, symbols, parenthesized lists, and the `'x` quote
//! shorthand (which reads as `(quote x)`).
//!
//! The entry point [`read_syntax`] pulls one form off the front of a
//! buffer and tells the caller how many bytes it consumed, so the REPL
//! can hold several forms per line or grow the buffer line by line. An
//! unterminated list, string, or dangling quote reports
//! [`ReadResult::Incomplete`] rather than an error, which is the signal
//! to keep reading input.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, multispace0},
    combinator::{opt, recognize, value},
    error::ErrorKind,
    multi::many0,
    sequence::{pair, preceded, terminated},
};

use crate::RuntimeError;
use crate::syntax::Syntax;

/// Allowed non-alphanumeric characters in symbol names. `.` is included
/// so that the dotted-pair marker and the `...` rest-parameter marker
/// read as ordinary symbols.
const SYMBOL_SPECIAL_CHARS: &str = "+-*/<>=!?_.";

/// Check if a string is a valid symbol name.
/// Valid: non-empty, no leading digit, no "-digit" prefix (those shapes
/// belong to number literals), alphanumeric + SYMBOL_SPECIAL_CHARS.
fn is_valid_symbol(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        None => false,
        Some(first_char) => {
            if first_char.is_ascii_digit() {
                return false;
            }

            if first_char == '-'
                && let Some(second_char) = chars.next()
                && second_char.is_ascii_digit()
            {
                return false;
            }

            name.chars()
                .all(|c| c.is_alphanumeric() || SYMBOL_SPECIAL_CHARS.contains(c))
        }
    }
}

/// Result of pulling one form off the front of a buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadResult {
    /// One complete form plus the byte count consumed from the buffer.
    Form(Syntax, usize),
    /// Nothing but whitespace remained.
    Empty,
    /// The buffer ends inside a form; more input may complete it.
    Incomplete,
    /// The buffer cannot begin a well-formed form.
    Malformed(String),
}

/// Read the first form of `input`.
pub fn read_syntax(input: &str) -> ReadResult {
    if input.trim().is_empty() {
        return ReadResult::Empty;
    }
    match parse_form(input) {
        Ok((rest, stx)) => ReadResult::Form(stx, input.len() - rest.len()),
        Err(_) if looks_incomplete(input) => ReadResult::Incomplete,
        Err(err) => ReadResult::Malformed(describe_error(input, err)),
    }
}

/// Read every form of `input`; incomplete or malformed text is an error.
pub fn read_all(input: &str) -> Result<Vec<Syntax>, RuntimeError> {
    let mut forms = Vec::new();
    let mut rest = input;
    loop {
        match read_syntax(rest) {
            ReadResult::Form(stx, used) => {
                forms.push(stx);
                rest = &rest[used..];
            }
            ReadResult::Empty => return Ok(forms),
            ReadResult::Incomplete => {
                return Err(RuntimeError::BadForm("unexpected end of input".into()));
            }
            ReadResult::Malformed(msg) => return Err(RuntimeError::BadForm(msg)),
        }
    }
}

/// Decide whether a failed parse is an unterminated form: an unclosed
/// paren, an unterminated string, or a trailing quote mark.
fn looks_incomplete(input: &str) -> bool {
    let mut depth = 0usize;
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            '"' => loop {
                match chars.next() {
                    None => return true,
                    Some('\\') => {
                        chars.next();
                    }
                    Some('"') => break,
                    Some(_) => {}
                }
            },
            _ => {}
        }
    }
    depth > 0 || input.trim_end().ends_with('\'')
}

/// Convert a nom error into a short positional message.
fn describe_error(input: &str, error: nom::Err<nom::error::Error<&str>>) -> String {
    match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let position = input.len().saturating_sub(e.input.len());
            if position < input.len() {
                let near: String = input.chars().skip(position).take(12).collect();
                format!("invalid syntax near '{near}'")
            } else {
                "unexpected end of input".into()
            }
        }
        nom::Err::Incomplete(_) => "incomplete input".into(),
    }
}

fn parse_form(input: &str) -> IResult<&str, Syntax> {
    preceded(
        multispace0,
        alt((
            parse_quote,
            parse_list,
            terminated(parse_number, peek_delimiter),
            terminated(parse_bool, peek_delimiter),
            parse_string,
            terminated(parse_symbol, peek_delimiter),
        )),
    )
    .parse(input)
}

/// Succeed without consuming when the next character can end an atom.
/// This is what rejects run-together tokens such as `123abc` or `#true`.
fn peek_delimiter(input: &str) -> IResult<&str, ()> {
    match input.chars().next() {
        None | Some('(' | ')' | '"' | '\'') => Ok((input, ())),
        Some(c) if c.is_whitespace() => Ok((input, ())),
        _ => Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::Verify,
        ))),
    }
}

/// Parse an integer or an `n/d` rational (sign on the numerator only).
fn parse_number(input: &str) -> IResult<&str, Syntax> {
    let (input, num_str) = recognize(pair(
        opt(char('-')),
        take_while1(|c: char| c.is_ascii_digit()),
    ))
    .parse(input)?;

    let Ok(num) = num_str.parse::<i64>() else {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::Digit,
        )));
    };

    let (input, den_str) = opt(preceded(
        char('/'),
        take_while1(|c: char| c.is_ascii_digit()),
    ))
    .parse(input)?;

    match den_str {
        None => Ok((input, Syntax::Integer(num))),
        Some(den_str) => match den_str.parse::<i64>() {
            Ok(den) => Ok((input, Syntax::Rational(num, den))),
            Err(_) => Err(nom::Err::Error(nom::error::Error::new(
                input,
                ErrorKind::Digit,
            ))),
        },
    }
}

/// Parse a boolean (#t or #f).
fn parse_bool(input: &str) -> IResult<&str, Syntax> {
    alt((
        value(Syntax::Boolean(true), tag("#t")),
        value(Syntax::Boolean(false), tag("#f")),
    ))
    .parse(input)
}

/// Parse a symbol (identifier).
fn parse_symbol(input: &str) -> IResult<&str, Syntax> {
    let mut symbol_chars =
        take_while1(|c: char| c.is_alphanumeric() || SYMBOL_SPECIAL_CHARS.contains(c));

    let (remaining, candidate) = symbol_chars.parse(input)?;

    if is_valid_symbol(candidate) {
        Ok((remaining, Syntax::Symbol(candidate.into())))
    } else {
        Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::Alpha,
        )))
    }
}

/// Parse a string literal with escape sequences.
fn parse_string(input: &str) -> IResult<&str, Syntax> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut chars = Vec::new();

    loop {
        let mut char_iter = remaining.chars();
        match char_iter.next() {
            Some('"') => {
                return Ok((
                    char_iter.as_str(),
                    Syntax::String(chars.into_iter().collect()),
                ));
            }
            Some('\\') => {
                match char_iter.next() {
                    Some('n') => chars.push('\n'),
                    Some('t') => chars.push('\t'),
                    Some('r') => chars.push('\r'),
                    Some('\\') => chars.push('\\'),
                    Some('"') => chars.push('"'),
                    _ => {
                        // Unknown or unfinished escape sequence
                        return Err(nom::Err::Error(nom::error::Error::new(
                            remaining,
                            ErrorKind::Char,
                        )));
                    }
                }
                remaining = char_iter.as_str();
            }
            Some(ch) => {
                chars.push(ch);
                remaining = char_iter.as_str();
            }
            None => {
                // No closing quote in this buffer
                return Err(nom::Err::Error(nom::error::Error::new(
                    remaining,
                    ErrorKind::Char,
                )));
            }
        }
    }
}

fn parse_list(input: &str) -> IResult<&str, Syntax> {
    let (input, _) = char('(').parse(input)?;
    let (input, elements) = many0(parse_form).parse(input)?;
    let (input, _) = multispace0.parse(input)?;
    let (input, _) = char(')').parse(input)?;
    Ok((input, Syntax::List(elements)))
}

/// Parse the quote shorthand ('expr -> (quote expr)).
fn parse_quote(input: &str) -> IResult<&str, Syntax> {
    let (input, _) = char('\'').parse(input)?;
    let (input, quoted) = parse_form(input)?;
    Ok((
        input,
        Syntax::List(vec![Syntax::Symbol("quote".into()), quoted]),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{int, lst, rat, sym};

    /// Expected outcome of reading one form.
    #[derive(Debug)]
    enum ReadExpect {
        Success(Syntax),
        Incomplete,
        Malformed,
    }
    use ReadExpect::*;

    fn run_read_tests(cases: Vec<(&str, ReadExpect)>) {
        for (i, (input, expected)) in cases.iter().enumerate() {
            let test_id = format!("read test #{}", i + 1);
            let result = read_syntax(input);
            match (result, expected) {
                (ReadResult::Form(actual, _), Success(expected_stx)) => {
                    assert_eq!(actual, *expected_stx, "{test_id}: value mismatch for '{input}'");
                }
                (ReadResult::Incomplete, Incomplete) => {}
                (ReadResult::Malformed(_), Malformed) => {}
                (actual, expected) => {
                    panic!("{test_id}: for '{input}' got {actual:?}, expected {expected:?}");
                }
            }
        }
    }

    #[test]
    fn test_reader_comprehensive() {
        let cases = vec![
            // ===== NUMBERS =====
            ("42", Success(int(42))),
            ("-5", Success(int(-5))),
            ("0", Success(int(0))),
            ("9223372036854775807", Success(int(i64::MAX))),
            ("-9223372036854775808", Success(int(i64::MIN))),
            ("99999999999999999999", Malformed), // out of i64 range
            ("3.14", Malformed),                 // floats are not in the language
            ("123abc", Malformed),               // run-together token
            // ===== RATIONALS =====
            ("1/2", Success(rat(1, 2))),
            ("-3/4", Success(rat(-3, 4))),
            ("1/0", Success(rat(1, 0))), // delivered as written, rejected later
            ("1/2x", Malformed),
            // ===== BOOLEANS =====
            ("#t", Success(Syntax::Boolean(true))),
            ("#f", Success(Syntax::Boolean(false))),
            ("#true", Malformed),
            ("#T", Malformed),
            // ===== STRINGS =====
            ("\"hello\"", Success(Syntax::String("hello".into()))),
            ("\"\"", Success(Syntax::String(String::new()))),
            (r#""a\nb""#, Success(Syntax::String("a\nb".into()))),
            (r#""q\"q""#, Success(Syntax::String("q\"q".into()))),
            (r#""back\\slash""#, Success(Syntax::String("back\\slash".into()))),
            (r#""bad\x""#, Malformed), // unknown escape
            // ===== SYMBOLS =====
            ("foo", Success(sym("foo"))),
            ("+", Success(sym("+"))),
            ("-", Success(sym("-"))),
            ("-abc", Success(sym("-abc"))),
            ("set-car!", Success(sym("set-car!"))),
            ("list?", Success(sym("list?"))),
            ("<=", Success(sym("<="))),
            (".", Success(sym("."))),
            ("...", Success(sym("..."))),
            ("var123", Success(sym("var123"))),
            ("@oops", Malformed),
            // ===== LISTS =====
            ("()", Success(lst(vec![]))),
            ("(   )", Success(lst(vec![]))),
            ("(1 2 3)", Success(lst(vec![int(1), int(2), int(3)]))),
            (
                "(+ 1 (car x))",
                Success(lst(vec![
                    sym("+"),
                    int(1),
                    lst(vec![sym("car"), sym("x")]),
                ])),
            ),
            // no space needed around parens
            ("(a(b))", Success(lst(vec![sym("a"), lst(vec![sym("b")])]))),
            (
                "( 1\t\n2 )",
                Success(lst(vec![int(1), int(2)])),
            ),
            (
                "(1 . 2)",
                Success(lst(vec![int(1), sym("."), int(2)])),
            ),
            // ===== QUOTE SHORTHAND =====
            ("'x", Success(lst(vec![sym("quote"), sym("x")]))),
            (
                "'(1 2)",
                Success(lst(vec![sym("quote"), lst(vec![int(1), int(2)])])),
            ),
            (
                "''x",
                Success(lst(vec![
                    sym("quote"),
                    lst(vec![sym("quote"), sym("x")]),
                ])),
            ),
            ("'()", Success(lst(vec![sym("quote"), lst(vec![])]))),
            // ===== INCOMPLETE INPUT =====
            ("(1 2", Incomplete),
            ("((a) (b)", Incomplete),
            ("\"no end", Incomplete),
            ("'", Incomplete),
            ("(display \"partial", Incomplete),
            // ===== MALFORMED INPUT =====
            (")", Malformed),
            ("@", Malformed),
        ];

        run_read_tests(cases);
    }

    #[test]
    fn test_read_consumes_one_form() {
        let input = "(+ 1 2) (car x)";
        let ReadResult::Form(first, used) = read_syntax(input) else {
            panic!("expected a form");
        };
        assert_eq!(first, lst(vec![sym("+"), int(1), int(2)]));
        let ReadResult::Form(second, _) = read_syntax(&input[used..]) else {
            panic!("expected a second form");
        };
        assert_eq!(second, lst(vec![sym("car"), sym("x")]));
    }

    #[test]
    fn test_read_all() {
        let forms = read_all("1 2 (3)").unwrap();
        assert_eq!(forms, vec![int(1), int(2), lst(vec![int(3)])]);

        assert_eq!(read_all("   ").unwrap(), vec![]);
        assert!(read_all("(1 2").is_err());
        assert!(read_all("(1))").is_err());
    }

    #[test]
    fn test_whitespace_handling() {
        let cases = vec![
            ("  42  ", Success(int(42))),
            ("\t#t\n", Success(Syntax::Boolean(true))),
            ("\r\n  foo  \t", Success(sym("foo"))),
        ];
        run_read_tests(cases);
        assert_eq!(read_syntax("   \n\t "), ReadResult::Empty);
        assert_eq!(read_syntax(""), ReadResult::Empty);
    }
}
