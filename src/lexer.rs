//! PDF lexer (tokenizer).
//!
//! Splits a byte range into PDF tokens: numbers, literal and hex strings,
//! names, delimiters and bare keywords. Whitespace (space, \t, \r, \n, \0,
//! \f) and comments (`%` to end of line) between tokens are skipped.
//!
//! String and name escapes are resolved here, so the parser only deals with
//! finished values. Keywords are whole runs of regular characters: `nullx`
//! is a single unknown keyword, not `null` followed by `x`.

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit0, digit1, one_of},
    combinator::{opt, recognize, value},
    sequence::{pair, preceded},
};

/// A single PDF token.
#[derive(Debug, PartialEq, Clone)]
pub enum Token<'a> {
    /// Integer (`42`, `-7`, `+3`)
    Integer(i64),
    /// Real (`3.5`, `-.002`, `4.`); integers that overflow `i64` also land here
    Real(f64),
    /// Literal string with escapes resolved and line ends normalized to LF
    LiteralString(Vec<u8>),
    /// Hexadecimal string, decoded
    HexString(Vec<u8>),
    /// Name without the slash, `#XX` escapes resolved
    Name(String),
    /// `true`
    True,
    /// `false`
    False,
    /// `null`
    Null,
    /// `[`
    ArrayStart,
    /// `]`
    ArrayEnd,
    /// `<<`
    DictStart,
    /// `>>`
    DictEnd,
    /// `obj`
    ObjStart,
    /// `endobj`
    ObjEnd,
    /// `stream`
    StreamStart,
    /// `endstream`
    StreamEnd,
    /// `R`
    R,
    /// Any other run of regular characters (`xref`, `trailer`, `n`, ...)
    Keyword(&'a [u8]),
}

/// PDF white-space characters.
pub fn is_whitespace(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\r' | b'\n' | 0x00 | 0x0C)
}

/// PDF delimiter characters.
pub fn is_delimiter(c: u8) -> bool {
    matches!(c, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

/// Characters that may appear in names, numbers and keywords.
pub fn is_regular(c: u8) -> bool {
    !is_whitespace(c) && !is_delimiter(c)
}

fn error(input: &[u8], kind: nom::error::ErrorKind) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Error(nom::error::Error::new(input, kind))
}

fn comment(input: &[u8]) -> IResult<&[u8], &[u8]> {
    preceded(char('%'), take_while(|c| c != b'\r' && c != b'\n'))(input)
}

/// Skip whitespace and comments.
pub fn skip_ws(input: &[u8]) -> &[u8] {
    let mut rest = input;
    loop {
        let start = rest.iter().position(|&c| !is_whitespace(c)).unwrap_or(rest.len());
        rest = &rest[start..];
        match comment(rest) {
            Ok((after_comment, _)) => rest = after_comment,
            Err(_) => return rest,
        }
    }
}

/// Parse a number.
///
/// The run must end at a non-regular character, so `12abc` is not a number.
fn number(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (rest, text) = recognize(pair(
        opt(one_of("+-")),
        alt((recognize(pair(digit1, opt(pair(char('.'), digit0)))), recognize(pair(char('.'), digit1)))),
    ))(input)?;

    if rest.first().is_some_and(|&c| is_regular(c)) {
        return Err(error(input, nom::error::ErrorKind::Digit));
    }

    // Only ASCII digits, sign and dot were matched.
    let text = std::str::from_utf8(text).map_err(|_| error(input, nom::error::ErrorKind::Digit))?;
    if !text.contains('.') {
        if let Ok(n) = text.parse::<i64>() {
            return Ok((rest, Token::Integer(n)));
        }
    }
    let normalized = match text.strip_prefix('+') {
        Some(t) => t,
        None => text,
    };
    let real = normalized
        .parse::<f64>()
        .map_err(|_| error(input, nom::error::ErrorKind::Float))?;
    Ok((rest, Token::Real(real)))
}

/// Parse a literal string `( ... )`, resolving escapes.
///
/// Balanced unescaped parentheses are part of the string. An unescaped CR or
/// CRLF becomes LF; a backslash before a line end joins the lines.
fn literal_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (body, _) = char('(')(input)?;
    let mut out = Vec::new();
    let mut depth = 1usize;
    let mut i = 0;

    while i < body.len() {
        let c = body[i];
        i += 1;
        match c {
            b'(' => {
                depth += 1;
                out.push(c);
            },
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((&body[i..], Token::LiteralString(out)));
                }
                out.push(c);
            },
            b'\r' => {
                if body.get(i) == Some(&b'\n') {
                    i += 1;
                }
                out.push(b'\n');
            },
            b'\\' => {
                let Some(&e) = body.get(i) else {
                    break;
                };
                i += 1;
                match e {
                    b'n' => out.push(b'\n'),
                    b'r' => out.push(b'\r'),
                    b't' => out.push(b'\t'),
                    b'b' => out.push(0x08),
                    b'f' => out.push(0x0C),
                    b'(' | b')' | b'\\' => out.push(e),
                    b'\n' => {},
                    b'\r' => {
                        if body.get(i) == Some(&b'\n') {
                            i += 1;
                        }
                    },
                    b'0'..=b'7' => {
                        let mut code = (e - b'0') as u32;
                        for _ in 0..2 {
                            match body.get(i) {
                                Some(&d @ b'0'..=b'7') => {
                                    code = code * 8 + (d - b'0') as u32;
                                    i += 1;
                                },
                                _ => break,
                            }
                        }
                        out.push(code as u8);
                    },
                    // Unknown escapes drop the backslash.
                    other => out.push(other),
                }
            },
            _ => out.push(c),
        }
    }

    Err(error(input, nom::error::ErrorKind::Eof))
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Parse a hex string `< ... >`. Whitespace is ignored; an odd final digit
/// is padded with 0.
fn hex_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    if input.starts_with(b"<<") {
        return Err(error(input, nom::error::ErrorKind::Tag));
    }
    let (body, _) = char('<')(input)?;
    let mut out = Vec::new();
    let mut high: Option<u8> = None;

    for (i, &c) in body.iter().enumerate() {
        if c == b'>' {
            if let Some(h) = high {
                out.push(h << 4);
            }
            return Ok((&body[i + 1..], Token::HexString(out)));
        }
        if is_whitespace(c) {
            continue;
        }
        let v = hex_value(c).ok_or_else(|| error(input, nom::error::ErrorKind::HexDigit))?;
        match high.take() {
            Some(h) => out.push((h << 4) | v),
            None => high = Some(v),
        }
    }

    Err(error(input, nom::error::ErrorKind::Eof))
}

/// Resolve `#XX` escapes in a raw name. Malformed escapes are kept literally.
pub fn decode_name(raw: &[u8]) -> String {
    let mut bytes = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'#' && i + 2 < raw.len() {
            if let (Some(h), Some(l)) = (hex_value(raw[i + 1]), hex_value(raw[i + 2])) {
                bytes.push((h << 4) | l);
                i += 3;
                continue;
            }
        }
        bytes.push(raw[i]);
        i += 1;
    }
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

fn name(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (rest, raw) = preceded(char('/'), take_while(is_regular))(input)?;
    Ok((rest, Token::Name(decode_name(raw))))
}

fn delimiter(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    alt((
        value(Token::DictStart, tag(b"<<")),
        value(Token::DictEnd, tag(b">>")),
        value(Token::ArrayStart, tag(b"[")),
        value(Token::ArrayEnd, tag(b"]")),
    ))(input)
}

fn keyword(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (rest, word) = take_while1(is_regular)(input)?;
    let tok = match word {
        b"true" => Token::True,
        b"false" => Token::False,
        b"null" => Token::Null,
        b"obj" => Token::ObjStart,
        b"endobj" => Token::ObjEnd,
        b"stream" => Token::StreamStart,
        b"endstream" => Token::StreamEnd,
        b"R" => Token::R,
        other => Token::Keyword(other),
    };
    Ok((rest, tok))
}

/// Parse one token after skipping whitespace and comments.
pub fn token(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let input = skip_ws(input);
    alt((delimiter, name, literal_string, hex_string, number, keyword))(input)
}

/// Tokenize until the input ends or a token fails to parse.
pub fn tokens(mut input: &[u8]) -> Vec<Token<'_>> {
    let mut out = Vec::new();
    while let Ok((rest, tok)) = token(input) {
        out.push(tok);
        input = rest;
    }
    out
}
