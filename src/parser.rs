//! PDF object parser.
//!
//! Builds [`Object`] values from lexer tokens by recursive descent:
//! primitives map one token to one value, `N G R` becomes a reference, and
//! arrays and dictionaries recurse. Indirect objects (`N G obj ... endobj`)
//! and their stream bodies are handled by [`parse_indirect_object`], which
//! needs the surrounding file to locate stream data.
//!
//! Arrays and dictionaries cut off by the end of input are returned with the
//! entries read so far.

use crate::error::{Error, Result};
use crate::lexer::{skip_ws, token, Token};
use crate::object::{Dictionary, Object, ObjectRef, PdfString, Stream};
use crate::parser_config::ParserOptions;
use nom::IResult;

/// Nesting limit used by [`parse_object`].
pub const DEFAULT_MAX_NESTING: usize = 100;

fn fail(input: &[u8], kind: nom::error::ErrorKind) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Error(nom::error::Error::new(input, kind))
}

/// Parse one value.
///
/// # Example
///
/// ```
/// use pdf_objstore::parser::parse_object;
///
/// let (_, obj) = parse_object(b"[1 2 0 R /Name (text)]").unwrap();
/// assert_eq!(obj.as_array().map(|a| a.len()), Some(4));
/// ```
pub fn parse_object(input: &[u8]) -> IResult<&[u8], Object> {
    parse_object_with_depth(input, DEFAULT_MAX_NESTING)
}

/// Parse one value, failing once arrays and dictionaries nest deeper than `max_nesting`.
pub fn parse_object_with_depth(input: &[u8], max_nesting: usize) -> IResult<&[u8], Object> {
    value(input, 0, max_nesting)
}

fn value(input: &[u8], depth: usize, max: usize) -> IResult<&[u8], Object> {
    let (rest, tok) = token(input)?;
    match tok {
        Token::Null => Ok((rest, Object::Null)),
        Token::True => Ok((rest, Object::Boolean(true))),
        Token::False => Ok((rest, Object::Boolean(false))),
        Token::Integer(n) => {
            // `N G R` is a reference; otherwise N stands alone.
            if let Ok((after_gen, Token::Integer(gen))) = token(rest) {
                if let Ok((after_r, Token::R)) = token(after_gen) {
                    if let (Ok(id), Ok(gen)) = (u32::try_from(n), u16::try_from(gen)) {
                        return Ok((after_r, Object::Reference(ObjectRef::new(id, gen))));
                    }
                }
            }
            Ok((rest, Object::Number(n as f64)))
        },
        Token::Real(r) => Ok((rest, Object::Number(r))),
        Token::LiteralString(bytes) => Ok((rest, Object::String(PdfString::literal(bytes)))),
        Token::HexString(bytes) => Ok((rest, Object::String(PdfString::hex(bytes)))),
        Token::Name(name) => Ok((rest, Object::Name(name))),
        Token::ArrayStart => {
            if depth >= max {
                return Err(nom::Err::Failure(nom::error::Error::new(
                    input,
                    nom::error::ErrorKind::TooLarge,
                )));
            }
            array(rest, depth + 1, max)
        },
        Token::DictStart => {
            if depth >= max {
                return Err(nom::Err::Failure(nom::error::Error::new(
                    input,
                    nom::error::ErrorKind::TooLarge,
                )));
            }
            let (rest, dict) = dictionary(rest, depth + 1, max)?;
            Ok((rest, Object::Dictionary(dict)))
        },
        _ => Err(fail(input, nom::error::ErrorKind::Tag)),
    }
}

fn array(mut input: &[u8], depth: usize, max: usize) -> IResult<&[u8], Object> {
    let mut items = Vec::new();
    loop {
        if skip_ws(input).is_empty() {
            return Ok((&input[input.len()..], Object::Array(items)));
        }
        if let Ok((rest, Token::ArrayEnd)) = token(input) {
            return Ok((rest, Object::Array(items)));
        }
        let (rest, item) = value(input, depth, max)?;
        items.push(item);
        input = rest;
    }
}

fn dictionary(mut input: &[u8], depth: usize, max: usize) -> IResult<&[u8], Dictionary> {
    let mut dict = Dictionary::new();
    loop {
        if skip_ws(input).is_empty() {
            return Ok((&input[input.len()..], dict));
        }
        let (rest, tok) = token(input)?;
        match tok {
            Token::DictEnd => return Ok((rest, dict)),
            Token::Name(key) => {
                if skip_ws(rest).is_empty() {
                    return Ok((&rest[rest.len()..], dict));
                }
                let (rest, val) = value(rest, depth, max)?;
                dict.insert(key, val);
                input = rest;
            },
            _ => return Err(fail(input, nom::error::ErrorKind::Tag)),
        }
    }
}

/// Parse the `N G obj` header, returning the reference and the input after it.
pub fn parse_object_header(input: &[u8]) -> Option<(ObjectRef, &[u8])> {
    let (rest, id) = match token(input) {
        Ok((rest, Token::Integer(id))) => (rest, id),
        _ => return None,
    };
    let (rest, gen) = match token(rest) {
        Ok((rest, Token::Integer(gen))) => (rest, gen),
        _ => return None,
    };
    match token(rest) {
        Ok((rest, Token::ObjStart)) => Some((
            ObjectRef::new(u32::try_from(id).ok()?, u16::try_from(gen).ok()?),
            rest,
        )),
        _ => None,
    }
}

fn parse_error(data: &[u8], rest: &[u8], reason: impl Into<String>) -> Error {
    Error::ParseError {
        offset: data.len().saturating_sub(rest.len()),
        reason: reason.into(),
    }
}

/// Parse the indirect object starting at `offset` in `data`.
///
/// A stream's `/Length` may be an indirect reference; `resolve_length` is
/// asked for its value. When the length is missing or wrong the body is
/// found by scanning for `endstream`, unless `options.strict` is set.
pub fn parse_indirect_object(
    data: &[u8],
    offset: usize,
    options: &ParserOptions,
    resolve_length: &mut dyn FnMut(ObjectRef) -> Option<i64>,
) -> Result<(ObjectRef, Object)> {
    let input = data.get(offset..).ok_or(Error::UnexpectedEof)?;
    let (reference, rest) = parse_object_header(input)
        .ok_or_else(|| parse_error(data, input, "expected 'N G obj'"))?;

    let (rest, object) = parse_object_with_depth(rest, options.max_nesting)
        .map_err(|e| match e {
            nom::Err::Error(inner) | nom::Err::Failure(inner) => {
                parse_error(data, inner.input, format!("invalid object {}: {:?}", reference, inner.code))
            },
            nom::Err::Incomplete(_) => Error::UnexpectedEof,
        })?;

    let (rest, object) = match (object, token(rest)) {
        (Object::Dictionary(dict), Ok((after_kw, Token::StreamStart))) => {
            let (rest, body) = stream_body(data, after_kw, &dict, options, resolve_length)
                .ok_or_else(|| parse_error(data, after_kw, format!("unterminated stream in {}", reference)))?;
            (rest, Object::Stream(Stream::new(dict, body.to_vec())))
        },
        (object, _) => (rest, object),
    };

    match token(rest) {
        Ok((_, Token::ObjEnd)) => {},
        _ if options.strict => {
            return Err(parse_error(data, rest, format!("missing endobj after {}", reference)));
        },
        _ => log::debug!("object {} has no endobj", reference),
    }

    Ok((reference, object))
}

/// Locate the bytes of a stream whose `stream` keyword ends right before `input`.
fn stream_body<'a>(
    data: &'a [u8],
    input: &'a [u8],
    dict: &Dictionary,
    options: &ParserOptions,
    resolve_length: &mut dyn FnMut(ObjectRef) -> Option<i64>,
) -> Option<(&'a [u8], &'a [u8])> {
    // The keyword is followed by CRLF or LF; tolerate a lone CR.
    let start = if input.starts_with(b"\r\n") {
        &input[2..]
    } else if input.starts_with(b"\n") || input.starts_with(b"\r") {
        &input[1..]
    } else {
        log::debug!("no end-of-line after 'stream' keyword");
        input
    };

    let declared = match dict.get("Length") {
        Some(Object::Reference(r)) => resolve_length(*r),
        Some(other) => other.as_integer(),
        None => None,
    };

    if let Some(len) = declared.and_then(|l| usize::try_from(l).ok()) {
        if len <= start.len() {
            let after = &start[len..];
            if let Ok((rest, Token::StreamEnd)) = token(after) {
                return Some((rest, &start[..len]));
            }
        }
        if options.strict {
            return None;
        }
        log::warn!(
            "stream /Length {} does not match the data at byte {}, scanning for endstream",
            len,
            data.len() - start.len()
        );
    }

    let end = find_keyword(start, b"endstream")?;
    let mut body = &start[..end];
    if body.ends_with(b"\r\n") {
        body = &body[..body.len() - 2];
    } else if body.ends_with(b"\n") || body.ends_with(b"\r") {
        body = &body[..body.len() - 1];
    }
    Some((&start[end + b"endstream".len()..], body))
}

/// Position of the first occurrence of `keyword`.
pub fn find_keyword(haystack: &[u8], keyword: &[u8]) -> Option<usize> {
    haystack.windows(keyword.len()).position(|w| w == keyword)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &[u8]) -> Object {
        parse_object(input).unwrap().1
    }

    fn no_lengths(_: ObjectRef) -> Option<i64> {
        None
    }

    #[test]
    fn test_primitives() {
        assert_eq!(parse(b"null"), Object::Null);
        assert_eq!(parse(b"true"), Object::Boolean(true));
        assert_eq!(parse(b"false"), Object::Boolean(false));
        assert_eq!(parse(b"42"), Object::from(42));
        assert_eq!(parse(b"-1.5"), Object::Number(-1.5));
        assert_eq!(parse(b"/Type"), Object::name("Type"));
        assert_eq!(parse(b"(Hello)"), Object::string(b"Hello".to_vec()));
    }

    #[test]
    fn test_string_syntax_is_kept() {
        match parse(b"<414243>") {
            Object::String(s) => {
                assert!(s.is_hex());
                assert_eq!(s.as_bytes(), b"ABC");
            },
            other => panic!("expected string, got {:?}", other),
        }
        match parse(b"(ABC)") {
            Object::String(s) => assert!(!s.is_hex()),
            other => panic!("expected string, got {:?}", other),
        }
    }

    #[test]
    fn test_reference() {
        assert_eq!(parse(b"10 0 R"), Object::Reference(ObjectRef::new(10, 0)));
        let (rest, obj) = parse_object(b"10 0 obj").unwrap();
        assert_eq!(obj, Object::from(10));
        assert_eq!(token(rest).unwrap().1, Token::Integer(0));
    }

    #[test]
    fn test_array() {
        let obj = parse(b"[1 2 0 R /N (s) [3] <</A 1>>]");
        let items = obj.as_array().unwrap();
        assert_eq!(items.len(), 6);
        assert_eq!(items[1], Object::Reference(ObjectRef::new(2, 0)));
        assert_eq!(items[4], Object::Array(vec![Object::from(3)]));
        assert_eq!(parse(b"[]"), Object::Array(vec![]));
    }

    #[test]
    fn test_dictionary_keeps_order() {
        let obj = parse(b"<< /Z 1 /A /Name /M [1 2] >>");
        let dict = obj.as_dict().unwrap();
        let keys: Vec<_> = dict.keys().cloned().collect();
        assert_eq!(keys, vec!["Z", "A", "M"]);
        assert_eq!(dict.get_name("A"), Some("Name"));
    }

    #[test]
    fn test_unclosed_containers_at_eof() {
        assert_eq!(parse(b"[1 2"), Object::Array(vec![Object::from(1), Object::from(2)]));
        let obj = parse(b"<< /A 1 /B");
        assert_eq!(obj.as_dict().unwrap().get_integer("A"), Some(1));
        assert!(obj.as_dict().unwrap().get("B").is_none());
    }

    #[test]
    fn test_bad_dictionary_key() {
        assert!(parse_object(b"<< 1 2 >>").is_err());
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}{}", "[".repeat(10), "]".repeat(10));
        assert!(parse_object_with_depth(deep.as_bytes(), 10).is_ok());
        assert!(matches!(
            parse_object_with_depth(deep.as_bytes(), 9),
            Err(nom::Err::Failure(_))
        ));
    }

    #[test]
    fn test_object_header() {
        let (r, rest) = parse_object_header(b"12 3 obj << >>").unwrap();
        assert_eq!(r, ObjectRef::new(12, 3));
        assert_eq!(skip_ws(rest), b"<< >>");
        assert!(parse_object_header(b"12 3 R").is_none());
        assert!(parse_object_header(b"-1 0 obj").is_none());
    }

    #[test]
    fn test_indirect_dictionary() {
        let data = b"%PDF-1.7\n4 0 obj\n<< /Type /Catalog >>\nendobj\n";
        let (r, obj) = parse_indirect_object(data, 9, &ParserOptions::default(), &mut no_lengths).unwrap();
        assert_eq!(r, ObjectRef::new(4, 0));
        assert!(obj.as_dict().unwrap().is_type("Catalog"));
    }

    #[test]
    fn test_indirect_stream_with_length() {
        let data = b"1 0 obj\n<< /Length 5 >>\nstream\r\nhello\nendstream\nendobj";
        let (_, obj) = parse_indirect_object(data, 0, &ParserOptions::default(), &mut no_lengths).unwrap();
        assert_eq!(obj.as_stream().unwrap().raw_buffer(), b"hello");
    }

    #[test]
    fn test_indirect_length_reference() {
        let data = b"1 0 obj\n<< /Length 2 0 R >>\nstream\nhello world\nendstream\nendobj";
        let mut lookup = |r: ObjectRef| (r == ObjectRef::new(2, 0)).then_some(11i64);
        let (_, obj) = parse_indirect_object(data, 0, &ParserOptions::default(), &mut lookup).unwrap();
        assert_eq!(obj.as_stream().unwrap().raw_buffer(), b"hello world");
    }

    #[test]
    fn test_wrong_length_falls_back_to_scan() {
        let data = b"1 0 obj\n<< /Length 99 >>\nstream\nabc\nendstream\nendobj";
        let (_, obj) = parse_indirect_object(data, 0, &ParserOptions::lenient(), &mut no_lengths).unwrap();
        assert_eq!(obj.as_stream().unwrap().raw_buffer(), b"abc");

        assert!(parse_indirect_object(data, 0, &ParserOptions::strict(), &mut no_lengths).is_err());
    }

    #[test]
    fn test_garbage_is_parse_error() {
        let data = b"%PDF\ngarbage here";
        match parse_indirect_object(data, 5, &ParserOptions::default(), &mut no_lengths) {
            Err(Error::ParseError { offset, .. }) => assert_eq!(offset, 5),
            other => panic!("expected parse error, got {:?}", other),
        }
        assert!(matches!(
            parse_indirect_object(data, 500, &ParserOptions::default(), &mut no_lengths),
            Err(Error::UnexpectedEof)
        ));
    }

    #[test]
    fn test_find_keyword() {
        assert_eq!(find_keyword(b"abc endstream", b"endstream"), Some(4));
        assert_eq!(find_keyword(b"abc", b"endstream"), None);
    }
}
